//! Error handling for flat-file record mapping.
//!
//! Provides the error taxonomy for schema configuration, record matching,
//! field slicing, value conversion and cardinality enforcement. Every parse
//! failure is scoped to a single record: the reader returns to a clean state
//! after surfacing one of these.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlatrecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Schema document error: {0}")]
    Document(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Configuration not found for line in input [line: {line_number}] - {line}")]
    UnmatchedLine { line_number: usize, line: String },

    #[error(
        "Looking for field {field} at pos {start}, end {end}, input length = {actual} (record '{record}')"
    )]
    LineLength {
        record: String,
        field: String,
        start: usize,
        end: usize,
        actual: usize,
    },

    #[error("Converting field {bean_ref} with value '{text}': {reason}")]
    Conversion {
        bean_ref: String,
        text: String,
        reason: String,
    },

    #[error(
        "Cardinality limit of {max_count} exceeded for property {property} of bean {bean} with mode {mode}"
    )]
    Cardinality {
        bean: String,
        property: String,
        max_count: usize,
        mode: String,
    },

    #[error("Script error in {target}: {message}")]
    Script { target: String, message: String },

    #[error("Property binding failed for {bean}.{property}: {message}")]
    Binding {
        bean: String,
        property: String,
        message: String,
    },

    #[error("Line is not valid {encoding} [line: {line_number}] - {line}")]
    Encoding {
        line_number: usize,
        encoding: String,
        line: String,
    },

    #[error(
        "Record '{record}' expects {expected} lines but input ended after {read} [line: {line_number}]"
    )]
    UnexpectedEndOfInput {
        record: String,
        expected: usize,
        read: usize,
        line_number: usize,
    },
}

impl FlatrecError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a conversion error attributed to a `bean.property` reference
    pub fn conversion(
        bean_ref: impl Into<String>,
        text: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Conversion {
            bean_ref: bean_ref.into(),
            text: text.into(),
            reason: reason.into(),
        }
    }

    /// Create a script error for the named record or line
    pub fn script(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Script {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Create a property binding error
    pub fn binding(
        bean: impl Into<String>,
        property: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Binding {
            bean: bean.into(),
            property: property.into(),
            message: message.into(),
        }
    }

    /// Short category label, used by the dispatcher and the CLI summary
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Document(_) => "document",
            Self::Configuration { .. } => "configuration",
            Self::UnmatchedLine { .. } => "unmatched-line",
            Self::Encoding { .. } => "encoding",
            Self::LineLength { .. } => "line-length",
            Self::Conversion { .. } => "conversion",
            Self::Cardinality { .. } => "cardinality",
            Self::Script { .. } => "script",
            Self::Binding { .. } => "binding",
            Self::UnexpectedEndOfInput { .. } => "unexpected-eof",
        }
    }

    /// Whether the reader can keep going with the next line after this error
    pub fn is_record_scoped(&self) -> bool {
        !matches!(
            self,
            Self::Io(_) | Self::Document(_) | Self::Configuration { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FlatrecError>;
