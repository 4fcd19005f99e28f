//! Configuration management and validation.
//!
//! Format-wide settings that govern how a [`crate::schema::FileFormat`]
//! reads and writes lines: encoding, the unmapped-record policy, line length
//! enforcement and the separator written between physical lines.

use crate::constants::{DEFAULT_ENCODING, DEFAULT_LINE_SEPARATOR};
use crate::error::{FlatrecError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Character encodings supported for input and output lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encoding {
    /// UTF-8 (default)
    Utf8,
    /// ISO-8859-1, one byte per character
    Latin1,
}

impl Encoding {
    /// Resolve an encoding label such as `UTF-8` or `ISO-8859-1`
    pub fn from_label(label: &str) -> Result<Self> {
        let normalized = label.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "utf-8" | "utf8" => Ok(Encoding::Utf8),
            "iso-8859-1" | "latin1" | "latin-1" | "iso8859-1" => Ok(Encoding::Latin1),
            _ => Err(FlatrecError::configuration(format!(
                "Unsupported encoding '{}'",
                label
            ))),
        }
    }

    /// Decode raw line bytes.
    ///
    /// Invalid input yields [`FlatrecError::Encoding`] carrying a lossy
    /// rendering of the line; the caller fills in the line number.
    pub fn decode(&self, bytes: &[u8]) -> Result<String> {
        match self {
            Encoding::Utf8 => String::from_utf8(bytes.to_vec()).map_err(|e| {
                let lossy = String::from_utf8_lossy(e.as_bytes());
                FlatrecError::Encoding {
                    line_number: 0,
                    encoding: "UTF-8".to_string(),
                    line: lossy.trim_end_matches(['\r', '\n']).to_string(),
                }
            }),
            Encoding::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
        }
    }

    /// Encode text for output; characters outside Latin-1 become `?`
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            Encoding::Utf8 => text.as_bytes().to_vec(),
            Encoding::Latin1 => text
                .chars()
                .map(|c| if (c as u32) < 256 { c as u8 } else { b'?' })
                .collect(),
        }
    }
}

/// Format-wide settings for parsing and writing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FormatConfig {
    /// Encoding label of the flat file
    pub encoding: String,

    /// Skip lines no record identifies instead of failing
    pub ignore_unmapped_records: bool,

    /// Fail when a fixed-position field extends past the end of the line;
    /// when false the field is clamped to whatever is left
    pub enforce_line_lengths: bool,

    /// Separator written after each physical line by the writer
    pub line_separator: String,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            encoding: DEFAULT_ENCODING.to_string(),
            ignore_unmapped_records: false,
            enforce_line_lengths: true,
            line_separator: DEFAULT_LINE_SEPARATOR.to_string(),
        }
    }
}

impl FormatConfig {
    /// Set the encoding label
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    /// Skip unmapped lines instead of failing
    pub fn with_ignore_unmapped_records(mut self, ignore: bool) -> Self {
        self.ignore_unmapped_records = ignore;
        self
    }

    /// Toggle fixed-position line length enforcement
    pub fn with_enforce_line_lengths(mut self, enforce: bool) -> Self {
        self.enforce_line_lengths = enforce;
        self
    }

    /// Set the separator written after each physical line
    pub fn with_line_separator(mut self, separator: impl Into<String>) -> Self {
        self.line_separator = separator.into();
        self
    }

    /// Resolve the configured encoding label
    pub fn resolved_encoding(&self) -> Result<Encoding> {
        let encoding = Encoding::from_label(&self.encoding)?;
        debug!("Resolved encoding '{}' to {:?}", self.encoding, encoding);
        Ok(encoding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FormatConfig::default();
        assert_eq!(config.encoding, "UTF-8");
        assert!(!config.ignore_unmapped_records);
        assert!(config.enforce_line_lengths);
        assert_eq!(config.line_separator, "\n");
    }

    #[test]
    fn test_builders_chain() {
        let config = FormatConfig::default()
            .with_encoding("ISO-8859-1")
            .with_ignore_unmapped_records(true)
            .with_enforce_line_lengths(false)
            .with_line_separator("\r\n");
        assert_eq!(config.resolved_encoding().unwrap(), Encoding::Latin1);
        assert!(config.ignore_unmapped_records);
        assert!(!config.enforce_line_lengths);
        assert_eq!(config.line_separator, "\r\n");
    }

    #[test]
    fn test_unknown_encoding_is_configuration_error() {
        let config = FormatConfig::default().with_encoding("EBCDIC");
        assert!(matches!(
            config.resolved_encoding(),
            Err(FlatrecError::Configuration { .. })
        ));
    }

    #[test]
    fn test_latin1_round_trip() {
        let encoding = Encoding::Latin1;
        let bytes = encoding.encode("caf\u{e9}");
        assert_eq!(bytes, vec![b'c', b'a', b'f', 0xE9]);
        assert_eq!(encoding.decode(&bytes).unwrap(), "caf\u{e9}");
    }

    #[test]
    fn test_invalid_utf8_is_encoding_error() {
        match Encoding::Utf8.decode(b"ok\xff\r\n").unwrap_err() {
            FlatrecError::Encoding { encoding, line, .. } => {
                assert_eq!(encoding, "UTF-8");
                assert_eq!(line, "ok\u{fffd}");
            }
            _ => panic!("Expected Encoding error"),
        }
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: FormatConfig =
            serde_json::from_str(r#"{"ignore-unmapped-records": true}"#).unwrap();
        assert!(config.ignore_unmapped_records);
        assert!(config.enforce_line_lengths);
    }
}
