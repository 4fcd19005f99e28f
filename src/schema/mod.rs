//! Schema model: formats, records, lines and their elements.
//!
//! A [`FileFormat`] is assembled once (programmatically or from a
//! [`document`]), validated, and then shared read-only by readers and
//! writers. The only interior mutability is the memoization inside the
//! conversion and binding registries it owns.

pub mod cardinality;
pub mod document;
pub mod line;
pub mod validation;

pub use cardinality::{Cardinality, CardinalityMode};
pub use document::{SchemaDocument, SchemaLoader};
pub use line::{Line, LineElement, RecordElement, SegmentElement};

use crate::binding::{BeanRegistry, PropertySink};
use crate::config::{Encoding, FormatConfig};
use crate::conversion::ConversionRegistry;
use crate::error::Result;
use crate::identity::{Identity, IdentityContext};
use crate::script::{ScriptRef, ScriptRegistry};
use crate::tokenizer::LineToken;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Bean declared by a record definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeanDecl {
    pub name: String,
    pub type_ref: String,
}

/// Beans and lines of one record
#[derive(Debug, Clone, Default)]
pub struct RecordDefinition {
    pub beans: Vec<BeanDecl>,
    pub lines: Vec<Line>,
}

impl RecordDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bean(mut self, name: impl Into<String>, type_ref: impl Into<String>) -> Self {
        self.beans.push(BeanDecl {
            name: name.into(),
            type_ref: type_ref.into(),
        });
        self
    }

    pub fn with_line(mut self, line: Line) -> Self {
        self.lines.push(line);
        self
    }

    pub fn bean(&self, name: &str) -> Option<&BeanDecl> {
        self.beans.iter().find(|b| b.name == name)
    }

    pub fn type_of(&self, bean: &str) -> Option<&str> {
        self.bean(bean).map(|b| b.type_ref.as_str())
    }

    /// Lines read in sequence, with their index in the definition
    pub fn sequential_lines(&self) -> impl Iterator<Item = (usize, &Line)> {
        self.lines.iter().enumerate().filter(|(_, l)| !l.has_identity())
    }

    /// Lines matched independently after the sequential ones, in declaration order
    pub fn lines_with_identities(&self) -> impl Iterator<Item = (usize, &Line)> {
        self.lines.iter().enumerate().filter(|(_, l)| l.has_identity())
    }
}

/// A named row format and how to recognise it
#[derive(Debug, Clone)]
pub struct Record {
    pub name: String,
    /// Absent means the record matches every line
    pub identity: Option<Identity>,
    pub definition: RecordDefinition,
    pub before: Option<ScriptRef>,
    pub after: Option<ScriptRef>,
}

impl Record {
    pub fn new(name: impl Into<String>, definition: RecordDefinition) -> Self {
        Self {
            name: name.into(),
            identity: None,
            definition,
            before: None,
            after: None,
        }
    }

    pub fn with_identity(mut self, identity: impl Into<Identity>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    pub fn with_before(mut self, script: ScriptRef) -> Self {
        self.before = Some(script);
        self
    }

    pub fn with_after(mut self, script: ScriptRef) -> Self {
        self.after = Some(script);
        self
    }

    pub fn is_default(&self) -> bool {
        self.identity.is_none()
    }

    pub fn matches_line(&self, line: &str) -> Result<bool> {
        match &self.identity {
            None => Ok(true),
            Some(identity) => {
                identity.matches(IdentityContext::Record { record: &self.name }, Some(line))
            }
        }
    }

    /// Whether a delimited token is this record's identifier
    pub fn matches_token(&self, token: &LineToken) -> bool {
        self.identity
            .as_ref()
            .is_some_and(|identity| identity.matches_token(token))
    }

    fn script_refs_mut(&mut self) -> Vec<&mut ScriptRef> {
        let mut refs: Vec<&mut ScriptRef> = Vec::new();
        if let Some(script) = self.identity.as_mut().and_then(Identity::script_mut) {
            refs.push(script);
        }
        refs.extend(self.before.as_mut());
        refs.extend(self.after.as_mut());
        for line in &mut self.definition.lines {
            if let Some(script) = line.identity.as_mut().and_then(Identity::script_mut) {
                refs.push(script);
            }
            refs.extend(line.before.as_mut());
            refs.extend(line.after.as_mut());
        }
        refs
    }
}

/// Top-level schema: settings, records in match order, converters and bean binding
pub struct FileFormat {
    pub config: FormatConfig,
    records: Vec<Record>,
    conversions: ConversionRegistry,
    sink: Arc<dyn PropertySink>,
}

impl fmt::Debug for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileFormat")
            .field("config", &self.config)
            .field("records", &self.records)
            .field("conversions", &self.conversions)
            .finish()
    }
}

impl Default for FileFormat {
    fn default() -> Self {
        Self::new(FormatConfig::default())
    }
}

impl FileFormat {
    pub fn new(config: FormatConfig) -> Self {
        Self {
            config,
            records: Vec::new(),
            conversions: ConversionRegistry::new(),
            sink: Arc::new(BeanRegistry::new()),
        }
    }

    pub fn with_record(mut self, record: Record) -> Self {
        self.add_record(record);
        self
    }

    pub fn add_record(&mut self, record: Record) {
        debug!("Adding record '{}'", record.name);
        self.records.push(record);
    }

    pub fn with_conversions(mut self, conversions: ConversionRegistry) -> Self {
        self.conversions = conversions;
        self
    }

    pub fn with_sink(mut self, sink: impl PropertySink + 'static) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    pub fn with_shared_sink(mut self, sink: Arc<dyn PropertySink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn record(&self, name: &str) -> Option<&Record> {
        self.records.iter().find(|r| r.name == name)
    }

    pub fn conversions(&self) -> &ConversionRegistry {
        &self.conversions
    }

    pub fn conversions_mut(&mut self) -> &mut ConversionRegistry {
        &mut self.conversions
    }

    pub fn sink(&self) -> &dyn PropertySink {
        self.sink.as_ref()
    }

    pub fn encoding(&self) -> Result<Encoding> {
        self.config.resolved_encoding()
    }

    /// First record, in declaration order, whose identity accepts the line
    pub fn match_record(&self, line: &str) -> Result<Option<&Record>> {
        for record in &self.records {
            if record.matches_line(line)? {
                debug!("Line matched record '{}'", record.name);
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Bind every script reference to a registered function
    pub fn bind_scripts(&mut self, registry: &ScriptRegistry) -> Result<()> {
        for record in &mut self.records {
            for script in record.script_refs_mut() {
                script.bind(registry)?;
            }
        }
        Ok(())
    }

    /// Check the schema for contradictions before any parsing
    pub fn validate(&self) -> Result<()> {
        validation::ConfigurationValidator::new(self).validate()
    }
}
