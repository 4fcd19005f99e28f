//! JSON schema documents.
//!
//! A convenience front-end that deserializes a complete [`FileFormat`]:
//! format settings, converter declarations, bean types and records. Script
//! functions and custom converter implementations cannot live in JSON; the
//! embedding application hands them to the [`SchemaLoader`] first.
//!
//! ```json
//! {
//!   "config": { "ignore-unmapped-records": true },
//!   "types": [ { "name": "Dvd", "properties": { "sku": "string", "price": "double" } } ],
//!   "records": [ {
//!     "name": "dvd",
//!     "identity": { "field": { "start": 0, "length": 3, "matches": ["DVD"] } },
//!     "beans": [ { "name": "dvd", "type": "Dvd" } ],
//!     "lines": [ { "elements": [
//!       { "field": { "ref": "dvd.sku", "start": 3, "length": 7 } },
//!       { "field": { "ref": "dvd.price", "length": 6, "converter": "double" } }
//!     ] } ]
//!   } ]
//! }
//! ```

use super::{
    Cardinality, CardinalityMode, FileFormat, Line, LineElement, Record, RecordDefinition,
    RecordElement, SegmentElement,
};
use crate::binding::{BeanRegistry, PropertyKind, TypeDescriptor};
use crate::config::FormatConfig;
use crate::conversion::{ConversionOptions, ConversionRegistry, ConverterDef};
use crate::error::{FlatrecError, Result};
use crate::identity::{FieldIdentity, Identity, LengthIdentity, ScriptIdentity};
use crate::script::{ScriptRef, ScriptRegistry};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SchemaDocument {
    #[serde(default)]
    pub config: FormatConfig,
    #[serde(default)]
    pub converters: Vec<ConverterDoc>,
    #[serde(default)]
    pub types: Vec<TypeDoc>,
    pub records: Vec<RecordDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConverterDoc {
    pub name: String,
    #[serde(default = "default_implementation")]
    pub implementation: String,
    pub method: String,
    pub return_type: Option<String>,
}

fn default_implementation() -> String {
    crate::constants::CORE_CONVERTERS.to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct TypeDoc {
    pub name: String,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyKind>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RecordDoc {
    pub name: String,
    pub identity: Option<IdentityDoc>,
    #[serde(default)]
    pub beans: Vec<BeanDoc>,
    pub lines: Vec<LineDoc>,
    pub before: Option<ScriptDoc>,
    pub after: Option<ScriptDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct BeanDoc {
    pub name: String,
    #[serde(rename = "type")]
    pub type_ref: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentityDoc {
    Length {
        min: Option<usize>,
        max: Option<usize>,
    },
    Field(FieldIdentityDoc),
    Script(ScriptDoc),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FieldIdentityDoc {
    pub start: Option<usize>,
    pub length: Option<usize>,
    #[serde(default)]
    pub ignore_case: bool,
    pub matches: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ScriptDoc {
    pub engine: Option<String>,
    #[serde(default)]
    pub script: String,
    pub function: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct LineDoc {
    pub id: Option<String>,
    pub delimiter: Option<String>,
    pub quote: Option<String>,
    pub identity: Option<IdentityDoc>,
    pub cardinality: Option<CardinalityDoc>,
    #[serde(default)]
    pub record_start_line: bool,
    #[serde(default)]
    pub record_end_line: bool,
    pub before: Option<ScriptDoc>,
    pub after: Option<ScriptDoc>,
    #[serde(default)]
    pub elements: Vec<ElementDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ElementDoc {
    Field(FieldDoc),
    Segment(SegmentDoc),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FieldDoc {
    #[serde(rename = "ref")]
    pub bean_ref: Option<String>,
    pub start: Option<usize>,
    pub end: Option<usize>,
    pub length: Option<usize>,
    pub converter: Option<String>,
    #[serde(default)]
    pub options: ConversionOptions,
    #[serde(default)]
    pub ignore_field: bool,
    #[serde(default)]
    pub trim_value: bool,
    #[serde(default)]
    pub enforce_field_length: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SegmentDoc {
    pub identity: Option<FieldIdentityDoc>,
    pub cardinality: CardinalityDoc,
    #[serde(default)]
    pub elements: Vec<ElementDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct CardinalityDoc {
    pub bean: String,
    pub parent: Option<String>,
    pub property: Option<String>,
    pub add_method: Option<String>,
    #[serde(default)]
    pub min_count: i64,
    #[serde(default = "unbounded")]
    pub max_count: i64,
    #[serde(default)]
    pub mode: CardinalityMode,
}

fn unbounded() -> i64 {
    -1
}

/// Builds [`FileFormat`]s from schema documents
#[derive(Debug, Default)]
pub struct SchemaLoader {
    conversions: ConversionRegistry,
    types: BeanRegistry,
    scripts: ScriptRegistry,
}

impl SchemaLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Converter registry to start from (custom implementations live here)
    pub fn with_conversions(mut self, conversions: ConversionRegistry) -> Self {
        self.conversions = conversions;
        self
    }

    /// Bean types with setters, add-methods or factories the document cannot express
    pub fn with_types(mut self, types: BeanRegistry) -> Self {
        self.types = types;
        self
    }

    pub fn with_scripts(mut self, scripts: ScriptRegistry) -> Self {
        self.scripts = scripts;
        self
    }

    pub fn load_path(self, path: &Path) -> Result<FileFormat> {
        info!("Loading schema from {}", path.display());
        let text = fs::read_to_string(path)?;
        self.load_str(&text)
    }

    pub fn load_str(self, text: &str) -> Result<FileFormat> {
        let document: SchemaDocument = serde_json::from_str(text)?;
        self.load(document)
    }

    /// Assemble, bind scripts and validate
    pub fn load(self, document: SchemaDocument) -> Result<FileFormat> {
        let SchemaLoader {
            mut conversions,
            mut types,
            scripts,
        } = self;

        for converter in document.converters {
            let mut def = ConverterDef::new(converter.name, converter.implementation, converter.method);
            def.return_type = converter.return_type;
            conversions.register_converter(def);
        }

        for declared in document.types {
            let mut descriptor = match types.descriptor(&declared.name) {
                Some(existing) => existing.clone(),
                None => TypeDescriptor::new(&declared.name),
            };
            for (property, kind) in declared.properties {
                descriptor = descriptor.with_property(property, kind);
            }
            types.register(descriptor);
        }

        let mut records = Vec::with_capacity(document.records.len());
        for record in document.records {
            for bean in &record.beans {
                if !types.has_type(&bean.type_ref) {
                    debug!("Bean type '{}' is undeclared; treating it as open", bean.type_ref);
                    types.register(TypeDescriptor::new(&bean.type_ref));
                }
            }
            records.push(build_record(record)?);
        }

        let mut format = FileFormat::new(document.config)
            .with_conversions(conversions)
            .with_sink(types);
        for record in records {
            format.add_record(record);
        }
        format.bind_scripts(&scripts)?;
        format.validate()?;
        info!("Loaded schema with {} record(s)", format.records().len());
        Ok(format)
    }
}

fn build_record(doc: RecordDoc) -> Result<Record> {
    let mut definition = RecordDefinition::new();
    for bean in doc.beans {
        definition = definition.with_bean(bean.name, bean.type_ref);
    }
    for line in doc.lines {
        definition = definition.with_line(build_line(line)?);
    }

    let mut record = Record::new(doc.name, definition);
    record.identity = doc.identity.map(build_identity);
    record.before = doc.before.map(build_script);
    record.after = doc.after.map(build_script);
    Ok(record)
}

fn build_line(doc: LineDoc) -> Result<Line> {
    let quote = match doc.quote.as_deref() {
        None | Some("") => None,
        Some(text) => text.chars().next(),
    };
    let elements = doc
        .elements
        .into_iter()
        .map(build_element)
        .collect::<Result<Vec<_>>>()?;

    Ok(Line {
        id: doc.id,
        elements,
        delimiter: doc.delimiter,
        quote,
        identity: doc.identity.map(build_identity),
        cardinality: doc.cardinality.map(build_cardinality),
        record_start_line: doc.record_start_line,
        record_end_line: doc.record_end_line,
        before: doc.before.map(build_script),
        after: doc.after.map(build_script),
    })
}

fn build_element(doc: ElementDoc) -> Result<LineElement> {
    match doc {
        ElementDoc::Field(field) => Ok(LineElement::Field(RecordElement {
            bean_ref: field.bean_ref,
            field_start: field.start,
            field_end: field.end,
            field_length: field.length,
            converter_name: field.converter,
            conversion_options: field.options,
            ignore_field: field.ignore_field,
            trim_value: field.trim_value,
            enforce_field_length: field.enforce_field_length,
        })),
        ElementDoc::Segment(segment) => {
            let elements = segment
                .elements
                .into_iter()
                .map(build_element)
                .collect::<Result<Vec<_>>>()?;
            if elements.is_empty() {
                return Err(FlatrecError::configuration(format!(
                    "Segment for bean '{}' has no elements",
                    segment.cardinality.bean
                )));
            }
            Ok(LineElement::Segment(SegmentElement {
                identity: segment.identity.map(build_field_identity),
                cardinality: build_cardinality(segment.cardinality),
                elements,
            }))
        }
    }
}

fn build_cardinality(doc: CardinalityDoc) -> Cardinality {
    Cardinality {
        bean_ref: doc.bean,
        parent_bean_ref: doc.parent,
        property_name: doc.property,
        add_method: doc.add_method,
        min_count: doc.min_count,
        max_count: doc.max_count,
        mode: doc.mode,
    }
}

fn build_identity(doc: IdentityDoc) -> Identity {
    match doc {
        IdentityDoc::Length { min, max } => Identity::Length(LengthIdentity {
            min_length: min,
            max_length: max,
        }),
        IdentityDoc::Field(field) => Identity::Field(build_field_identity(field)),
        IdentityDoc::Script(script) => Identity::Script(ScriptIdentity::new(build_script(script))),
    }
}

fn build_field_identity(doc: FieldIdentityDoc) -> FieldIdentity {
    FieldIdentity {
        start_position: doc.start,
        field_length: doc.length,
        ignore_case: doc.ignore_case,
        match_strings: doc.matches,
    }
}

fn build_script(doc: ScriptDoc) -> ScriptRef {
    let mut script = match doc.function {
        Some(function) => ScriptRef::new(function),
        None => ScriptRef::identity(),
    };
    if let Some(engine) = doc.engine {
        script = script.with_engine(engine);
    }
    script.with_script(doc.script)
}
