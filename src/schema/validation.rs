//! Load-time validation of a [`FileFormat`].
//!
//! Everything the engine would otherwise trip over mid-file is rejected here
//! as a configuration error.

use super::{Cardinality, FileFormat, Line, LineElement, Record, RecordElement, SegmentElement};
use crate::error::{FlatrecError, Result};
use crate::identity::{FieldIdentity, Identity};
use crate::script::ScriptRef;
use std::collections::HashSet;
use tracing::debug;

pub struct ConfigurationValidator<'f> {
    format: &'f FileFormat,
}

impl<'f> ConfigurationValidator<'f> {
    pub fn new(format: &'f FileFormat) -> Self {
        Self { format }
    }

    pub fn validate(&self) -> Result<()> {
        self.format.encoding()?;

        let has_default = self.format.records().iter().any(Record::is_default);
        if has_default && self.format.config.ignore_unmapped_records {
            return Err(FlatrecError::configuration(
                "A record without identity cannot be combined with ignore-unmapped-records",
            ));
        }

        let mut names = HashSet::new();
        for record in self.format.records() {
            if !names.insert(record.name.as_str()) {
                return Err(FlatrecError::configuration(format!(
                    "Record '{}' is declared more than once",
                    record.name
                )));
            }
            self.validate_record(record)?;
        }

        debug!("Validated {} record(s)", self.format.records().len());
        Ok(())
    }

    fn validate_record(&self, record: &Record) -> Result<()> {
        if let Some(identity) = &record.identity {
            validate_identity(identity, &record.name)?;
        }
        validate_script(record.before.as_ref(), &record.name)?;
        validate_script(record.after.as_ref(), &record.name)?;

        if record.definition.sequential_lines().next().is_none() {
            return Err(FlatrecError::configuration(format!(
                "Record '{}' needs at least one line without an identity",
                record.name
            )));
        }

        let mut beans = HashSet::new();
        for bean in &record.definition.beans {
            if !beans.insert(bean.name.as_str()) {
                return Err(FlatrecError::configuration(format!(
                    "Bean '{}' is declared twice in record '{}'",
                    bean.name, record.name
                )));
            }
            self.format.sink().new_instance(&bean.type_ref).map_err(|e| {
                FlatrecError::configuration(format!(
                    "Record '{}' bean '{}': {}",
                    record.name, bean.name, e
                ))
            })?;
        }

        for (index, line) in record.definition.lines.iter().enumerate() {
            let context = format!("record '{}' line {}", record.name, index);
            self.validate_line(record, line, &context)?;
        }
        Ok(())
    }

    fn validate_line(&self, record: &Record, line: &Line, context: &str) -> Result<()> {
        if let Some(identity) = &line.identity {
            validate_identity(identity, context)?;
        }
        validate_script(line.before.as_ref(), context)?;
        validate_script(line.after.as_ref(), context)?;

        if line.delimiter.is_some() && line.split_char().is_none() {
            return Err(FlatrecError::configuration(format!(
                "{}: delimiter is blank",
                context
            )));
        }
        if let Some(cardinality) = &line.cardinality {
            self.validate_cardinality(record, cardinality, context)?;
        }
        self.validate_elements(record, line, &line.elements, context)
    }

    fn validate_elements(
        &self,
        record: &Record,
        line: &Line,
        elements: &[LineElement],
        context: &str,
    ) -> Result<()> {
        for element in elements {
            match element {
                LineElement::Field(field) => self.validate_field(record, line, field, context)?,
                LineElement::Segment(segment) => {
                    self.validate_segment(record, line, segment, context)?
                }
            }
        }
        Ok(())
    }

    fn validate_field(
        &self,
        record: &Record,
        line: &Line,
        field: &RecordElement,
        context: &str,
    ) -> Result<()> {
        let label = field.bean_ref.as_deref().unwrap_or("<filler>");

        if !line.is_delimited() {
            match (field.field_end, field.field_length) {
                (Some(_), Some(_)) => {
                    return Err(FlatrecError::configuration(format!(
                        "{}: field {} sets both end and length",
                        context, label
                    )));
                }
                (None, None) => {
                    return Err(FlatrecError::configuration(format!(
                        "{}: field {} needs an end or a length",
                        context, label
                    )));
                }
                _ => {}
            }
            if let (Some(start), Some(end)) = (field.field_start, field.field_end) {
                if end < start {
                    return Err(FlatrecError::configuration(format!(
                        "{}: field {} ends ({}) before it starts ({})",
                        context, label, end, start
                    )));
                }
            }
        }

        if let Some(bean_ref) = &field.bean_ref {
            let Some((bean, _)) = field.target() else {
                return Err(FlatrecError::configuration(format!(
                    "{}: field reference '{}' is not of the form bean.property",
                    context, bean_ref
                )));
            };
            self.require_bean(record, bean, context)?;
        }

        if let Some(converter) = &field.converter_name {
            if !self.format.conversions().has_converter(converter) {
                return Err(FlatrecError::configuration(format!(
                    "{}: field {} uses unregistered converter '{}'",
                    context, label, converter
                )));
            }
            self.format.conversions().verify(converter)?;
        }
        Ok(())
    }

    fn validate_segment(
        &self,
        record: &Record,
        line: &Line,
        segment: &SegmentElement,
        context: &str,
    ) -> Result<()> {
        if let Some(identity) = &segment.identity {
            if identity.match_strings.is_empty() {
                return Err(FlatrecError::configuration(format!(
                    "{}: segment {} identity has no match strings",
                    context,
                    segment.cardinality.target_name()
                )));
            }
        }
        if segment.cardinality.parent_bean_ref.is_none() {
            return Err(FlatrecError::configuration(format!(
                "{}: segment bean '{}' has no parent bean",
                context, segment.cardinality.bean_ref
            )));
        }
        self.validate_cardinality(record, &segment.cardinality, context)?;
        self.validate_elements(record, line, &segment.elements, context)
    }

    fn validate_cardinality(
        &self,
        record: &Record,
        cardinality: &Cardinality,
        context: &str,
    ) -> Result<()> {
        self.require_bean(record, &cardinality.bean_ref, context)?;
        let Some(parent) = &cardinality.parent_bean_ref else {
            return Err(FlatrecError::configuration(format!(
                "{}: bean '{}' is attached to no parent",
                context, cardinality.bean_ref
            )));
        };
        self.require_bean(record, parent, context)?;
        if cardinality.property_name.is_none() && cardinality.add_method.is_none() {
            return Err(FlatrecError::configuration(format!(
                "{}: bean '{}' needs a property name or an add method on '{}'",
                context, cardinality.bean_ref, parent
            )));
        }
        if cardinality.max_count > 0 && cardinality.min_count > cardinality.max_count {
            return Err(FlatrecError::configuration(format!(
                "{}: {} minimum count {} exceeds maximum {}",
                context,
                cardinality.target_name(),
                cardinality.min_count,
                cardinality.max_count
            )));
        }
        Ok(())
    }

    fn require_bean(&self, record: &Record, bean: &str, context: &str) -> Result<()> {
        if record.definition.bean(bean).is_none() {
            return Err(FlatrecError::configuration(format!(
                "{}: bean '{}' is not declared in record '{}'",
                context, bean, record.name
            )));
        }
        Ok(())
    }
}

fn validate_identity(identity: &Identity, context: &str) -> Result<()> {
    match identity {
        Identity::Length(length) => match (length.min_length, length.max_length) {
            (Some(min), Some(max)) if min <= max => Ok(()),
            (Some(min), Some(max)) => Err(FlatrecError::configuration(format!(
                "{}: length identity minimum {} exceeds maximum {}",
                context, min, max
            ))),
            _ => Err(FlatrecError::configuration(format!(
                "{}: length identity needs both minimum and maximum",
                context
            ))),
        },
        Identity::Field(field) => validate_field_identity(field, context),
        Identity::Script(script) => validate_script(Some(&script.script), context),
    }
}

fn validate_field_identity(identity: &FieldIdentity, context: &str) -> Result<()> {
    if identity.start_position.is_none() || identity.field_length.is_none() {
        return Err(FlatrecError::configuration(format!(
            "{}: field identity needs a start position and a length",
            context
        )));
    }
    if identity.match_strings.is_empty() {
        return Err(FlatrecError::configuration(format!(
            "{}: field identity has no match strings",
            context
        )));
    }
    Ok(())
}

fn validate_script(script: Option<&ScriptRef>, context: &str) -> Result<()> {
    match script {
        Some(script) if !script.is_bound() => Err(FlatrecError::configuration(format!(
            "{}: script function '{}' is not bound",
            context, script.function_name
        ))),
        _ => Ok(()),
    }
}
