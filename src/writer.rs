//! Record serialization: bean maps back to flat-file lines.
//!
//! The inverse of the assembly engine. Schema lines are rendered in
//! declaration order. Property-bound lines repeat once per child held by
//! their parent property and segments once per child, each repetition led
//! by its identifier. The record identifier is written on the first line
//! only. Missing values render as empty text, padded to the field width on
//! fixed-position lines.

use crate::config::Encoding;
use crate::conversion::transform_string;
use crate::error::{FlatrecError, Result};
use crate::identity::{FieldIdentity, char_len};
use crate::models::{Bean, BeanMap, Value};
use crate::schema::{Cardinality, FileFormat, Line, LineElement, Record, RecordElement, SegmentElement};
use std::collections::BTreeMap;
use std::io::Write;
use tracing::debug;

/// Render one record to its physical lines, without line separators
pub fn write_record(format: &FileFormat, record_name: &str, beans: &BeanMap) -> Result<Vec<String>> {
    let record = format.record(record_name).ok_or_else(|| {
        FlatrecError::configuration(format!("Record '{}' is not defined", record_name))
    })?;
    Renderer { format, record }.render(beans)
}

/// Writes records to a byte sink using the format's encoding and line separator
pub struct RecordWriter<'f, W: Write> {
    format: &'f FileFormat,
    out: W,
    encoding: Encoding,
    records_written: usize,
    lines_written: usize,
}

impl<'f, W: Write> RecordWriter<'f, W> {
    pub fn new(format: &'f FileFormat, out: W) -> Result<Self> {
        let encoding = format.encoding()?;
        Ok(Self {
            format,
            out,
            encoding,
            records_written: 0,
            lines_written: 0,
        })
    }

    pub fn write(&mut self, record_name: &str, beans: &BeanMap) -> Result<()> {
        let lines = write_record(self.format, record_name, beans)?;
        let separator = &self.format.config.line_separator;
        for line in &lines {
            self.out.write_all(&self.encoding.encode(line))?;
            self.out.write_all(&self.encoding.encode(separator))?;
        }
        self.records_written += 1;
        self.lines_written += lines.len();
        debug!("Wrote record '{}' as {} lines", record_name, lines.len());
        Ok(())
    }

    pub fn records_written(&self) -> usize {
        self.records_written
    }

    pub fn lines_written(&self) -> usize {
        self.lines_written
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Beans visible while rendering; repetition children shadow record beans
#[derive(Clone)]
struct Scope<'a> {
    beans: &'a BeanMap,
    children: BTreeMap<&'a str, &'a Bean>,
}

impl<'a> Scope<'a> {
    fn new(beans: &'a BeanMap) -> Self {
        Self {
            beans,
            children: BTreeMap::new(),
        }
    }

    fn bean(&self, name: &str) -> Option<&'a Bean> {
        self.children
            .get(name)
            .copied()
            .or_else(|| self.beans.get(name))
    }

    fn with_child(&self, name: &'a str, bean: &'a Bean) -> Self {
        let mut scope = self.clone();
        scope.children.insert(name, bean);
        scope
    }
}

/// Character buffer for a fixed-position line
#[derive(Default)]
struct FixedBuffer {
    chars: Vec<char>,
}

impl FixedBuffer {
    /// Write `text` at `start`, space-filling any gap before it
    fn put(&mut self, start: usize, text: &str) {
        self.reserve(start);
        for (offset, c) in text.chars().enumerate() {
            match self.chars.get_mut(start + offset) {
                Some(slot) => *slot = c,
                None => self.chars.push(c),
            }
        }
    }

    /// Space-fill up to `end` without touching what is already written
    fn reserve(&mut self, end: usize) {
        if self.chars.len() < end {
            self.chars.resize(end, ' ');
        }
    }

    fn into_string(self) -> String {
        self.chars.into_iter().collect()
    }
}

fn pad_to(text: String, width: usize) -> String {
    let length = char_len(&text);
    if length >= width {
        return text;
    }
    let mut padded = text;
    padded.extend(std::iter::repeat_n(' ', width - length));
    padded
}

struct Renderer<'a> {
    format: &'a FileFormat,
    record: &'a Record,
}

impl<'a> Renderer<'a> {
    fn render(&self, beans: &'a BeanMap) -> Result<Vec<String>> {
        let scope = Scope::new(beans);
        let record_identity = self.record.identity.as_ref().and_then(|id| id.as_field());
        let mut lines = Vec::new();
        let mut first = true;

        for line in &self.record.definition.lines {
            let line_identity = line.identity.as_ref().and_then(|id| id.as_field());
            if !line.has_identity() {
                let prefix = if first { record_identity } else { None };
                first = false;
                lines.push(self.render_line(line, prefix, &scope)?);
            } else if let Some(cardinality) = &line.cardinality {
                for child in self.children(&scope, cardinality) {
                    let scope = scope.with_child(&cardinality.bean_ref, child);
                    lines.push(self.render_line(line, line_identity, &scope)?);
                }
            } else if self.has_values(line, &scope) {
                lines.push(self.render_line(line, line_identity, &scope)?);
            }
        }
        Ok(lines)
    }

    /// Children held by the parent property, or the standalone bean when
    /// the cardinality attaches through an add-method only
    fn children(&self, scope: &Scope<'a>, cardinality: &'a Cardinality) -> Vec<&'a Bean> {
        let Some(property) = cardinality.property_name.as_deref() else {
            return scope.bean(&cardinality.bean_ref).into_iter().collect();
        };
        let held = cardinality
            .parent_bean_ref
            .as_deref()
            .and_then(|parent| scope.bean(parent))
            .and_then(|parent| parent.get(property));
        match held {
            Some(Value::List(items)) => items.iter().filter_map(Value::as_bean).collect(),
            Some(Value::Bean(bean)) => vec![bean],
            _ => Vec::new(),
        }
    }

    fn has_values(&self, line: &Line, scope: &Scope<'a>) -> bool {
        line.record_elements().into_iter().any(|field| {
            field
                .target()
                .and_then(|(bean, property)| scope.bean(bean)?.get(property))
                .is_some_and(|value| !value.is_null())
        })
    }

    fn render_line(
        &self,
        line: &'a Line,
        prefix: Option<&FieldIdentity>,
        scope: &Scope<'a>,
    ) -> Result<String> {
        // one identifier per line: the first match string, never the whole set
        if line.is_delimited() {
            let mut tokens: Vec<String> = prefix
                .and_then(FieldIdentity::primary)
                .map(str::to_string)
                .into_iter()
                .collect();
            self.render_delimited(&line.elements, scope, &mut tokens)?;
            let delimiter = line.output_delimiter();
            let quoted: Vec<String> = tokens
                .into_iter()
                .map(|token| quote_token(token, &delimiter, line.quote))
                .collect();
            Ok(quoted.join(&delimiter))
        } else {
            let mut buffer = FixedBuffer::default();
            if let Some(identity) = prefix {
                if let (Some(start), Some(primary)) = (identity.start_position, identity.primary()) {
                    buffer.put(start, primary);
                }
            }
            self.render_fixed(&line.elements, scope, &mut buffer, 0)?;
            Ok(buffer.into_string())
        }
    }

    fn field_text(&self, field: &RecordElement, scope: &Scope<'a>, length: usize) -> Result<String> {
        let (Some(bean_ref), Some((bean_name, property))) = (field.bean_ref.as_deref(), field.target())
        else {
            return Ok(String::new());
        };
        let sink = self.format.sink();
        let null = Value::Null;
        let value = match scope.bean(bean_name) {
            Some(bean) => sink.get_property(bean, property)?.unwrap_or(&null),
            None => &null,
        };
        let options = &field.conversion_options;
        let conversions = self.format.conversions();

        let text = match field.converter_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => conversions.to_text(name, value, options, bean_ref)?,
            _ => {
                let kind = self
                    .record
                    .definition
                    .type_of(bean_name)
                    .and_then(|type_ref| sink.property_kind(type_ref, property));
                conversions.to_text_inferred(kind, value, options, bean_ref)?
            }
        };
        Ok(transform_string(&text, options, length))
    }

    fn render_fixed(
        &self,
        elements: &'a [LineElement],
        scope: &Scope<'a>,
        buffer: &mut FixedBuffer,
        mut cursor: usize,
    ) -> Result<usize> {
        for element in elements {
            match element {
                LineElement::Field(field) => {
                    let start = field.field_start.unwrap_or(cursor);
                    let mut end = cursor;
                    if let Some(field_end) = field.field_end {
                        end = field_end;
                        cursor = end;
                    }
                    if let Some(length) = field.field_length {
                        end = start + length;
                        cursor = end;
                    }
                    let width = end.saturating_sub(start);
                    if field.bean_ref.is_none() || field.ignore_field {
                        buffer.reserve(end);
                    } else {
                        let text = self.field_text(field, scope, width)?;
                        buffer.put(start, &pad_to(text, width));
                    }
                }
                LineElement::Segment(segment) => {
                    cursor = self.render_fixed_segment(segment, scope, buffer, cursor)?;
                }
            }
        }
        Ok(cursor)
    }

    fn render_fixed_segment(
        &self,
        segment: &'a SegmentElement,
        scope: &Scope<'a>,
        buffer: &mut FixedBuffer,
        mut cursor: usize,
    ) -> Result<usize> {
        let cardinality = &segment.cardinality;
        let children = self.children(scope, cardinality);

        let Some(identity) = &segment.identity else {
            let scope = match children.first().copied() {
                Some(child) => scope.with_child(&cardinality.bean_ref, child),
                None => scope.clone(),
            };
            return self.render_fixed(&segment.elements, &scope, buffer, cursor);
        };

        for child in children {
            if let Some(primary) = identity.primary() {
                let start = cursor + identity.start_position.unwrap_or(0);
                let length = identity.field_length.unwrap_or_else(|| char_len(primary));
                let marker: String = primary.chars().take(length).collect();
                buffer.put(start, &pad_to(marker, length));
                cursor = start + length;
            }
            let scope = scope.with_child(&cardinality.bean_ref, child);
            cursor = self.render_fixed(&segment.elements, &scope, buffer, cursor)?;
        }
        Ok(cursor)
    }

    fn render_delimited(
        &self,
        elements: &'a [LineElement],
        scope: &Scope<'a>,
        tokens: &mut Vec<String>,
    ) -> Result<()> {
        for element in elements {
            match element {
                LineElement::Field(field) => {
                    if field.bean_ref.is_none() || field.ignore_field {
                        tokens.push(String::new());
                    } else {
                        let length = if field.enforce_field_length {
                            field.width().unwrap_or(0)
                        } else {
                            0
                        };
                        tokens.push(self.field_text(field, scope, length)?);
                    }
                }
                LineElement::Segment(segment) => {
                    let cardinality = &segment.cardinality;
                    let children = self.children(scope, cardinality);
                    match &segment.identity {
                        None => {
                            let scope = match children.first().copied() {
                                Some(child) => scope.with_child(&cardinality.bean_ref, child),
                                None => scope.clone(),
                            };
                            self.render_delimited(&segment.elements, &scope, tokens)?;
                        }
                        Some(identity) => {
                            for child in children {
                                tokens.extend(identity.primary().map(str::to_string));
                                let scope = scope.with_child(&cardinality.bean_ref, child);
                                self.render_delimited(&segment.elements, &scope, tokens)?;
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Quote a token that contains the delimiter or the quote character, when
/// the line declares a quote. Embedded quotes are doubled.
fn quote_token(token: String, delimiter: &str, quote: Option<char>) -> String {
    match quote {
        Some(q) if token.contains(q) || (!delimiter.is_empty() && token.contains(delimiter)) => {
            let doubled = token.replace(q, &format!("{q}{q}"));
            format!("{q}{doubled}{q}")
        }
        _ => token,
    }
}
