//! Field and segment assembly for one record.
//!
//! Beans are plain values, so a child is built completely (its own nested
//! segments included) before it is attached to its parent. The last instance
//! built for a segment stays in the bean map under its own name, and
//! property-bound lines leave a fresh instance behind for the next line.

use crate::binding::PropertySink;
use crate::error::{FlatrecError, Result};
use crate::identity::{char_len, char_slice};
use crate::models::{Bean, BeanMap, Value};
use crate::schema::{
    Cardinality, CardinalityMode, FileFormat, Line, LineElement, Record, RecordElement,
    SegmentElement,
};
use crate::script::{ScriptCall, ScriptRef};
use crate::tokenizer::{LineToken, split};
use std::collections::{BTreeSet, VecDeque};
use tracing::{debug, warn};

pub(crate) struct Assembler<'f> {
    format: &'f FileFormat,
    record: &'f Record,
    beans: BeanMap,
}

impl<'f> Assembler<'f> {
    /// Start a record with a fresh instance of every declared bean
    pub(crate) fn start(format: &'f FileFormat, record: &'f Record) -> Result<Self> {
        let mut beans = BeanMap::new();
        for decl in &record.definition.beans {
            beans.insert(decl.name.clone(), format.sink().new_instance(&decl.type_ref)?);
        }
        Ok(Self {
            format,
            record,
            beans,
        })
    }

    pub(crate) fn finish(self) -> BeanMap {
        self.beans
    }

    fn sink(&self) -> &'f dyn PropertySink {
        self.format.sink()
    }

    /// Run a record-level scriptlet with the bean map
    pub(crate) fn run_record_script(
        &mut self,
        script: Option<&ScriptRef>,
        line: Option<&str>,
    ) -> Result<()> {
        if let Some(script) = script {
            let mut call = ScriptCall::for_record(&self.record.name, line).with_beans(&mut self.beans);
            script.invoke(&mut call)?;
        }
        Ok(())
    }

    fn run_line_script(
        &mut self,
        script: Option<&ScriptRef>,
        index: usize,
        text: &str,
    ) -> Result<()> {
        if let Some(script) = script {
            let mut call = ScriptCall::for_line(&self.record.name, index, Some(text))
                .with_beans(&mut self.beans);
            script.invoke(&mut call)?;
        }
        Ok(())
    }

    /// Parse one physical line against its schema line
    pub(crate) fn parse_line(&mut self, index: usize, line: &Line, text: &str) -> Result<()> {
        self.prepare_beans(line)?;
        self.run_line_script(line.before.as_ref(), index, text)?;

        if line.is_delimited() {
            if !text.is_empty() {
                self.parse_delimited(line, text)?;
            }
        } else {
            self.parse_fixed(&line.elements, text, 0)?;
        }

        self.run_line_script(line.after.as_ref(), index, text)?;
        self.attach_line_bean(line)
    }

    // ---------------------------------------------------------------------
    // Bean preparation
    // ---------------------------------------------------------------------

    /// Create any bean the line (or its segments, breadth first) refers to
    /// that is missing, then do the same for identity lines hanging off a
    /// bean created here.
    fn prepare_beans(&mut self, line: &Line) -> Result<()> {
        let mut pending: VecDeque<&Line> = VecDeque::from([line]);
        let mut visited: BTreeSet<*const Line> = BTreeSet::new();

        while let Some(current) = pending.pop_front() {
            if !visited.insert(current as *const Line) {
                continue;
            }
            let mut refs: Vec<&str> = Vec::new();
            if let Some(cardinality) = &current.cardinality {
                refs.push(&cardinality.bean_ref);
                refs.extend(cardinality.parent_bean_ref.as_deref());
            }
            for segment in current.segments() {
                refs.push(&segment.cardinality.bean_ref);
                refs.extend(segment.cardinality.parent_bean_ref.as_deref());
            }

            let mut created: Vec<&str> = Vec::new();
            for name in refs {
                if !self.beans.contains_key(name) {
                    let bean = self.instantiate(name)?;
                    debug!("Created missing bean '{}'", name);
                    self.beans.insert(name.to_string(), bean);
                    created.push(name);
                }
            }

            for (_, dependent) in self.record.definition.lines_with_identities() {
                let hangs_off_new_bean = dependent
                    .cardinality
                    .as_ref()
                    .and_then(|c| c.parent_bean_ref.as_deref())
                    .is_some_and(|parent| created.contains(&parent));
                if hangs_off_new_bean {
                    pending.push_back(dependent);
                }
            }
        }
        Ok(())
    }

    fn instantiate(&self, bean_name: &str) -> Result<Bean> {
        let type_ref = self.record.definition.type_of(bean_name).ok_or_else(|| {
            FlatrecError::configuration(format!(
                "Bean '{}' is not declared in record '{}'",
                bean_name, self.record.name
            ))
        })?;
        self.sink().new_instance(type_ref)
    }

    /// Replace the named bean with a fresh instance
    fn renew(&mut self, bean_name: &str) -> Result<()> {
        let bean = self.instantiate(bean_name)?;
        self.beans.insert(bean_name.to_string(), bean);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Field mapping
    // ---------------------------------------------------------------------

    fn map_field(&mut self, field: &RecordElement, raw: &str) -> Result<()> {
        let (Some(bean_ref), Some((bean_name, property))) = (field.bean_ref.as_deref(), field.target())
        else {
            return Ok(());
        };
        let text = if field.trim_value { raw.trim() } else { raw };
        let options = &field.conversion_options;
        let conversions = self.format.conversions();

        let mut value = match field.converter_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => conversions.convert(name, text, options, bean_ref)?,
            _ => {
                let kind = self
                    .record
                    .definition
                    .type_of(bean_name)
                    .and_then(|type_ref| self.sink().property_kind(type_ref, property));
                conversions.convert_inferred(kind, text, options, bean_ref)?
            }
        };

        let sink = self.sink();
        let bean = self.beans.get_mut(bean_name).ok_or_else(|| {
            FlatrecError::binding(bean_name, property, "bean is not instantiated")
        })?;
        if options.is_append() {
            let current = sink
                .get_property(bean, property)?
                .map(Value::to_string)
                .unwrap_or_default();
            value = Value::String(current + &value.to_string());
        }
        sink.set_property(bean, property, value)
    }

    // ---------------------------------------------------------------------
    // Fixed-width lines
    // ---------------------------------------------------------------------

    /// Walk elements from `cursor`; returns the cursor after the last one
    fn parse_fixed(&mut self, elements: &[LineElement], text: &str, mut cursor: usize) -> Result<usize> {
        let line_length = char_len(text);

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
                    if end > line_length {
                        if self.format.config.enforce_line_lengths {
                            return Err(FlatrecError::LineLength {
                                record: self.record.name.clone(),
                                field: field.bean_ref.clone().unwrap_or_else(|| "<filler>".to_string()),
                                start,
                                end,
                                actual: line_length,
                            });
                        }
                        end = line_length;
                        cursor = line_length;
                    }
                    if !field.ignore_field {
                        self.map_field(field, char_slice(text, start.min(end), end))?;
                    }
                }
                LineElement::Segment(segment) => {
                    cursor = self.parse_fixed_segment(segment, text, cursor)?;
                }
            }
        }
        Ok(cursor)
    }

    fn parse_fixed_segment(&mut self, segment: &SegmentElement, text: &str, mut cursor: usize) -> Result<usize> {
        let cardinality = &segment.cardinality;

        let Some(identity) = &segment.identity else {
            self.renew(&cardinality.bean_ref)?;
            cursor = self.parse_fixed(&segment.elements, text, cursor)?;
            self.attach_repetition(cardinality, 1)?;
            return Ok(cursor);
        };

        let mut count = 0;
        while let Some(consumed) = identity.match_at(text, cursor) {
            let before = cursor;
            cursor += consumed;
            count += 1;
            self.renew(&cardinality.bean_ref)?;
            cursor = self.parse_fixed(&segment.elements, text, cursor)?;
            self.attach_repetition(cardinality, count)?;
            if cursor == before {
                break;
            }
        }
        self.finish_segment(cardinality, count)?;
        Ok(cursor)
    }

    // ---------------------------------------------------------------------
    // Delimited lines
    // ---------------------------------------------------------------------

    /// Tokens carrying the record's or the line's identifier are not data
    fn parse_delimited(&mut self, line: &Line, text: &str) -> Result<()> {
        let split_char = line.split_char().ok_or_else(|| {
            FlatrecError::configuration(format!(
                "Record '{}' has a line with a blank delimiter",
                self.record.name
            ))
        })?;
        let mut tokens = split(text, split_char, line.quote);
        let record = self.record;
        tokens.retain(|token| {
            !record.matches_token(token)
                && !line.identity.as_ref().is_some_and(|id| id.matches_token(token))
        });

        let mut cursor = 0;
        self.parse_delimited_elements(&line.elements, &tokens, &mut cursor)
    }

    fn parse_delimited_elements(
        &mut self,
        elements: &[LineElement],
        tokens: &[LineToken],
        cursor: &mut usize,
    ) -> Result<()> {
        for element in elements {
            match element {
                LineElement::Field(field) => match tokens.get(*cursor) {
                    Some(token) => {
                        if !field.ignore_field {
                            self.map_field(field, &token.text)?;
                        }
                        *cursor += 1;
                    }
                    None => warn!(
                        "Ran out of data on field {} ({})",
                        *cursor + 1,
                        field.bean_ref.as_deref().unwrap_or("<filler>")
                    ),
                },
                LineElement::Segment(segment) => {
                    self.parse_delimited_segment(segment, tokens, cursor)?;
                }
            }
        }
        Ok(())
    }

    fn parse_delimited_segment(
        &mut self,
        segment: &SegmentElement,
        tokens: &[LineToken],
        cursor: &mut usize,
    ) -> Result<()> {
        let cardinality = &segment.cardinality;

        let Some(identity) = &segment.identity else {
            self.renew(&cardinality.bean_ref)?;
            self.parse_delimited_elements(&segment.elements, tokens, cursor)?;
            return self.attach_repetition(cardinality, 1);
        };

        let mut count = 0;
        while let Some(token) = tokens.get(*cursor) {
            if !identity.matches_token(token) {
                break;
            }
            *cursor += 1;
            count += 1;
            self.renew(&cardinality.bean_ref)?;
            self.parse_delimited_elements(&segment.elements, tokens, cursor)?;
            self.attach_repetition(cardinality, count)?;
        }
        self.finish_segment(cardinality, count)
    }

    // ---------------------------------------------------------------------
    // Attachment
    // ---------------------------------------------------------------------

    fn parent_type(&self, cardinality: &Cardinality) -> Option<&'f str> {
        let parent = cardinality.parent_bean_ref.as_deref()?;
        self.record.definition.type_of(parent)
    }

    fn resolved_mode(&self, cardinality: &Cardinality) -> CardinalityMode {
        let kind = match (self.parent_type(cardinality), cardinality.property_name.as_deref()) {
            (Some(type_ref), Some(property)) => self.sink().property_kind(type_ref, property),
            _ => None,
        };
        cardinality.mode.resolve(kind)
    }

    fn parent_bean(&mut self, cardinality: &Cardinality) -> Result<&mut Bean> {
        let parent = cardinality.parent_bean_ref.as_deref().ok_or_else(|| {
            FlatrecError::configuration(format!(
                "Bean '{}' has no parent to attach to",
                cardinality.bean_ref
            ))
        })?;
        self.beans.get_mut(parent).ok_or_else(|| {
            FlatrecError::binding(parent, cardinality.target_name(), "parent bean is not instantiated")
        })
    }

    fn built_child(&self, cardinality: &Cardinality) -> Result<Bean> {
        self.beans.get(&cardinality.bean_ref).cloned().ok_or_else(|| {
            FlatrecError::binding(
                &cardinality.bean_ref,
                cardinality.target_name(),
                "child bean is not instantiated",
            )
        })
    }

    fn set_single(&mut self, cardinality: &Cardinality, child: Bean) -> Result<()> {
        let sink = self.sink();
        let parent = self.parent_bean(cardinality)?;
        match (&cardinality.property_name, &cardinality.add_method) {
            (Some(property), _) => sink.set_property(parent, property, Value::Bean(child)),
            (None, Some(method)) => sink.add_via_method(parent, method, Value::Bean(child)),
            (None, None) => Err(FlatrecError::configuration(format!(
                "Bean '{}' has neither a property nor an add method",
                cardinality.bean_ref
            ))),
        }
    }

    fn add_to_parent(&mut self, cardinality: &Cardinality, child: Bean) -> Result<()> {
        let sink = self.sink();
        let parent = self.parent_bean(cardinality)?;
        match (&cardinality.add_method, &cardinality.property_name) {
            (Some(method), _) => sink.add_via_method(parent, method, Value::Bean(child)),
            (None, Some(property)) => sink.add_to_collection(parent, property, Value::Bean(child)),
            (None, None) => Err(FlatrecError::configuration(format!(
                "Bean '{}' has neither a property nor an add method",
                cardinality.bean_ref
            ))),
        }
    }

    fn cardinality_error(cardinality: &Cardinality, mode: CardinalityMode) -> FlatrecError {
        FlatrecError::Cardinality {
            bean: cardinality
                .parent_bean_ref
                .clone()
                .unwrap_or_else(|| cardinality.bean_ref.clone()),
            property: cardinality.target_name().to_string(),
            max_count: cardinality.effective_max(),
            mode: mode.name().to_string(),
        }
    }

    /// Attach the `count`-th segment repetition under the cardinality rules
    fn attach_repetition(&mut self, cardinality: &Cardinality, count: usize) -> Result<()> {
        let child = self.built_child(cardinality)?;
        let mode = self.resolved_mode(cardinality);

        if mode == CardinalityMode::Single {
            return self.set_single(cardinality, child);
        }
        if count > cardinality.effective_max() {
            match mode {
                CardinalityMode::Strict => return Err(Self::cardinality_error(cardinality, mode)),
                CardinalityMode::Restricted => {
                    debug!(
                        "Dropping {} #{} beyond maximum {}",
                        cardinality.target_name(),
                        count,
                        cardinality.effective_max()
                    );
                    return Ok(());
                }
                _ => {}
            }
        }
        self.add_to_parent(cardinality, child)
    }

    fn finish_segment(&self, cardinality: &Cardinality, count: usize) -> Result<()> {
        let min = cardinality.effective_min();
        let max = cardinality.effective_max();
        if count == 0 && min > 0 {
            warn!(
                "Segment {} with minimum required count of {} missing",
                cardinality.target_name(),
                min
            );
        }
        if count > max && !matches!(self.resolved_mode(cardinality), CardinalityMode::Restricted) {
            warn!(
                "Segment {} with maximum of {} encountered actual count of {}",
                cardinality.target_name(),
                max,
                count
            );
        }
        Ok(())
    }

    /// Attach a property-bound line's bean to its parent, then start a fresh one
    fn attach_line_bean(&mut self, line: &Line) -> Result<()> {
        let Some(cardinality) = &line.cardinality else {
            return Ok(());
        };
        let child = self.built_child(cardinality)?;
        let mode = self.resolved_mode(cardinality);

        if mode == CardinalityMode::Single {
            self.set_single(cardinality, child)?;
        } else {
            let mut attach = true;
            if matches!(mode, CardinalityMode::Strict | CardinalityMode::Restricted) {
                if let Some(property) = cardinality.property_name.as_deref() {
                    let sink = self.sink();
                    let parent = self.parent_bean(cardinality)?;
                    let current = sink.collection_len(parent, property)?;
                    attach = current < cardinality.effective_max();
                }
                if !attach && mode == CardinalityMode::Strict {
                    return Err(Self::cardinality_error(cardinality, mode));
                }
            }
            if attach {
                self.add_to_parent(cardinality, child)?;
            } else {
                debug!(
                    "Dropping line bean for {} beyond maximum {}",
                    cardinality.target_name(),
                    cardinality.effective_max()
                );
            }
        }

        self.renew(&cardinality.bean_ref)
    }
}
