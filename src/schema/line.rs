//! Lines and the elements laid out on them.

use super::cardinality::Cardinality;
use crate::conversion::ConversionOptions;
use crate::identity::{FieldIdentity, Identity};
use crate::script::ScriptRef;
use crate::tokenizer::resolve_delimiter;

/// A scalar field mapping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordElement {
    /// Target as `bean.property`; elements without one are read past
    pub bean_ref: Option<String>,
    pub field_start: Option<usize>,
    pub field_end: Option<usize>,
    pub field_length: Option<usize>,
    pub converter_name: Option<String>,
    pub conversion_options: ConversionOptions,
    pub ignore_field: bool,
    pub trim_value: bool,
    /// Delimited output pads/truncates to `field_length` when set
    pub enforce_field_length: bool,
}

impl RecordElement {
    pub fn new(bean_ref: impl Into<String>) -> Self {
        Self {
            bean_ref: Some(bean_ref.into()),
            ..Self::default()
        }
    }

    /// Element that only advances the cursor
    pub fn filler() -> Self {
        Self::default()
    }

    pub fn with_length(mut self, length: usize) -> Self {
        self.field_length = Some(length);
        self
    }

    pub fn with_start(mut self, start: usize) -> Self {
        self.field_start = Some(start);
        self
    }

    pub fn with_end(mut self, end: usize) -> Self {
        self.field_end = Some(end);
        self
    }

    pub fn with_converter(mut self, name: impl Into<String>) -> Self {
        self.converter_name = Some(name.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.conversion_options.insert(key, value);
        self
    }

    pub fn with_ignore_field(mut self, ignore: bool) -> Self {
        self.ignore_field = ignore;
        self
    }

    pub fn with_trim_value(mut self, trim: bool) -> Self {
        self.trim_value = trim;
        self
    }

    pub fn with_enforce_field_length(mut self, enforce: bool) -> Self {
        self.enforce_field_length = enforce;
        self
    }

    /// `(bean, property)` split at the last dot
    pub fn target(&self) -> Option<(&str, &str)> {
        self.bean_ref.as_deref().and_then(|r| r.rsplit_once('.'))
    }

    /// Width of the field on output, when known
    pub fn width(&self) -> Option<usize> {
        match (self.field_length, self.field_start, self.field_end) {
            (Some(length), _, _) => Some(length),
            (None, Some(start), Some(end)) => Some(end.saturating_sub(start)),
            _ => None,
        }
    }
}

/// A repeatable nested group of elements
#[derive(Debug, Clone)]
pub struct SegmentElement {
    /// Recognises each repetition; segments without one occur exactly once
    pub identity: Option<FieldIdentity>,
    pub cardinality: Cardinality,
    pub elements: Vec<LineElement>,
}

impl SegmentElement {
    pub fn new(cardinality: Cardinality) -> Self {
        Self {
            identity: None,
            cardinality,
            elements: Vec::new(),
        }
    }

    pub fn with_identity(mut self, identity: FieldIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_element(mut self, element: impl Into<LineElement>) -> Self {
        self.elements.push(element.into());
        self
    }
}

#[derive(Debug, Clone)]
pub enum LineElement {
    Field(RecordElement),
    Segment(SegmentElement),
}

impl From<RecordElement> for LineElement {
    fn from(element: RecordElement) -> Self {
        LineElement::Field(element)
    }
}

impl From<SegmentElement> for LineElement {
    fn from(segment: SegmentElement) -> Self {
        LineElement::Segment(segment)
    }
}

/// One physical line's layout within a record
#[derive(Debug, Clone, Default)]
pub struct Line {
    pub id: Option<String>,
    pub elements: Vec<LineElement>,
    /// Single character or `\t`-style escape; absent means fixed width
    pub delimiter: Option<String>,
    pub quote: Option<char>,
    /// Set on lines matched independently after the fixed lines
    pub identity: Option<Identity>,
    /// Set when the line's bean is attached to a parent property
    pub cardinality: Option<Cardinality>,
    pub record_start_line: bool,
    pub record_end_line: bool,
    pub before: Option<ScriptRef>,
    pub after: Option<ScriptRef>,
}

impl Line {
    pub fn fixed() -> Self {
        Self::default()
    }

    pub fn delimited(delimiter: impl Into<String>) -> Self {
        Self {
            delimiter: Some(delimiter.into()),
            ..Self::default()
        }
    }

    pub fn with_quote(mut self, quote: char) -> Self {
        self.quote = Some(quote);
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_element(mut self, element: impl Into<LineElement>) -> Self {
        self.elements.push(element.into());
        self
    }

    pub fn with_identity(mut self, identity: impl Into<Identity>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    pub fn with_cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = Some(cardinality);
        self
    }

    pub fn with_record_end(mut self, end: bool) -> Self {
        self.record_end_line = end;
        self
    }

    pub fn with_record_start(mut self, start: bool) -> Self {
        self.record_start_line = start;
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

    pub fn is_delimited(&self) -> bool {
        self.delimiter
            .as_deref()
            .is_some_and(|d| !d.trim().is_empty() || d == "\t")
    }

    /// Resolved split character for delimited lines
    pub fn split_char(&self) -> Option<char> {
        if !self.is_delimited() {
            return None;
        }
        self.delimiter.as_deref().and_then(resolve_delimiter)
    }

    /// Delimiter text written between fields; empty for fixed-width lines
    pub fn output_delimiter(&self) -> String {
        self.split_char().map(String::from).unwrap_or_default()
    }

    /// The line's bean is attached to a parent property after it is parsed
    pub fn is_property_line(&self) -> bool {
        self.cardinality.is_some()
    }

    pub fn has_identity(&self) -> bool {
        self.identity.is_some()
    }

    /// All record elements, including those nested in segments, depth first
    pub fn record_elements(&self) -> Vec<&RecordElement> {
        fn collect<'l>(elements: &'l [LineElement], out: &mut Vec<&'l RecordElement>) {
            for element in elements {
                match element {
                    LineElement::Field(field) => out.push(field),
                    LineElement::Segment(segment) => collect(&segment.elements, out),
                }
            }
        }
        let mut out = Vec::new();
        collect(&self.elements, &mut out);
        out
    }

    /// All segments, breadth first
    pub fn segments(&self) -> Vec<&SegmentElement> {
        let mut out: Vec<&SegmentElement> = Vec::new();
        let mut level: Vec<&[LineElement]> = vec![&self.elements];
        while !level.is_empty() {
            let mut next = Vec::new();
            for elements in level {
                for element in elements {
                    if let LineElement::Segment(segment) = element {
                        out.push(segment);
                        next.push(segment.elements.as_slice());
                    }
                }
            }
            level = next;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_target_and_width() {
        let element = RecordElement::new("order.customer.name").with_length(10);
        assert_eq!(element.target(), Some(("order.customer", "name")));
        assert_eq!(element.width(), Some(10));
        assert_eq!(RecordElement::new("x").target(), None);
        assert_eq!(
            RecordElement::filler().with_start(4).with_end(9).width(),
            Some(5)
        );
    }

    #[test]
    fn test_delimiter_resolution() {
        assert_eq!(Line::delimited(",").split_char(), Some(','));
        assert_eq!(Line::delimited("\\t").split_char(), Some('\t'));
        assert_eq!(Line::delimited("\t").split_char(), Some('\t'));
        assert_eq!(Line::fixed().split_char(), None);
        assert_eq!(Line::delimited("").split_char(), None);
        assert_eq!(Line::fixed().output_delimiter(), "");
    }

    #[test]
    fn test_segments_breadth_first() {
        let inner = SegmentElement::new(Cardinality::new("inner"));
        let outer = SegmentElement::new(Cardinality::new("outer")).with_element(inner);
        let sibling = SegmentElement::new(Cardinality::new("sibling"));
        let line = Line::fixed()
            .with_element(RecordElement::new("a.b").with_length(1))
            .with_element(outer)
            .with_element(sibling);
        let names: Vec<&str> = line
            .segments()
            .iter()
            .map(|s| s.cardinality.bean_ref.as_str())
            .collect();
        assert_eq!(names, vec!["outer", "sibling", "inner"]);
    }
}
