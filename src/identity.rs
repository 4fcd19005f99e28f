//! Identity evaluators deciding whether a record or line applies to input.
//!
//! Three variants: a length range, a positional field match and a scripted
//! predicate. Field identities also match pre-split delimited tokens and
//! positions relative to a fixed-width cursor, which is how segments find
//! their repetitions.

use crate::error::Result;
use crate::script::{ScriptCall, ScriptRef};
use crate::tokenizer::LineToken;

/// Number of characters in `text`
pub(crate) fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Characters `[start, end)` of `text`, clamped to its length
pub(crate) fn char_slice(text: &str, start: usize, end: usize) -> &str {
    let mut indices = text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len()));
    let from = indices.nth(start).unwrap_or(text.len());
    let to = if end > start {
        indices.nth(end - start - 1).unwrap_or(text.len())
    } else {
        from
    };
    &text[from..to]
}

/// Which part of the schema an identity is evaluated for
#[derive(Debug, Clone, Copy)]
pub enum IdentityContext<'a> {
    Record { record: &'a str },
    Line { record: &'a str, line_index: usize },
}

impl<'a> IdentityContext<'a> {
    fn script_call(&self, line: Option<&'a str>) -> ScriptCall<'a> {
        match *self {
            IdentityContext::Record { record } => ScriptCall::for_record(record, line),
            IdentityContext::Line { record, line_index } => {
                ScriptCall::for_line(record, line_index, line)
            }
        }
    }
}

/// Inclusive line length range
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LengthIdentity {
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
}

impl LengthIdentity {
    pub fn new(min_length: usize, max_length: usize) -> Self {
        Self {
            min_length: Some(min_length),
            max_length: Some(max_length),
        }
    }

    /// Unset bounds never match; load-time validation rejects them
    pub fn matches(&self, line: &str) -> bool {
        match (self.min_length, self.max_length) {
            (Some(min), Some(max)) => (min..=max).contains(&char_len(line)),
            _ => false,
        }
    }
}

/// Match strings at a fixed position (or on a delimited token)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldIdentity {
    pub start_position: Option<usize>,
    pub field_length: Option<usize>,
    pub ignore_case: bool,
    /// In declaration order; the first is the one written on output
    pub match_strings: Vec<String>,
}

impl FieldIdentity {
    pub fn new(start_position: usize, field_length: usize) -> Self {
        Self {
            start_position: Some(start_position),
            field_length: Some(field_length),
            ..Self::default()
        }
    }

    /// Identity without position, matching tokens by text only
    pub fn text_only() -> Self {
        Self::default()
    }

    pub fn with_match(mut self, text: impl Into<String>) -> Self {
        self.match_strings.push(text.into());
        self
    }

    pub fn with_ignore_case(mut self, ignore_case: bool) -> Self {
        self.ignore_case = ignore_case;
        self
    }

    /// String written for this identity on output
    pub fn primary(&self) -> Option<&str> {
        self.match_strings.first().map(String::as_str)
    }

    fn equals(&self, candidate: &str, expected: &str) -> bool {
        if self.ignore_case {
            candidate.to_lowercase() == expected.to_lowercase()
        } else {
            candidate == expected
        }
    }

    /// Whether `text` is one of the match strings
    pub fn matches_text(&self, text: &str) -> bool {
        self.match_strings.iter().any(|m| self.equals(text, m))
    }

    /// Region `[start, start + length)` of the line equals a match string.
    ///
    /// A line shorter than the region never matches.
    pub fn matches_line(&self, line: &str) -> bool {
        let (Some(start), Some(length)) = (self.start_position, self.field_length) else {
            return false;
        };
        if char_len(line) < start + length {
            return false;
        }
        let region = char_slice(line, start, start + length);
        self.matches_text(region)
    }

    /// Token match: column and full length are checked only when configured
    pub fn matches_token(&self, token: &LineToken) -> bool {
        if self.start_position.is_some_and(|start| token.column != start) {
            return false;
        }
        if self
            .field_length
            .is_some_and(|length| token.full_length != length)
        {
            return false;
        }
        self.matches_text(&token.text)
    }

    /// Match relative to a fixed-width cursor; returns the characters consumed
    /// through the end of the identifier.
    pub fn match_at(&self, line: &str, cursor: usize) -> Option<usize> {
        let start = cursor + self.start_position.unwrap_or(0);
        let available = char_len(line);
        self.match_strings.iter().find_map(|expected| {
            let length = self.field_length.unwrap_or_else(|| char_len(expected));
            if available < start + length {
                return None;
            }
            let region = char_slice(line, start, start + length);
            self.equals(region, expected)
                .then_some(start + length - cursor)
        })
    }
}

/// Predicate function supplied by the embedding application
#[derive(Debug, Clone)]
pub struct ScriptIdentity {
    pub script: ScriptRef,
}

impl ScriptIdentity {
    pub fn new(script: ScriptRef) -> Self {
        Self { script }
    }
}

#[derive(Debug, Clone)]
pub enum Identity {
    Length(LengthIdentity),
    Field(FieldIdentity),
    Script(ScriptIdentity),
}

impl Identity {
    /// Evaluate against a physical line; an absent line never matches
    pub fn matches(&self, context: IdentityContext<'_>, line: Option<&str>) -> Result<bool> {
        match self {
            Identity::Length(identity) => Ok(line.is_some_and(|l| identity.matches(l))),
            Identity::Field(identity) => Ok(line.is_some_and(|l| identity.matches_line(l))),
            Identity::Script(identity) => {
                let mut call = context.script_call(line);
                identity.script.test(&mut call)
            }
        }
    }

    /// Token matching; only field identities can recognise a token
    pub fn matches_token(&self, token: &LineToken) -> bool {
        match self {
            Identity::Field(identity) => identity.matches_token(token),
            _ => false,
        }
    }

    pub fn as_field(&self) -> Option<&FieldIdentity> {
        match self {
            Identity::Field(identity) => Some(identity),
            _ => None,
        }
    }

    pub fn script_mut(&mut self) -> Option<&mut ScriptRef> {
        match self {
            Identity::Script(identity) => Some(&mut identity.script),
            _ => None,
        }
    }
}

impl From<LengthIdentity> for Identity {
    fn from(identity: LengthIdentity) -> Self {
        Identity::Length(identity)
    }
}

impl From<FieldIdentity> for Identity {
    fn from(identity: FieldIdentity) -> Self {
        Identity::Field(identity)
    }
}

impl From<ScriptIdentity> for Identity {
    fn from(identity: ScriptIdentity) -> Self {
        Identity::Script(identity)
    }
}
