//! Callback dispatch over a whole input stream.
//!
//! [`FileParser`] drives a [`RecordReader`] to the end of its input, hands
//! each matched record to the handler registered for its name and routes
//! record errors to a single exception handler. Without an exception handler
//! the first error ends the run.

use crate::error::{FlatrecError, Result};
use crate::models::{MatchedRecord, ParseStats};
use crate::parser::{EncodedLines, LineSource, RecordReader};
use crate::schema::FileFormat;
use std::collections::HashMap;
use std::io::{BufReader, Read};
use tracing::{debug, error, info};

type RecordHandler<'h> = Box<dyn FnMut(MatchedRecord) -> Result<()> + 'h>;
type ExceptionHandler<'h> = Box<dyn FnMut(&FlatrecError, Option<&str>) + 'h>;

pub struct FileParser<'f, 'h> {
    format: &'f FileFormat,
    handlers: HashMap<String, RecordHandler<'h>>,
    exception_handler: Option<ExceptionHandler<'h>>,
}

impl<'f, 'h> FileParser<'f, 'h> {
    pub fn new(format: &'f FileFormat) -> Self {
        Self {
            format,
            handlers: HashMap::new(),
            exception_handler: None,
        }
    }

    /// Register the handler for records named `record_name`, replacing any earlier one
    pub fn on_record<F>(mut self, record_name: impl Into<String>, handler: F) -> Self
    where
        F: FnMut(MatchedRecord) -> Result<()> + 'h,
    {
        self.handlers.insert(record_name.into(), Box::new(handler));
        self
    }

    /// Register the handler receiving each record error and the line being read
    pub fn on_exception<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&FlatrecError, Option<&str>) + 'h,
    {
        self.exception_handler = Some(Box::new(handler));
        self
    }

    /// Parse a byte stream decoded with the format's encoding
    pub fn parse_reader<R: Read>(&mut self, input: R) -> Result<ParseStats> {
        let encoding = self.format.encoding()?;
        let source = EncodedLines::new(BufReader::new(input), encoding);
        self.run(source)
    }

    /// Dispatch every record of `source`
    pub fn run<S: LineSource>(&mut self, source: S) -> Result<ParseStats> {
        let mut reader = RecordReader::new(self.format, source);
        let mut stats = ParseStats::new();

        loop {
            let outcome = match reader.parse_next_record() {
                Ok(Some(record)) => {
                    let name = record.record_name().to_string();
                    self.dispatch(record).map(|()| stats.record_matched(&name))
                }
                Ok(None) => break,
                Err(error) => Err(error),
            };

            if let Err(error) = outcome {
                stats.record_failed(error.kind());
                match self.exception_handler.as_mut() {
                    Some(handler) if error.is_record_scoped() => {
                        debug!("Handing {} error to exception handler", error.kind());
                        handler(&error, reader.current_line());
                    }
                    _ => {
                        error!("Parsing stopped at line {}: {}", reader.line_number(), error);
                        return Err(error);
                    }
                }
            }
        }

        stats.lines_read = reader.line_number();
        info!(
            "Dispatched {} records from {} lines ({} failed)",
            stats.records_matched, stats.lines_read, stats.records_failed
        );
        Ok(stats)
    }

    fn dispatch(&mut self, record: MatchedRecord) -> Result<()> {
        match self.handlers.get_mut(record.record_name()) {
            Some(handler) => handler(record),
            None => {
                debug!("No handler registered for record '{}'", record.record_name());
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{BeanRegistry, TypeDescriptor};
    use crate::identity::FieldIdentity;
    use crate::schema::{Line, Record, RecordDefinition, RecordElement};
    use std::cell::RefCell;

    fn format() -> FileFormat {
        let types = BeanRegistry::new()
            .with_type(TypeDescriptor::new("Head"))
            .with_type(TypeDescriptor::new("Body"));
        let head = Record::new(
            "head",
            RecordDefinition::new().with_bean("h", "Head").with_line(
                Line::fixed()
                    .with_element(RecordElement::filler().with_length(1))
                    .with_element(RecordElement::new("h.text").with_length(3)),
            ),
        )
        .with_identity(FieldIdentity::new(0, 1).with_match("H"));
        let body = Record::new(
            "body",
            RecordDefinition::new().with_bean("b", "Body").with_line(
                Line::fixed()
                    .with_element(RecordElement::filler().with_length(1))
                    .with_element(RecordElement::new("b.text").with_length(3)),
            ),
        )
        .with_identity(FieldIdentity::new(0, 1).with_match("B"));
        FileFormat::default()
            .with_sink(types)
            .with_record(head)
            .with_record(body)
    }

    #[test]
    fn test_handlers_receive_records_by_name() {
        let format = format();
        let bodies = RefCell::new(Vec::new());

        let stats = FileParser::new(&format)
            .on_record("body", |record| {
                let text = record.bean("b").and_then(|b| b.get_str("text")).unwrap_or_default();
                bodies.borrow_mut().push(text.to_string());
                Ok(())
            })
            .run("Hone\nBtwo\nBsix\n".as_bytes())
            .unwrap();

        assert_eq!(bodies.into_inner(), vec!["two", "six"]);
        assert_eq!(stats.lines_read, 3);
        assert_eq!(stats.records_matched, 3);
        assert_eq!(stats.records_by_name.get("head"), Some(&1));
        assert_eq!(stats.records_by_name.get("body"), Some(&2));
    }

    #[test]
    fn test_first_error_returned_without_exception_handler() {
        let format = format();
        let result = FileParser::new(&format).run("Hone\nXbad\nBtwo\n".as_bytes());

        match result.unwrap_err() {
            FlatrecError::UnmatchedLine { line_number, .. } => assert_eq!(line_number, 2),
            _ => panic!("Expected UnmatchedLine error"),
        }
    }

    #[test]
    fn test_exception_handler_sees_error_and_line() {
        let format = format();
        let failures = RefCell::new(Vec::new());

        let stats = FileParser::new(&format)
            .on_exception(|error, line| {
                failures
                    .borrow_mut()
                    .push((error.kind(), line.map(str::to_string)));
            })
            .run("Hone\nXbad\nBtwo\n".as_bytes())
            .unwrap();

        assert_eq!(
            failures.into_inner(),
            vec![("unmatched-line", Some("Xbad".to_string()))]
        );
        assert_eq!(stats.records_matched, 2);
        assert_eq!(stats.records_failed, 1);
        assert_eq!(stats.errors_by_kind.get("unmatched-line"), Some(&1));
    }

    #[test]
    fn test_handler_error_goes_to_exception_handler() {
        let format = format();
        let mut seen = Vec::new();

        let stats = FileParser::new(&format)
            .on_record("head", |_| Err(FlatrecError::binding("h", "text", "rejected")))
            .on_exception(|error, _| seen.push(error.kind()))
            .run("Hone\nBtwo\n".as_bytes())
            .unwrap();

        assert_eq!(seen, vec!["binding"]);
        // the rejected record counts as failed only
        assert_eq!(stats.records_matched, 1);
        assert_eq!(stats.records_failed, 1);
        assert_eq!(stats.records_by_name.get("head"), None);
        assert_eq!(stats.records_by_name.get("body"), Some(&1));
    }

    #[test]
    fn test_configuration_errors_bypass_exception_handler() {
        let format = format();
        let mut seen = 0;

        let result = FileParser::new(&format)
            .on_record("head", |_| Err(FlatrecError::configuration("rejected")))
            .on_exception(|_, _| seen += 1)
            .run("Hone\nBtwo\n".as_bytes());

        assert!(matches!(result, Err(FlatrecError::Configuration { .. })));
        assert_eq!(seen, 0);
    }

    #[test]
    fn test_parse_reader_decodes_latin1() {
        let mut format = format();
        format.config = format.config.clone().with_encoding("latin1");
        let texts = RefCell::new(Vec::new());

        FileParser::new(&format)
            .on_record("head", |record| {
                let text = record.bean("h").and_then(|b| b.get_str("text")).unwrap_or_default();
                texts.borrow_mut().push(text.to_string());
                Ok(())
            })
            .parse_reader(&b"H\xE9t\xE9\n"[..])
            .unwrap();

        assert_eq!(texts.into_inner(), vec!["\u{e9}t\u{e9}"]);
    }

    #[test]
    fn test_undecodable_line_goes_to_exception_handler() {
        let format = format();
        let bodies = RefCell::new(Vec::new());
        let failures = RefCell::new(Vec::new());

        let stats = FileParser::new(&format)
            .on_record("body", |record| {
                let text = record.bean("b").and_then(|b| b.get_str("text")).unwrap_or_default();
                bodies.borrow_mut().push(text.to_string());
                Ok(())
            })
            .on_exception(|error, line| {
                let line_number = match error {
                    FlatrecError::Encoding { line_number, .. } => *line_number,
                    _ => 0,
                };
                failures
                    .borrow_mut()
                    .push((error.kind(), line_number, line.map(str::to_string)));
            })
            .parse_reader(&b"Habc\n\xff\xfe\nBxyz\n"[..])
            .unwrap();

        assert_eq!(bodies.into_inner(), vec!["xyz"]);
        assert_eq!(
            failures.into_inner(),
            vec![("encoding", 2, Some("\u{fffd}\u{fffd}".to_string()))]
        );
        assert_eq!(stats.lines_read, 3);
        assert_eq!(stats.records_matched, 2);
        assert_eq!(stats.records_failed, 1);
    }
}
