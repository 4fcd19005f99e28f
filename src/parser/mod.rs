//! Record matching engine.
//!
//! [`RecordReader`] pulls physical lines from a [`LineSource`], selects the
//! record whose identity accepts the first line, reads the record's remaining
//! sequential lines and then any trailing lines matched by their own
//! identities. A trailing line that no identity accepts is kept as a
//! one-line lookahead and offered to the next [`RecordReader::parse_next_record`]
//! call.
//!
//! Every failure is scoped to the record being parsed: the reader is ready
//! for the next call once an error has been returned.

mod assembly;

#[cfg(test)]
mod tests;

use crate::config::Encoding;
use crate::error::{FlatrecError, Result};
use crate::identity::IdentityContext;
use crate::models::MatchedRecord;
use crate::schema::{FileFormat, Line, Record};
use assembly::Assembler;
use std::io::{BufRead, BufReader, Read};
use tracing::{debug, warn};

/// Source of physical lines, without their line terminators
pub trait LineSource {
    fn next_line(&mut self) -> Result<Option<String>>;
}

fn trim_line_ending(line: &mut String) {
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
}

/// UTF-8 lines from any buffered reader
impl<R: BufRead> LineSource for R {
    fn next_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        if BufRead::read_line(self, &mut line)? == 0 {
            return Ok(None);
        }
        trim_line_ending(&mut line);
        Ok(Some(line))
    }
}

/// Lines decoded with an explicit [`Encoding`]
pub struct EncodedLines<R> {
    inner: R,
    encoding: Encoding,
    buffer: Vec<u8>,
}

impl<R: BufRead> EncodedLines<R> {
    pub fn new(inner: R, encoding: Encoding) -> Self {
        Self {
            inner,
            encoding,
            buffer: Vec::new(),
        }
    }
}

impl<R: BufRead> LineSource for EncodedLines<R> {
    fn next_line(&mut self) -> Result<Option<String>> {
        self.buffer.clear();
        if self.inner.read_until(b'\n', &mut self.buffer)? == 0 {
            return Ok(None);
        }
        let mut line = self.encoding.decode(&self.buffer)?;
        trim_line_ending(&mut line);
        Ok(Some(line))
    }
}

/// Pulls matched records from a line source
pub struct RecordReader<'f, S> {
    format: &'f FileFormat,
    source: S,
    lookahead: Option<String>,
    line_number: usize,
    current_line: Option<String>,
    fused: bool,
}

impl<'f, R: Read> RecordReader<'f, EncodedLines<BufReader<R>>> {
    /// Reader decoding with the format's configured encoding
    pub fn encoded(format: &'f FileFormat, reader: R) -> Result<Self> {
        let encoding = format.encoding()?;
        Ok(Self::new(format, EncodedLines::new(BufReader::new(reader), encoding)))
    }
}

impl<'f, S: LineSource> RecordReader<'f, S> {
    pub fn new(format: &'f FileFormat, source: S) -> Self {
        Self {
            format,
            source,
            lookahead: None,
            line_number: 0,
            current_line: None,
            fused: false,
        }
    }

    /// Number of the physical line most recently read
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// The physical line most recently read
    pub fn current_line(&self) -> Option<&str> {
        self.current_line.as_deref()
    }

    /// Whether a line read past the last record is waiting for the next call
    pub fn has_lookahead(&self) -> bool {
        self.lookahead.is_some()
    }

    fn read_physical(&mut self) -> Result<Option<String>> {
        if let Some(line) = self.lookahead.take() {
            return Ok(Some(line));
        }
        let line = match self.source.next_line() {
            // the bad line is consumed, so it still counts
            Err(FlatrecError::Encoding { encoding, line, .. }) => {
                self.line_number += 1;
                self.current_line = Some(line.clone());
                return Err(FlatrecError::Encoding {
                    line_number: self.line_number,
                    encoding,
                    line,
                });
            }
            other => other?,
        };
        if let Some(text) = &line {
            self.line_number += 1;
            self.current_line = Some(text.clone());
        }
        Ok(line)
    }

    /// Next matched record, or `None` at a clean end of input
    pub fn parse_next_record(&mut self) -> Result<Option<MatchedRecord>> {
        let format = self.format;
        loop {
            let Some(line) = self.read_physical()? else {
                return Ok(None);
            };
            match format.match_record(&line)? {
                Some(record) => return self.parse_record(record, line).map(Some),
                None if format.config.ignore_unmapped_records => {
                    warn!("Skipping unmapped line {}", self.line_number);
                }
                None => {
                    return Err(FlatrecError::UnmatchedLine {
                        line_number: self.line_number,
                        line,
                    });
                }
            }
        }
    }

    fn parse_record(&mut self, record: &'f Record, first_line: String) -> Result<MatchedRecord> {
        debug!("Parsing record '{}' from line {}", record.name, self.line_number);
        let mut assembler = Assembler::start(self.format, record)?;
        assembler.run_record_script(record.before.as_ref(), Some(&first_line))?;

        let sequential: Vec<(usize, &'f Line)> = record.definition.sequential_lines().collect();
        let mut text = first_line;
        for (position, (index, line)) in sequential.iter().enumerate() {
            if position > 0 {
                text = self.read_physical()?.ok_or_else(|| FlatrecError::UnexpectedEndOfInput {
                    record: record.name.clone(),
                    expected: sequential.len(),
                    read: position,
                    line_number: self.line_number,
                })?;
            }
            assembler.parse_line(*index, line, &text)?;
        }

        self.parse_identified_lines(record, &mut assembler)?;

        assembler.run_record_script(record.after.as_ref(), None)?;
        Ok(MatchedRecord::new(record.name.clone(), assembler.finish()))
    }

    /// Consume trailing lines matched by the record's line identities
    fn parse_identified_lines(&mut self, record: &'f Record, assembler: &mut Assembler<'f>) -> Result<()> {
        let candidates: Vec<(usize, &'f Line)> = record.definition.lines_with_identities().collect();
        if candidates.is_empty() {
            return Ok(());
        }

        while let Some(text) = self.read_physical()? {
            let mut matched = None;
            for (index, line) in &candidates {
                let Some(identity) = &line.identity else {
                    continue;
                };
                let context = IdentityContext::Line {
                    record: &record.name,
                    line_index: *index,
                };
                if identity.matches(context, Some(&text))? {
                    matched = Some((*index, *line));
                    break;
                }
            }

            let Some((index, line)) = matched else {
                debug!("Line {} left for the next record", self.line_number);
                self.lookahead = Some(text);
                break;
            };
            assembler.parse_line(index, line, &text)?;
            if line.record_end_line {
                break;
            }
        }
        Ok(())
    }
}

impl<S: LineSource> Iterator for RecordReader<'_, S> {
    type Item = Result<MatchedRecord>;

    /// Yields record errors and keeps going; stops after an I/O or
    /// configuration error
    fn next(&mut self) -> Option<Self::Item> {
        if self.fused {
            return None;
        }
        match self.parse_next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.fused = true;
                None
            }
            Err(error) => {
                if !error.is_record_scoped() {
                    self.fused = true;
                }
                Some(Err(error))
            }
        }
    }
}
