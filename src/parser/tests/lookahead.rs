//! Identity-line lookahead and record boundary tests

use super::{order_format, order_record, order_types, parse_all};
use crate::binding::{BeanRegistry, TypeDescriptor};
use crate::config::FormatConfig;
use crate::dispatch::FileParser;
use crate::error::FlatrecError;
use crate::identity::FieldIdentity;
use crate::parser::RecordReader;
use crate::schema::{Cardinality, CardinalityMode, FileFormat, Line, Record, RecordDefinition, RecordElement};
use std::cell::RefCell;

fn limited_items(mode: CardinalityMode) -> FileFormat {
    let mut record = order_record();
    record.definition.lines[1].cardinality = Some(
        Cardinality::new("item")
            .attached_to("order", "items")
            .with_counts(0, 2)
            .with_mode(mode),
    );
    let format = FileFormat::default()
        .with_sink(order_types())
        .with_record(record);
    format.validate().unwrap();
    format
}

const THREE_ITEMS: &str = "ORD00001ACME      \nITMA001001\nITMB002002\nITMC003003\nEND000300\n";

#[test]
fn test_unmatched_line_is_kept_for_next_record() {
    let format = order_format(FormatConfig::default());
    let input = "ORD00001ACME      \nITMA001005\nORD00002BETA      \n";
    let mut reader = RecordReader::new(&format, input.as_bytes());

    let first = reader.parse_next_record().unwrap().unwrap();
    assert_eq!(first.bean("order").unwrap().list("items").len(), 1);
    assert!(reader.has_lookahead());
    assert_eq!(reader.line_number(), 3);

    let second = reader.parse_next_record().unwrap().unwrap();
    assert_eq!(second.bean("order").unwrap().get_str("id"), Some("00002"));
    assert!(!reader.has_lookahead());
    assert!(reader.parse_next_record().unwrap().is_none());
}

#[test]
fn test_end_of_input_while_looking_ahead_completes_record() {
    let format = order_format(FormatConfig::default());
    let mut reader = RecordReader::new(&format, "ORD00001ACME      \nITMA001005".as_bytes());

    let record = reader.parse_next_record().unwrap().unwrap();
    assert_eq!(record.bean("order").unwrap().list("items").len(), 1);
    assert!(!reader.has_lookahead());
    assert!(reader.parse_next_record().unwrap().is_none());
}

#[test]
fn test_record_end_line_stops_lookahead() {
    let format = order_format(FormatConfig::default());
    let input = "ORD00001ACME      \nEND000100\nITMZ999001\n";
    let mut reader = RecordReader::new(&format, input.as_bytes());

    let record = reader.parse_next_record().unwrap().unwrap();
    assert!(record.bean("order").unwrap().list("items").is_empty());
    assert!(!reader.has_lookahead());

    // the item line after the trailer belongs to no record
    match reader.parse_next_record().unwrap_err() {
        FlatrecError::UnmatchedLine { line_number, .. } => assert_eq!(line_number, 3),
        _ => panic!("Expected UnmatchedLine error"),
    }
}

#[test]
fn test_identity_lines_repeat_until_trailer() {
    let format = order_format(FormatConfig::default());
    let input = "ORD00001ACME      \nITMA001001\nEND000100\n";
    let two_items = "ORD00001ACME      \nITMA001001\nITMB002002\nEND000100\n";

    assert_eq!(parse_all(&format, input).len(), 1);
    let records = parse_all(&format, two_items);
    assert_eq!(records[0].bean("order").unwrap().list("items").len(), 2);
}

#[test]
fn test_strict_limit_on_property_lines() {
    let format = limited_items(CardinalityMode::Strict);
    let mut reader = RecordReader::new(&format, THREE_ITEMS.as_bytes());

    match reader.parse_next_record().unwrap_err() {
        FlatrecError::Cardinality {
            property,
            max_count,
            mode,
            ..
        } => {
            assert_eq!(property, "items");
            assert_eq!(max_count, 2);
            assert_eq!(mode, "STRICT");
        }
        _ => panic!("Expected Cardinality error"),
    }
    assert_eq!(reader.line_number(), 4);
    assert!(!reader.has_lookahead());

    // the rejected item line is not replayed; reading resumes at the trailer
    match reader.parse_next_record().unwrap_err() {
        FlatrecError::UnmatchedLine { line_number, line } => {
            assert_eq!(line_number, 5);
            assert_eq!(line, "END000300");
        }
        _ => panic!("Expected UnmatchedLine error"),
    }
    assert!(reader.parse_next_record().unwrap().is_none());
}

#[test]
fn test_strict_limit_failure_is_recoverable_by_dispatcher() {
    let format = limited_items(CardinalityMode::Strict);
    let input = format!("{}ORD00002BETA      \nITMD004004\nEND000100\n", THREE_ITEMS);
    let orders = RefCell::new(Vec::new());
    let failures = RefCell::new(Vec::new());

    let stats = FileParser::new(&format)
        .on_record("order", |record| {
            let order = record.bean("order").unwrap();
            orders
                .borrow_mut()
                .push((order.get_str("id").unwrap_or_default().to_string(), order.list("items").len()));
            Ok(())
        })
        .on_exception(|error, line| {
            failures
                .borrow_mut()
                .push((error.kind(), line.map(str::to_string)));
        })
        .run(input.as_bytes())
        .unwrap();

    assert_eq!(
        failures.into_inner(),
        vec![
            ("cardinality", Some("ITMC003003".to_string())),
            ("unmatched-line", Some("END000300".to_string())),
        ]
    );
    assert_eq!(orders.into_inner(), vec![("00002".to_string(), 1)]);
    assert_eq!(stats.records_matched, 1);
    assert_eq!(stats.records_failed, 2);
    assert_eq!(stats.lines_read, 8);
}

#[test]
fn test_restricted_limit_on_property_lines() {
    let format = limited_items(CardinalityMode::Restricted);
    let records = parse_all(&format, THREE_ITEMS);

    let items = records[0].bean("order").unwrap().list("items");
    assert_eq!(items.len(), 2);
    assert_eq!(items[1].as_bean().unwrap().get_str("sku"), Some("B002"));
}

#[test]
fn test_sequential_lines_require_enough_input() {
    let types = BeanRegistry::new().with_type(TypeDescriptor::new("Pair"));
    let record = Record::new(
        "pair",
        RecordDefinition::new()
            .with_bean("pair", "Pair")
            .with_line(
                Line::fixed()
                    .with_element(RecordElement::filler().with_length(3))
                    .with_element(RecordElement::new("pair.left").with_length(2)),
            )
            .with_line(Line::fixed().with_element(RecordElement::new("pair.right").with_length(2))),
    )
    .with_identity(FieldIdentity::new(0, 3).with_match("HDR"));
    let format = FileFormat::default().with_sink(types).with_record(record);

    let records = parse_all(&format, "HDR01\nzz\n");
    assert_eq!(records[0].bean("pair").unwrap().get_str("right"), Some("zz"));

    let mut reader = RecordReader::new(&format, "HDR01\n".as_bytes());
    match reader.parse_next_record().unwrap_err() {
        FlatrecError::UnexpectedEndOfInput {
            record,
            expected,
            read,
            line_number,
        } => {
            assert_eq!(record, "pair");
            assert_eq!(expected, 2);
            assert_eq!(read, 1);
            assert_eq!(line_number, 1);
        }
        _ => panic!("Expected UnexpectedEndOfInput error"),
    }
}

#[test]
fn test_crlf_line_endings() {
    let format = order_format(FormatConfig::default());
    let records = parse_all(&format, "ORD00001ACME      \r\nITMA001005\r\nEND000100\r\n");
    assert_eq!(records[0].bean("order").unwrap().list("items").len(), 1);
}

#[test]
fn test_latin1_input() {
    let format = order_format(FormatConfig::default().with_encoding("ISO-8859-1"));
    let input: &[u8] = b"ORD00001CAF\xE9      \nEND000100\n";
    let mut reader = RecordReader::encoded(&format, input).unwrap();

    let record = reader.parse_next_record().unwrap().unwrap();
    assert_eq!(record.bean("order").unwrap().get_str("customer"), Some("CAF\u{e9}"));
}
