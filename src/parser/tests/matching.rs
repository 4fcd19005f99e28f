//! Record selection, line slicing and error recovery tests

use super::{order_format, order_record, order_types, parse_all};
use crate::binding::{BeanRegistry, PropertyKind, TypeDescriptor};
use crate::config::FormatConfig;
use crate::conversion::Decimal;
use crate::error::FlatrecError;
use crate::identity::{FieldIdentity, LengthIdentity, ScriptIdentity};
use crate::models::Value;
use crate::parser::RecordReader;
use crate::schema::{FileFormat, Line, Record, RecordDefinition, RecordElement};
use crate::script::ScriptRef;

const ONE_ORDER: &str = "ORD00001ACME      \nITMA001005\nITMB002010\nEND001500\n";

fn dvd_format(config: FormatConfig) -> FileFormat {
    let types = BeanRegistry::new().with_type(
        TypeDescriptor::new("Dvd")
            .with_property("sku", PropertyKind::String)
            .with_property("title", PropertyKind::String)
            .with_property("price", PropertyKind::Double),
    );
    let record = Record::new(
        "dvd",
        RecordDefinition::new().with_bean("dvd", "Dvd").with_line(
            Line::fixed()
                .with_element(RecordElement::filler().with_length(3))
                .with_element(RecordElement::new("dvd.sku").with_length(6))
                .with_element(
                    RecordElement::new("dvd.title")
                        .with_length(10)
                        .with_option("justify", "left"),
                ),
        ),
    )
    .with_identity(FieldIdentity::new(0, 3).with_match("DVD"));
    FileFormat::new(config).with_sink(types).with_record(record)
}

#[test]
fn test_header_and_identified_lines_build_one_record() {
    let format = order_format(FormatConfig::default());
    let records = parse_all(&format, ONE_ORDER);

    assert_eq!(records.len(), 1);
    let order = records[0].bean("order").unwrap();
    assert_eq!(records[0].record_name(), "order");
    assert_eq!(order.get_str("id"), Some("00001"));
    assert_eq!(order.get_str("customer"), Some("ACME"));
    assert_eq!(order.get("total"), Some(&Value::Decimal(Decimal::new(1500, 2))));

    let items = order.list("items");
    assert_eq!(items.len(), 2);
    let first = items[0].as_bean().unwrap();
    assert_eq!(first.get_str("sku"), Some("A001"));
    assert_eq!(first.get("qty"), Some(&Value::Integer(5)));
    let second = items[1].as_bean().unwrap();
    assert_eq!(second.get_str("sku"), Some("B002"));
    assert_eq!(second.get("qty"), Some(&Value::Integer(10)));
}

#[test]
fn test_records_follow_each_other_without_separator() {
    let format = order_format(FormatConfig::default());
    let input = "ORD00001ACME      \nITMA001005\nORD00002BETA      \nITMC003001\nEND000099\n";
    let records = parse_all(&format, input);

    assert_eq!(records.len(), 2);
    let first = records[0].bean("order").unwrap();
    assert_eq!(first.get_str("id"), Some("00001"));
    assert_eq!(first.list("items").len(), 1);
    assert!(first.get("total").is_none());

    let second = records[1].bean("order").unwrap();
    assert_eq!(second.get_str("customer"), Some("BETA"));
    assert_eq!(second.list("items").len(), 1);
    assert_eq!(second.get("total"), Some(&Value::Decimal(Decimal::new(99, 2))));
}

#[test]
fn test_unmapped_line_fails_by_default() {
    let format = order_format(FormatConfig::default());
    let mut reader = RecordReader::new(&format, "XXX garbage\n".as_bytes());

    let result = reader.parse_next_record();
    assert!(result.is_err());
    match result.unwrap_err() {
        FlatrecError::UnmatchedLine { line_number, line } => {
            assert_eq!(line_number, 1);
            assert_eq!(line, "XXX garbage");
        }
        _ => panic!("Expected UnmatchedLine error"),
    }
}

#[test]
fn test_unmapped_lines_skipped_when_configured() {
    let format = order_format(FormatConfig::default().with_ignore_unmapped_records(true));
    let input = format!("XXX garbage\n{}", ONE_ORDER);
    let records = parse_all(&format, &input);

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].bean("order").unwrap().get_str("id"), Some("00001"));
}

#[test]
fn test_empty_input_yields_nothing() {
    let format = order_format(FormatConfig::default());
    let mut reader = RecordReader::new(&format, "".as_bytes());
    assert!(reader.parse_next_record().unwrap().is_none());
    assert!(reader.next().is_none());
}

#[test]
fn test_first_matching_record_wins() {
    let types = order_types().with_type(TypeDescriptor::new("Raw").with_property("text", PropertyKind::String));
    let catch_all = Record::new(
        "raw",
        RecordDefinition::new().with_bean("raw", "Raw").with_line(
            Line::fixed().with_element(RecordElement::new("raw.text").with_start(0).with_end(3)),
        ),
    );
    let format = FileFormat::default()
        .with_sink(types)
        .with_record(order_record())
        .with_record(catch_all);

    let records = parse_all(&format, "ORD00001ACME      \nZZZ\n");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].record_name(), "order");
    assert_eq!(records[1].record_name(), "raw");
    assert_eq!(records[1].bean("raw").unwrap().get_str("text"), Some("ZZZ"));
}

#[test]
fn test_line_length_enforced() {
    let format = dvd_format(FormatConfig::default());
    let mut reader = RecordReader::new(&format, "DVD123456Short\n".as_bytes());

    match reader.parse_next_record().unwrap_err() {
        FlatrecError::LineLength {
            record,
            field,
            start,
            end,
            actual,
        } => {
            assert_eq!(record, "dvd");
            assert_eq!(field, "dvd.title");
            assert_eq!(start, 9);
            assert_eq!(end, 19);
            assert_eq!(actual, 14);
        }
        _ => panic!("Expected LineLength error"),
    }
}

#[test]
fn test_short_line_clamped_when_not_enforced() {
    let format = dvd_format(FormatConfig::default().with_enforce_line_lengths(false));
    let records = parse_all(&format, "DVD123456Short\nDVD654321\n");

    assert_eq!(records[0].bean("dvd").unwrap().get_str("title"), Some("Short"));
    assert_eq!(records[1].bean("dvd").unwrap().get_str("title"), Some(""));
}

#[test]
fn test_identity_region_must_fit_in_line() {
    let format = dvd_format(FormatConfig::default());
    let mut reader = RecordReader::new(&format, "DV\n".as_bytes());
    assert!(matches!(
        reader.parse_next_record(),
        Err(FlatrecError::UnmatchedLine { .. })
    ));
}

#[test]
fn test_ignore_case_identity() {
    let types = BeanRegistry::new().with_type(TypeDescriptor::new("Tag"));
    let record = Record::new(
        "tag",
        RecordDefinition::new()
            .with_bean("tag", "Tag")
            .with_line(Line::fixed().with_element(RecordElement::new("tag.code").with_length(3))),
    )
    .with_identity(
        FieldIdentity::new(0, 3)
            .with_match("TAG")
            .with_ignore_case(true),
    );
    let format = FileFormat::default().with_sink(types).with_record(record);

    let records = parse_all(&format, "tag\nTaG\n");
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].bean("tag").unwrap().get_str("code"), Some("TaG"));
}

#[test]
fn test_length_identity_selects_record() {
    let types = BeanRegistry::new().with_type(TypeDescriptor::new("Short"));
    let record = Record::new(
        "short",
        RecordDefinition::new()
            .with_bean("s", "Short")
            .with_line(Line::fixed().with_element(RecordElement::new("s.text").with_length(2))),
    )
    .with_identity(LengthIdentity::new(2, 4));
    let format = FileFormat::default().with_sink(types).with_record(record);

    let mut reader = RecordReader::new(&format, "ab\nabcde\n".as_bytes());
    assert!(reader.next().unwrap().is_ok());
    assert!(matches!(reader.next(), Some(Err(FlatrecError::UnmatchedLine { .. }))));
    assert!(reader.next().is_none());
}

#[test]
fn test_script_identity_and_record_scriptlets() {
    let types = BeanRegistry::new().with_type(TypeDescriptor::new("Note"));
    let identity = ScriptIdentity::new(ScriptRef::identity().compiled(|call| {
        Ok(Value::Bool(call.line.is_some_and(|l| l.starts_with('#'))))
    }));
    let before = ScriptRef::new("stamp").compiled(|call| {
        let beans = call.beans.as_mut().ok_or("no beans")?;
        let note = beans.get_mut("note").ok_or("no note")?;
        note.set("seen", Value::Bool(true));
        Ok(Value::Null)
    });
    let after = ScriptRef::new("upper").compiled(|call| {
        let beans = call.beans.as_mut().ok_or("no beans")?;
        let note = beans.get_mut("note").ok_or("no note")?;
        let text = note.get_str("text").unwrap_or_default().to_uppercase();
        note.set("text", Value::String(text));
        Ok(Value::Null)
    });
    let record = Record::new(
        "note",
        RecordDefinition::new().with_bean("note", "Note").with_line(
            Line::fixed()
                .with_element(RecordElement::filler().with_length(1))
                .with_element(RecordElement::new("note.text").with_length(5)),
        ),
    )
    .with_identity(identity)
    .with_before(before)
    .with_after(after);
    let format = FileFormat::default().with_sink(types).with_record(record);
    format.validate().unwrap();

    let records = parse_all(&format, "#hello\n");
    let note = records[0].bean("note").unwrap();
    assert_eq!(note.get_str("text"), Some("HELLO"));
    assert_eq!(note.get("seen"), Some(&Value::Bool(true)));
}

#[test]
fn test_script_identity_must_return_boolean() {
    let types = BeanRegistry::new().with_type(TypeDescriptor::new("Note"));
    let identity = ScriptIdentity::new(
        ScriptRef::identity().compiled(|_| Ok(Value::String("yes".to_string()))),
    );
    let record = Record::new(
        "note",
        RecordDefinition::new()
            .with_bean("note", "Note")
            .with_line(Line::fixed().with_element(RecordElement::new("note.text").with_length(1))),
    )
    .with_identity(identity);
    let format = FileFormat::default().with_sink(types).with_record(record);

    let mut reader = RecordReader::new(&format, "x\n".as_bytes());
    match reader.parse_next_record().unwrap_err() {
        FlatrecError::Script { target, message } => {
            assert_eq!(target, "record 'note'");
            assert!(message.contains("boolean"));
        }
        _ => panic!("Expected Script error"),
    }
}

#[test]
fn test_conversion_error_names_field_and_reader_recovers() {
    let format = order_format(FormatConfig::default().with_ignore_unmapped_records(true));
    let input = "ORD00001ACME      \nITMA001x05\nEND000100\nORD00002BETA      \n";
    let mut reader = RecordReader::new(&format, input.as_bytes());

    match reader.next().unwrap().unwrap_err() {
        FlatrecError::Conversion { bean_ref, text, .. } => {
            assert_eq!(bean_ref, "item.qty");
            assert_eq!(text, "x05");
        }
        _ => panic!("Expected Conversion error"),
    }
    assert_eq!(reader.line_number(), 2);

    // the END line no longer belongs to a record and is skipped
    let next = reader.next().unwrap().unwrap();
    assert_eq!(next.bean("order").unwrap().get_str("id"), Some("00002"));
    assert!(reader.next().is_none());
}

#[test]
fn test_append_option_concatenates() {
    let types = BeanRegistry::new().with_type(
        TypeDescriptor::new("Name").with_property("full", PropertyKind::String),
    );
    let record = Record::new(
        "name",
        RecordDefinition::new().with_bean("name", "Name").with_line(
            Line::fixed()
                .with_element(RecordElement::new("name.full").with_length(3))
                .with_element(
                    RecordElement::new("name.full")
                        .with_length(3)
                        .with_option("append", "true"),
                ),
        ),
    );
    let format = FileFormat::default().with_sink(types).with_record(record);

    let records = parse_all(&format, "JonDoe\n");
    assert_eq!(records[0].bean("name").unwrap().get_str("full"), Some("JonDoe"));
}

#[test]
fn test_trim_and_ignored_fields() {
    let types = BeanRegistry::new().with_type(TypeDescriptor::new("Row"));
    let record = Record::new(
        "row",
        RecordDefinition::new().with_bean("row", "Row").with_line(
            Line::fixed()
                .with_element(RecordElement::new("row.code").with_length(5).with_trim_value(true))
                .with_element(
                    RecordElement::new("row.skipped")
                        .with_length(3)
                        .with_ignore_field(true),
                )
                .with_element(RecordElement::new("row.rest").with_length(2)),
        ),
    );
    let format = FileFormat::default().with_sink(types).with_record(record);

    let records = parse_all(&format, " ab  xyzZZ\n");
    let row = records[0].bean("row").unwrap();
    assert_eq!(row.get_str("code"), Some("ab"));
    assert!(row.get("skipped").is_none());
    assert_eq!(row.get_str("rest"), Some("ZZ"));
}

#[test]
fn test_delimited_record_drops_identity_token() {
    let types = BeanRegistry::new().with_type(
        TypeDescriptor::new("Dvd")
            .with_property("sku", PropertyKind::String)
            .with_property("price", PropertyKind::Double),
    );
    let record = Record::new(
        "dvd",
        RecordDefinition::new().with_bean("dvd", "Dvd").with_line(
            Line::delimited(",")
                .with_quote('"')
                .with_element(RecordElement::new("dvd.sku"))
                .with_element(RecordElement::new("dvd.price")),
        ),
    )
    .with_identity(FieldIdentity::new(0, 3).with_match("DVD"));
    let format = FileFormat::default().with_sink(types).with_record(record);

    let records = parse_all(&format, "DVD,\"SKU,1\",9.99\n");
    let dvd = records[0].bean("dvd").unwrap();
    assert_eq!(dvd.get_str("sku"), Some("SKU,1"));
    assert_eq!(dvd.get("price"), Some(&Value::Double(9.99)));
}

#[test]
fn test_delimited_line_with_too_few_tokens_keeps_going() {
    let types = BeanRegistry::new().with_type(TypeDescriptor::new("Pair"));
    let record = Record::new(
        "pair",
        RecordDefinition::new().with_bean("pair", "Pair").with_line(
            Line::delimited("\\t")
                .with_element(RecordElement::new("pair.left"))
                .with_element(RecordElement::new("pair.right")),
        ),
    );
    let format = FileFormat::default().with_sink(types).with_record(record);

    let records = parse_all(&format, "only\n\n");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].bean("pair").unwrap().get_str("left"), Some("only"));
    assert!(records[0].bean("pair").unwrap().get("right").is_none());
    assert!(records[1].bean("pair").unwrap().get("left").is_none());
}
