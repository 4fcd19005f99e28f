//! Scenario tests for the record reader
//!
//! Each sub-module drives complete schemas through `RecordReader` with
//! in-memory input.

pub mod lookahead;
pub mod matching;

use crate::binding::{BeanRegistry, PropertyKind, TypeDescriptor};
use crate::config::FormatConfig;
use crate::identity::FieldIdentity;
use crate::models::MatchedRecord;
use crate::parser::RecordReader;
use crate::schema::{Cardinality, FileFormat, Line, Record, RecordDefinition, RecordElement};

/// Order/Item types shared by the scenarios
pub(super) fn order_types() -> BeanRegistry {
    BeanRegistry::new()
        .with_type(
            TypeDescriptor::new("Order")
                .with_property("id", PropertyKind::String)
                .with_property("customer", PropertyKind::String)
                .with_property("items", PropertyKind::List)
                .with_property("total", PropertyKind::Decimal)
                .with_property("note", PropertyKind::String),
        )
        .with_type(
            TypeDescriptor::new("Item")
                .with_property("sku", PropertyKind::String)
                .with_property("qty", PropertyKind::Integer),
        )
}

/// `ORD` header line, `ITM` item lines and an optional `END` trailer
pub(super) fn order_record() -> Record {
    let header = Line::fixed()
        .with_element(RecordElement::filler().with_length(3))
        .with_element(RecordElement::new("order.id").with_length(5))
        .with_element(
            RecordElement::new("order.customer")
                .with_length(10)
                .with_option("justify", "left"),
        );

    let item = Line::fixed()
        .with_identity(FieldIdentity::new(0, 3).with_match("ITM"))
        .with_cardinality(Cardinality::new("item").attached_to("order", "items"))
        .with_element(RecordElement::filler().with_length(3))
        .with_element(RecordElement::new("item.sku").with_length(4))
        .with_element(
            RecordElement::new("item.qty")
                .with_length(3)
                .with_converter("integer")
                .with_option("justify", "right")
                .with_option("pad-character", "0"),
        );

    let trailer = Line::fixed()
        .with_identity(FieldIdentity::new(0, 3).with_match("END"))
        .with_record_end(true)
        .with_element(RecordElement::filler().with_length(3))
        .with_element(
            RecordElement::new("order.total")
                .with_length(6)
                .with_converter("bigdecimal")
                .with_option("decimal-implied", "true")
                .with_option("decimal-places", "2"),
        );

    Record::new(
        "order",
        RecordDefinition::new()
            .with_bean("order", "Order")
            .with_bean("item", "Item")
            .with_line(header)
            .with_line(item)
            .with_line(trailer),
    )
    .with_identity(FieldIdentity::new(0, 3).with_match("ORD"))
}

pub(super) fn order_format(config: FormatConfig) -> FileFormat {
    let format = FileFormat::new(config)
        .with_sink(order_types())
        .with_record(order_record());
    format.validate().unwrap();
    format
}

/// Parse everything, panicking on the first error
pub(super) fn parse_all(format: &FileFormat, input: &str) -> Vec<MatchedRecord> {
    RecordReader::new(format, input.as_bytes())
        .collect::<crate::error::Result<Vec<_>>>()
        .unwrap()
}
