//! Core data structures and types for record mapping.
//!
//! Defines the dynamic values and beans the engine populates, the
//! per-record bean map, the matched-record result handed to callers and
//! the statistics gathered while dispatching a stream.

use rust_decimal::Decimal;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// A typed value produced by conversion or held by a bean property
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Decimal(Decimal),
    String(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Bean(Bean),
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bean(&self) -> Option<&Bean> {
        match self {
            Value::Bean(bean) => Some(bean),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Variant name, used in binding and conversion messages
    pub fn type_label(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Decimal(_) => "bigdecimal",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
            Value::Bean(_) => "bean",
            Value::List(_) => "list",
        }
    }

    /// Rebuild a value from its JSON form; objects become beans typed by `@type`
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Long(i),
                None => Value::Double(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(_) => Value::Bean(Bean::from_json(json)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Long(l) => write!(f, "{}", l),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::String(s) => f.write_str(s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            Value::Bean(bean) => write!(f, "{}{{..}}", bean.type_name),
            Value::List(items) => write!(f, "[{} items]", items.len()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Long(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<Bean> for Value {
    fn from(value: Bean) -> Self {
        Value::Bean(value)
    }
}

/// A dynamically typed target object populated from parsed fields
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bean {
    #[serde(rename = "@type")]
    pub type_name: String,
    #[serde(flatten)]
    pub properties: BTreeMap<String, Value>,
}

impl Bean {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Builder-style property assignment, handy for writer input
    pub fn with(mut self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(property.into(), value.into());
        self
    }

    pub fn get(&self, property: &str) -> Option<&Value> {
        self.properties.get(property)
    }

    pub fn get_mut(&mut self, property: &str) -> Option<&mut Value> {
        self.properties.get_mut(property)
    }

    pub fn set(&mut self, property: impl Into<String>, value: Value) {
        self.properties.insert(property.into(), value);
    }

    /// String view of a property, if it holds a string
    pub fn get_str(&self, property: &str) -> Option<&str> {
        self.get(property).and_then(Value::as_str)
    }

    /// Items of a collection property; empty when absent
    pub fn list(&self, property: &str) -> &[Value] {
        self.get(property).and_then(Value::as_list).unwrap_or(&[])
    }

    /// Inverse of the serialized form: `@type` names the type, other keys are properties
    pub fn from_json(json: &serde_json::Value) -> Self {
        let type_name = json
            .get("@type")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        let mut bean = Bean::new(type_name);
        if let Some(object) = json.as_object() {
            for (key, value) in object {
                if key != "@type" {
                    bean.set(key.clone(), Value::from_json(value));
                }
            }
        }
        bean
    }
}

/// Beans of one record parse, keyed by declared bean name
pub type BeanMap = BTreeMap<String, Bean>;

/// Result of a successful record parse
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchedRecord {
    #[serde(rename = "record")]
    name: String,
    beans: BeanMap,
}

impl MatchedRecord {
    pub fn new(name: impl Into<String>, beans: BeanMap) -> Self {
        Self {
            name: name.into(),
            beans,
        }
    }

    /// Name of the record definition that matched
    pub fn record_name(&self) -> &str {
        &self.name
    }

    pub fn bean(&self, name: &str) -> Option<&Bean> {
        self.beans.get(name)
    }

    pub fn beans(&self) -> &BeanMap {
        &self.beans
    }

    pub fn into_beans(self) -> BeanMap {
        self.beans
    }
}

/// Statistics gathered while dispatching a record stream
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ParseStats {
    pub lines_read: usize,
    pub records_matched: usize,
    pub records_failed: usize,
    pub records_by_name: BTreeMap<String, usize>,
    pub errors_by_kind: BTreeMap<String, usize>,
}

impl ParseStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_matched(&mut self, name: &str) {
        self.records_matched += 1;
        *self.records_by_name.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn record_failed(&mut self, kind: &str) {
        self.records_failed += 1;
        *self.errors_by_kind.entry(kind.to_string()).or_insert(0) += 1;
    }
}
