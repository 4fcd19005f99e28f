//! Built-in converters: string, double, bigdecimal, float, long, integer,
//! date and boolean.
//!
//! Every converter treats empty text as the type's zero (or `Null` for
//! dates) and reports malformed text as a [`ConversionFailure`] naming it.

use super::date_format::{has_time_component, translate_pattern};
use super::options::ConversionOptions;
use super::{ConversionFailure, ConverterFunction, ConverterImplementation};
use crate::constants::DEFAULT_DATE_FORMAT;
use crate::constants::options::{DECIMAL_IMPLIED, DECIMAL_PLACES, FORMAT};
use crate::models::Value;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;

/// The built-in converter set, registered under [`crate::constants::CORE_CONVERTERS`]
#[derive(Debug, Default)]
pub struct CoreConverters;

impl ConverterImplementation for CoreConverters {
    fn method(&self, name: &str) -> Option<Arc<dyn ConverterFunction>> {
        let function: Arc<dyn ConverterFunction> = match name {
            "string" | "char" | "convertChar" => Arc::new(StringConverter),
            "double" | "decimal" | "convertDecimal" | "convertDouble" => {
                Arc::new(DoubleConverter)
            }
            "bigdecimal" | "convertBigDecimal" => Arc::new(BigDecimalConverter),
            "float" | "convertFloat" => Arc::new(FloatConverter),
            "long" | "convertLong" => Arc::new(LongConverter),
            "integer" | "int" | "convertInteger" => Arc::new(IntegerConverter),
            "date" | "convertDate" => Arc::new(DateConverter),
            "boolean" | "convertBoolean" => Arc::new(BooleanConverter),
            _ => return None,
        };
        Some(function)
    }
}

#[derive(Debug)]
pub struct StringConverter;

impl ConverterFunction for StringConverter {
    fn to_value(&self, text: &str, _options: &ConversionOptions) -> Result<Value, ConversionFailure> {
        Ok(Value::String(text.to_string()))
    }

    fn to_text(&self, value: &Value, _options: &ConversionOptions) -> Result<String, ConversionFailure> {
        Ok(value.to_string())
    }
}

fn decimal_places(options: &ConversionOptions) -> Result<u32, ConversionFailure> {
    match options.get(DECIMAL_PLACES) {
        None => Ok(0),
        Some(raw) => raw.trim().parse::<u32>().map_err(|_| {
            ConversionFailure::new(format!("decimal-places '{}' is not a number", raw))
        }),
    }
}

const MAX_DECIMAL_SCALE: u32 = 28;

fn parse_decimal(text: &str) -> Result<Decimal, ConversionFailure> {
    Decimal::from_str_exact(text.trim())
        .map_err(|e| ConversionFailure::new(format!("'{}' is not a valid decimal: {}", text, e)))
}

fn numeric_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Integer(i) => Some(*i as f64),
        Value::Long(l) => Some(*l as f64),
        Value::Float(f) => Some(*f as f64),
        Value::Double(d) => Some(*d),
        Value::Decimal(d) => d.to_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn format_float(value: f64, options: &ConversionOptions) -> Result<String, ConversionFailure> {
    let places = decimal_places(options)?;
    if options.flag(DECIMAL_IMPLIED) {
        let scaled = (value * 10f64.powi(places as i32)).round();
        return Ok(format!("{}", scaled as i64));
    }
    if options.contains(DECIMAL_PLACES) {
        Ok(format!("{:.*}", places as usize, value))
    } else {
        Ok(format!("{}", value))
    }
}

#[derive(Debug)]
pub struct DoubleConverter;

impl ConverterFunction for DoubleConverter {
    fn to_value(&self, text: &str, options: &ConversionOptions) -> Result<Value, ConversionFailure> {
        if text.is_empty() {
            return Ok(Value::Double(0.0));
        }
        let parsed: f64 = text
            .trim()
            .parse()
            .map_err(|_| ConversionFailure::new(format!("'{}' is not a valid double", text)))?;
        if options.flag(DECIMAL_IMPLIED) {
            let places = decimal_places(options)?;
            Ok(Value::Double(parsed / 10f64.powi(places as i32)))
        } else {
            Ok(Value::Double(parsed))
        }
    }

    fn to_text(&self, value: &Value, options: &ConversionOptions) -> Result<String, ConversionFailure> {
        if value.is_null() {
            return Ok(String::new());
        }
        let number = numeric_as_f64(value).ok_or_else(|| {
            ConversionFailure::new(format!("cannot write {} as double", value.type_label()))
        })?;
        format_float(number, options)
    }
}

#[derive(Debug)]
pub struct FloatConverter;

impl ConverterFunction for FloatConverter {
    fn to_value(&self, text: &str, options: &ConversionOptions) -> Result<Value, ConversionFailure> {
        match DoubleConverter.to_value(text, options) {
            Ok(Value::Double(d)) => Ok(Value::Float(d as f32)),
            Ok(other) => Ok(other),
            Err(_) => Err(ConversionFailure::new(format!(
                "'{}' is not a valid float",
                text
            ))),
        }
    }

    fn to_text(&self, value: &Value, options: &ConversionOptions) -> Result<String, ConversionFailure> {
        DoubleConverter.to_text(value, options)
    }
}

#[derive(Debug)]
pub struct BigDecimalConverter;

impl ConverterFunction for BigDecimalConverter {
    fn to_value(&self, text: &str, options: &ConversionOptions) -> Result<Value, ConversionFailure> {
        if text.is_empty() {
            return Ok(Value::Decimal(Decimal::ZERO));
        }
        let mut parsed = parse_decimal(text)?;
        if options.flag(DECIMAL_IMPLIED) {
            let places = decimal_places(options)?;
            // keep the digits, move the point
            let scale = parsed.scale() + places;
            parsed.set_scale(scale).map_err(|_| {
                ConversionFailure::new(format!("'{}' cannot be scaled by {} places", text, places))
            })?;
        }
        Ok(Value::Decimal(parsed))
    }

    fn to_text(&self, value: &Value, options: &ConversionOptions) -> Result<String, ConversionFailure> {
        let decimal = match value {
            Value::Null => return Ok(String::new()),
            Value::Decimal(d) => *d,
            other => {
                let text = match other {
                    Value::Double(d) => format!("{}", d),
                    Value::Float(f) => format!("{}", f),
                    _ => other.to_string(),
                };
                parse_decimal(&text)?
            }
        };
        let places = decimal_places(options)?;
        // rescale rounds half away from zero and silently caps at 28 places
        let rescale = |mut d: Decimal| {
            if places > MAX_DECIMAL_SCALE {
                return Err(ConversionFailure::new(format!(
                    "'{}' cannot be rescaled to {} places",
                    d, places
                )));
            }
            d.rescale(places);
            Ok(d)
        };
        if options.flag(DECIMAL_IMPLIED) {
            Ok(rescale(decimal)?.mantissa().to_string())
        } else if options.contains(DECIMAL_PLACES) {
            Ok(rescale(decimal)?.to_string())
        } else {
            Ok(decimal.to_string())
        }
    }
}

#[derive(Debug)]
pub struct LongConverter;

impl ConverterFunction for LongConverter {
    fn to_value(&self, text: &str, _options: &ConversionOptions) -> Result<Value, ConversionFailure> {
        if text.is_empty() {
            return Ok(Value::Long(0));
        }
        text.parse::<i64>()
            .map(Value::Long)
            .map_err(|_| ConversionFailure::new(format!("'{}' is not a valid long", text)))
    }

    fn to_text(&self, value: &Value, _options: &ConversionOptions) -> Result<String, ConversionFailure> {
        integral_text(value, "long")
    }
}

#[derive(Debug)]
pub struct IntegerConverter;

impl ConverterFunction for IntegerConverter {
    fn to_value(&self, text: &str, _options: &ConversionOptions) -> Result<Value, ConversionFailure> {
        if text.is_empty() {
            return Ok(Value::Integer(0));
        }
        text.parse::<i32>()
            .map(Value::Integer)
            .map_err(|_| ConversionFailure::new(format!("'{}' is not a valid integer", text)))
    }

    fn to_text(&self, value: &Value, _options: &ConversionOptions) -> Result<String, ConversionFailure> {
        integral_text(value, "integer")
    }
}

fn integral_text(value: &Value, label: &str) -> Result<String, ConversionFailure> {
    match value {
        Value::Null => Ok(String::new()),
        Value::Integer(i) => Ok(i.to_string()),
        Value::Long(l) => Ok(l.to_string()),
        Value::String(s) => Ok(s.clone()),
        other => Err(ConversionFailure::new(format!(
            "cannot write {} as {}",
            other.type_label(),
            label
        ))),
    }
}

fn chrono_format(options: &ConversionOptions) -> Result<String, ConversionFailure> {
    let pattern = options.get(FORMAT).unwrap_or(DEFAULT_DATE_FORMAT);
    translate_pattern(pattern).map_err(ConversionFailure::new)
}

#[derive(Debug)]
pub struct DateConverter;

impl ConverterFunction for DateConverter {
    fn to_value(&self, text: &str, options: &ConversionOptions) -> Result<Value, ConversionFailure> {
        if text.is_empty() {
            return Ok(Value::Null);
        }
        let format = chrono_format(options)?;
        if has_time_component(&format) {
            NaiveDateTime::parse_from_str(text, &format)
                .map(Value::DateTime)
                .map_err(|e| ConversionFailure::new(format!("'{}' is not a valid date: {}", text, e)))
        } else {
            NaiveDate::parse_from_str(text, &format)
                .map(Value::Date)
                .map_err(|e| ConversionFailure::new(format!("'{}' is not a valid date: {}", text, e)))
        }
    }

    fn to_text(&self, value: &Value, options: &ConversionOptions) -> Result<String, ConversionFailure> {
        let format = chrono_format(options)?;
        match value {
            Value::Null => Ok(String::new()),
            Value::Date(date) => match date.and_hms_opt(0, 0, 0) {
                Some(midnight) => Ok(midnight.format(&format).to_string()),
                None => Ok(date.format(&format).to_string()),
            },
            Value::DateTime(dt) => Ok(dt.format(&format).to_string()),
            // ISO text, as produced by the JSON form of dates
            Value::String(s) => {
                if let Ok(dt) = s.parse::<NaiveDateTime>() {
                    Ok(dt.format(&format).to_string())
                } else if let Some(midnight) = s.parse::<NaiveDate>().ok().and_then(|d| d.and_hms_opt(0, 0, 0)) {
                    Ok(midnight.format(&format).to_string())
                } else {
                    Ok(s.clone())
                }
            }
            other => Err(ConversionFailure::new(format!(
                "cannot write {} as date",
                other.type_label()
            ))),
        }
    }
}

#[derive(Debug)]
pub struct BooleanConverter;

impl ConverterFunction for BooleanConverter {
    fn to_value(&self, text: &str, _options: &ConversionOptions) -> Result<Value, ConversionFailure> {
        match text.trim().to_ascii_lowercase().as_str() {
            "" | "false" | "n" | "no" | "0" => Ok(Value::Bool(false)),
            "true" | "y" | "yes" | "1" => Ok(Value::Bool(true)),
            _ => Err(ConversionFailure::new(format!(
                "'{}' is not a valid boolean",
                text
            ))),
        }
    }

    fn to_text(&self, value: &Value, _options: &ConversionOptions) -> Result<String, ConversionFailure> {
        match value {
            Value::Null => Ok(String::new()),
            Value::Bool(b) => Ok(b.to_string()),
            Value::String(s) => Ok(s.clone()),
            other => Err(ConversionFailure::new(format!(
                "cannot write {} as boolean",
                other.type_label()
            ))),
        }
    }
}
