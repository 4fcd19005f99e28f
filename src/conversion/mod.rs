//! Conversion registry: named text/value converters with memoized resolution.
//!
//! A converter definition names an implementation and a method on it. The
//! registry resolves that pair to a callable the first time it is used and
//! caches the callable by `(implementation, method)`, so aliases that point at
//! the same method share one cache slot.

pub mod builtin;
pub mod date_format;
pub mod options;
pub mod transform;

pub use self::builtin::CoreConverters;
pub use rust_decimal::Decimal;
pub use self::options::ConversionOptions;
pub use self::transform::transform_string;

use crate::binding::PropertyKind;
use crate::constants::{CORE_CONVERTERS, converters};
use crate::error::{FlatrecError, Result};
use crate::models::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::debug;

/// Failure reported by a converter; the registry attributes it to a field
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ConversionFailure(String);

impl ConversionFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }

    pub fn reason(&self) -> &str {
        &self.0
    }
}

/// One text/value conversion in both directions
pub trait ConverterFunction: Send + Sync {
    /// Raw (already transformed) field text to a value
    fn to_value(
        &self,
        text: &str,
        options: &ConversionOptions,
    ) -> std::result::Result<Value, ConversionFailure>;

    /// Value back to field text, before padding
    fn to_text(
        &self,
        value: &Value,
        options: &ConversionOptions,
    ) -> std::result::Result<String, ConversionFailure>;
}

/// A named set of converter methods
pub trait ConverterImplementation: Send + Sync {
    fn method(&self, name: &str) -> Option<Arc<dyn ConverterFunction>>;
}

type ParseFn = dyn Fn(&str, &ConversionOptions) -> std::result::Result<Value, ConversionFailure>
    + Send
    + Sync;
type FormatFn = dyn Fn(&Value, &ConversionOptions) -> std::result::Result<String, ConversionFailure>
    + Send
    + Sync;

/// Converter assembled from a pair of closures
struct ClosureConverter {
    parse: Box<ParseFn>,
    format: Box<FormatFn>,
}

impl ConverterFunction for ClosureConverter {
    fn to_value(
        &self,
        text: &str,
        options: &ConversionOptions,
    ) -> std::result::Result<Value, ConversionFailure> {
        (self.parse)(text, options)
    }

    fn to_text(
        &self,
        value: &Value,
        options: &ConversionOptions,
    ) -> std::result::Result<String, ConversionFailure> {
        (self.format)(value, options)
    }
}

/// Single-method implementation wrapping a closure converter
struct SingleMethod(Arc<dyn ConverterFunction>);

impl ConverterImplementation for SingleMethod {
    fn method(&self, _name: &str) -> Option<Arc<dyn ConverterFunction>> {
        Some(Arc::clone(&self.0))
    }
}

/// Declared converter: name, implementation identifier, method and return type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConverterDef {
    pub name: String,
    pub implementation: String,
    pub method: String,
    pub return_type: Option<String>,
}

impl ConverterDef {
    pub fn new(
        name: impl Into<String>,
        implementation: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            implementation: implementation.into(),
            method: method.into(),
            return_type: None,
        }
    }

    pub fn with_return_type(mut self, return_type: impl Into<String>) -> Self {
        self.return_type = Some(return_type.into());
        self
    }
}

type MethodKey = (String, String);

/// Name to converter mapping with a per-registry resolution cache
pub struct ConversionRegistry {
    converters: HashMap<String, ConverterDef>,
    implementations: HashMap<String, Arc<dyn ConverterImplementation>>,
    resolved: RwLock<HashMap<MethodKey, Arc<dyn ConverterFunction>>>,
}

impl fmt::Debug for ConversionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.converters.keys().collect();
        names.sort();
        f.debug_struct("ConversionRegistry")
            .field("converters", &names)
            .finish()
    }
}

impl Default for ConversionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversionRegistry {
    /// Registry holding the built-in converters
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register_implementation(CORE_CONVERTERS, CoreConverters);
        for (name, method) in converters::BUILT_INS {
            registry.register_converter(ConverterDef::new(*name, CORE_CONVERTERS, *method));
        }
        registry
    }

    /// Registry without any converters
    pub fn empty() -> Self {
        Self {
            converters: HashMap::new(),
            implementations: HashMap::new(),
            resolved: RwLock::new(HashMap::new()),
        }
    }

    /// Declare (or redeclare) a converter by name
    pub fn register_converter(&mut self, def: ConverterDef) {
        debug!(
            "Registering converter '{}' -> {}::{}",
            def.name, def.implementation, def.method
        );
        self.converters.insert(def.name.clone(), def);
    }

    /// Register an implementation identifier that converter definitions can name
    pub fn register_implementation(
        &mut self,
        id: impl Into<String>,
        implementation: impl ConverterImplementation + 'static,
    ) {
        let id = id.into();
        self.clear_cache_for(&id);
        self.implementations.insert(id, Arc::new(implementation));
    }

    /// Register a converter backed by a pair of closures
    pub fn register_fn<P, F>(&mut self, name: impl Into<String>, parse: P, format: F)
    where
        P: Fn(&str, &ConversionOptions) -> std::result::Result<Value, ConversionFailure>
            + Send
            + Sync
            + 'static,
        F: Fn(&Value, &ConversionOptions) -> std::result::Result<String, ConversionFailure>
            + Send
            + Sync
            + 'static,
    {
        let name = name.into();
        let function: Arc<dyn ConverterFunction> = Arc::new(ClosureConverter {
            parse: Box::new(parse),
            format: Box::new(format),
        });
        let implementation = format!("fn:{}", name);
        self.register_implementation(implementation.clone(), SingleMethod(function));
        self.register_converter(ConverterDef::new(name, implementation, "convert"));
    }

    pub fn has_converter(&self, name: &str) -> bool {
        self.converters.contains_key(name)
    }

    pub fn converter(&self, name: &str) -> Option<&ConverterDef> {
        self.converters.get(name)
    }

    /// Check that a converter name resolves to a callable method
    pub fn verify(&self, name: &str) -> Result<()> {
        self.resolve(name, name).map(|_| ())
    }

    /// Convert field text to a value with the named converter.
    ///
    /// The string-transform pipeline runs first; failures are attributed to
    /// `bean_ref`.
    pub fn convert(
        &self,
        name: &str,
        text: &str,
        options: &ConversionOptions,
        bean_ref: &str,
    ) -> Result<Value> {
        let function = self.resolve(name, bean_ref)?;
        let transformed = transform_string(text, options, 0);
        function
            .to_value(&transformed, options)
            .map_err(|failure| FlatrecError::conversion(bean_ref, text, failure.reason()))
    }

    /// Convert field text using the converter implied by the target property kind
    pub fn convert_inferred(
        &self,
        kind: Option<PropertyKind>,
        text: &str,
        options: &ConversionOptions,
        bean_ref: &str,
    ) -> Result<Value> {
        let name = inferred_converter(kind, bean_ref, text)?;
        self.convert(name, text, options, bean_ref)
    }

    /// Convert a value back to text with the named converter; `Null` is empty text
    pub fn to_text(
        &self,
        name: &str,
        value: &Value,
        options: &ConversionOptions,
        bean_ref: &str,
    ) -> Result<String> {
        if value.is_null() {
            return Ok(String::new());
        }
        let function = self.resolve(name, bean_ref)?;
        function
            .to_text(value, options)
            .map_err(|failure| {
                FlatrecError::conversion(bean_ref, value.to_string(), failure.reason())
            })
    }

    /// Inverse of [`Self::convert_inferred`]
    pub fn to_text_inferred(
        &self,
        kind: Option<PropertyKind>,
        value: &Value,
        options: &ConversionOptions,
        bean_ref: &str,
    ) -> Result<String> {
        let kind = kind.or_else(|| kind_of_value(value));
        let name = inferred_converter(kind, bean_ref, &value.to_string())?;
        self.to_text(name, value, options, bean_ref)
    }

    fn resolve(&self, name: &str, bean_ref: &str) -> Result<Arc<dyn ConverterFunction>> {
        let def = self.converters.get(name).ok_or_else(|| {
            FlatrecError::conversion(
                bean_ref,
                "",
                format!("converter '{}' not registered", name),
            )
        })?;
        let key = (def.implementation.clone(), def.method.clone());

        if let Ok(cache) = self.resolved.read() {
            if let Some(function) = cache.get(&key) {
                return Ok(Arc::clone(function));
            }
        }

        let implementation = self.implementations.get(&def.implementation).ok_or_else(|| {
            FlatrecError::configuration(format!(
                "Converter '{}' names unknown implementation '{}'",
                def.name, def.implementation
            ))
        })?;
        let function = implementation.method(&def.method).ok_or_else(|| {
            FlatrecError::configuration(format!(
                "Converter '{}' names unknown method '{}' on '{}'",
                def.name, def.method, def.implementation
            ))
        })?;

        debug!("Resolved converter '{}' to {}::{}", name, key.0, key.1);
        if let Ok(mut cache) = self.resolved.write() {
            cache.insert(key, Arc::clone(&function));
        }
        Ok(function)
    }

    fn clear_cache_for(&self, implementation: &str) {
        if let Ok(mut cache) = self.resolved.write() {
            cache.retain(|(id, _), _| id != implementation);
        }
    }

    #[cfg(test)]
    fn cached_methods(&self) -> usize {
        self.resolved.read().map(|c| c.len()).unwrap_or(0)
    }
}

fn inferred_converter(
    kind: Option<PropertyKind>,
    bean_ref: &str,
    text: &str,
) -> Result<&'static str> {
    match kind {
        None | Some(PropertyKind::String) => Ok(converters::STRING),
        Some(PropertyKind::Integer) => Ok(converters::INTEGER),
        Some(PropertyKind::Long) => Ok(converters::LONG),
        Some(PropertyKind::Float) => Ok(converters::FLOAT),
        Some(PropertyKind::Double) => Ok(converters::DOUBLE),
        Some(PropertyKind::Decimal) => Ok(converters::BIG_DECIMAL),
        Some(PropertyKind::Date) | Some(PropertyKind::DateTime) => Ok(converters::DATE),
        Some(PropertyKind::Bool) => Ok(converters::BOOLEAN),
        Some(other) => Err(FlatrecError::conversion(
            bean_ref,
            text,
            format!("no converter can produce a {:?} property", other),
        )),
    }
}

fn kind_of_value(value: &Value) -> Option<PropertyKind> {
    match value {
        Value::Integer(_) => Some(PropertyKind::Integer),
        Value::Long(_) => Some(PropertyKind::Long),
        Value::Float(_) => Some(PropertyKind::Float),
        Value::Double(_) => Some(PropertyKind::Double),
        Value::Decimal(_) => Some(PropertyKind::Decimal),
        Value::Date(_) | Value::DateTime(_) => Some(PropertyKind::Date),
        Value::Bool(_) => Some(PropertyKind::Bool),
        _ => None,
    }
}
