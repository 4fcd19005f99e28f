//! Property binding: how converted values reach bean properties.
//!
//! The engine talks to beans only through [`PropertySink`]. The default sink,
//! [`BeanRegistry`], maps declared type names to [`TypeDescriptor`]s and
//! resolves each `(type, property)` pair once to a [`PropertyBinding`]: a
//! direct field store, a registered setter, or a collection append.

use crate::error::{FlatrecError, Result};
use crate::models::{Bean, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Declared kind of a bean property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    String,
    Integer,
    Long,
    Float,
    Double,
    Decimal,
    Date,
    DateTime,
    Bool,
    Bean,
    List,
}

/// Capability the engine uses to create beans and write their properties
pub trait PropertySink: Send + Sync {
    /// Fresh default instance of a declared type
    fn new_instance(&self, type_ref: &str) -> Result<Bean>;

    fn set_property(&self, bean: &mut Bean, property: &str, value: Value) -> Result<()>;

    fn get_property<'b>(&self, bean: &'b Bean, property: &str) -> Result<Option<&'b Value>>;

    /// Append to a collection property, creating it when absent
    fn add_to_collection(&self, bean: &mut Bean, property: &str, value: Value) -> Result<()>;

    /// Hand a value to a named method registered on the bean's type
    fn add_via_method(&self, bean: &mut Bean, method: &str, value: Value) -> Result<()>;

    /// Declared kind of a property, when the type declares one
    fn property_kind(&self, type_ref: &str, property: &str) -> Option<PropertyKind>;

    /// Number of items held by a collection property
    fn collection_len(&self, bean: &Bean, property: &str) -> Result<usize> {
        match self.get_property(bean, property)? {
            None | Some(Value::Null) => Ok(0),
            Some(Value::List(items)) => Ok(items.len()),
            Some(other) => Err(FlatrecError::binding(
                &bean.type_name,
                property,
                format!("expected a collection, found {}", other.type_label()),
            )),
        }
    }
}

pub type SetterFn = Arc<dyn Fn(&mut Bean, Value) -> Result<()> + Send + Sync>;
pub type FactoryFn = Arc<dyn Fn() -> Bean + Send + Sync>;

/// Shape of a bean type: declared properties, setters, add-methods and factory.
///
/// A descriptor without declared properties is open: any property name is
/// accepted and stored as a field.
#[derive(Clone, Default)]
pub struct TypeDescriptor {
    name: String,
    properties: BTreeMap<String, PropertyKind>,
    setters: HashMap<String, SetterFn>,
    methods: HashMap<String, SetterFn>,
    factory: Option<FactoryFn>,
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("properties", &self.properties)
            .field("setters", &self.setters.keys().collect::<Vec<_>>())
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("factory", &self.factory.is_some())
            .finish()
    }
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn with_property(mut self, name: impl Into<String>, kind: PropertyKind) -> Self {
        self.properties.insert(name.into(), kind);
        self
    }

    /// Route writes of `property` through a setter instead of a field store
    pub fn with_setter<F>(mut self, property: impl Into<String>, setter: F) -> Self
    where
        F: Fn(&mut Bean, Value) -> Result<()> + Send + Sync + 'static,
    {
        self.setters.insert(property.into(), Arc::new(setter));
        self
    }

    /// Register a named add-method used by cardinalities with `add_method`
    pub fn with_method<F>(mut self, method: impl Into<String>, add: F) -> Self
    where
        F: Fn(&mut Bean, Value) -> Result<()> + Send + Sync + 'static,
    {
        self.methods.insert(method.into(), Arc::new(add));
        self
    }

    pub fn with_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Bean + Send + Sync + 'static,
    {
        self.factory = Some(Arc::new(factory));
        self
    }

    pub fn is_open(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn property_kind(&self, property: &str) -> Option<PropertyKind> {
        self.properties.get(property).copied()
    }

    pub fn has_method(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    fn instantiate(&self) -> Bean {
        let mut bean = match &self.factory {
            Some(factory) => factory(),
            None => Bean::new(&self.name),
        };
        for (property, kind) in &self.properties {
            if *kind == PropertyKind::List && bean.get(property).is_none() {
                bean.set(property.clone(), Value::List(Vec::new()));
            }
        }
        bean
    }
}

/// Resolved way of writing one property of one type
#[derive(Clone)]
pub enum PropertyBinding {
    Field,
    Setter(SetterFn),
    Collection,
}

impl fmt::Debug for PropertyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyBinding::Field => f.write_str("Field"),
            PropertyBinding::Setter(_) => f.write_str("Setter"),
            PropertyBinding::Collection => f.write_str("Collection"),
        }
    }
}

/// Default [`PropertySink`] backed by registered type descriptors
#[derive(Default)]
pub struct BeanRegistry {
    types: HashMap<String, TypeDescriptor>,
    bindings: RwLock<HashMap<(String, String), PropertyBinding>>,
}

impl fmt::Debug for BeanRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.types.keys().collect();
        names.sort();
        f.debug_struct("BeanRegistry").field("types", &names).finish()
    }
}

impl BeanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: TypeDescriptor) {
        debug!("Registering bean type '{}'", descriptor.name);
        if let Ok(mut bindings) = self.bindings.write() {
            bindings.retain(|(type_name, _), _| type_name != &descriptor.name);
        }
        self.types.insert(descriptor.name.clone(), descriptor);
    }

    /// Builder-style registration
    pub fn with_type(mut self, descriptor: TypeDescriptor) -> Self {
        self.register(descriptor);
        self
    }

    pub fn has_type(&self, type_ref: &str) -> bool {
        self.types.contains_key(type_ref)
    }

    pub fn descriptor(&self, type_ref: &str) -> Option<&TypeDescriptor> {
        self.types.get(type_ref)
    }

    fn lookup(&self, type_ref: &str, property: &str) -> Result<&TypeDescriptor> {
        self.types.get(type_ref).ok_or_else(|| {
            FlatrecError::binding(type_ref, property, "bean type is not registered")
        })
    }

    /// Resolve (and cache) how `property` is written on `type_ref`
    pub fn binding(&self, type_ref: &str, property: &str) -> Result<PropertyBinding> {
        let key = (type_ref.to_string(), property.to_string());
        if let Ok(bindings) = self.bindings.read() {
            if let Some(binding) = bindings.get(&key) {
                return Ok(binding.clone());
            }
        }

        let descriptor = self.lookup(type_ref, property)?;
        let binding = if let Some(setter) = descriptor.setters.get(property) {
            PropertyBinding::Setter(Arc::clone(setter))
        } else {
            match descriptor.property_kind(property) {
                Some(PropertyKind::List) => PropertyBinding::Collection,
                Some(_) => PropertyBinding::Field,
                None if descriptor.is_open() => PropertyBinding::Field,
                None => {
                    return Err(FlatrecError::binding(
                        type_ref,
                        property,
                        "property is not declared on the type",
                    ));
                }
            }
        };

        debug!("Bound {}.{} as {:?}", type_ref, property, binding);
        if let Ok(mut bindings) = self.bindings.write() {
            bindings.insert(key, binding.clone());
        }
        Ok(binding)
    }
}

impl PropertySink for BeanRegistry {
    fn new_instance(&self, type_ref: &str) -> Result<Bean> {
        self.types
            .get(type_ref)
            .map(TypeDescriptor::instantiate)
            .ok_or_else(|| {
                FlatrecError::configuration(format!("Bean type '{}' is not registered", type_ref))
            })
    }

    fn set_property(&self, bean: &mut Bean, property: &str, value: Value) -> Result<()> {
        match self.binding(&bean.type_name, property)? {
            PropertyBinding::Setter(setter) => setter(bean, value),
            PropertyBinding::Field | PropertyBinding::Collection => {
                bean.set(property, value);
                Ok(())
            }
        }
    }

    fn get_property<'b>(&self, bean: &'b Bean, property: &str) -> Result<Option<&'b Value>> {
        self.binding(&bean.type_name, property)?;
        Ok(bean.get(property))
    }

    fn add_to_collection(&self, bean: &mut Bean, property: &str, value: Value) -> Result<()> {
        match self.binding(&bean.type_name, property)? {
            PropertyBinding::Setter(_) => Err(FlatrecError::binding(
                &bean.type_name,
                property,
                "cannot append through a setter; use an add-method",
            )),
            PropertyBinding::Field
                if self.property_kind(&bean.type_name, property).is_some() =>
            {
                Err(FlatrecError::binding(
                    &bean.type_name,
                    property,
                    "property is not a collection",
                ))
            }
            PropertyBinding::Field | PropertyBinding::Collection => {
                let type_name = bean.type_name.clone();
                match bean.get_mut(property) {
                    Some(Value::List(items)) => items.push(value),
                    Some(Value::Null) | None => bean.set(property, Value::List(vec![value])),
                    Some(other) => {
                        return Err(FlatrecError::binding(
                            type_name,
                            property,
                            format!("expected a collection, found {}", other.type_label()),
                        ));
                    }
                }
                Ok(())
            }
        }
    }

    fn add_via_method(&self, bean: &mut Bean, method: &str, value: Value) -> Result<()> {
        let descriptor = self.lookup(&bean.type_name, method)?;
        let add = descriptor.methods.get(method).cloned().ok_or_else(|| {
            FlatrecError::binding(
                &bean.type_name,
                method,
                format!("no add method '{}' registered", method),
            )
        })?;
        add(bean, value)
    }

    fn property_kind(&self, type_ref: &str, property: &str) -> Option<PropertyKind> {
        self.types
            .get(type_ref)
            .and_then(|descriptor| descriptor.property_kind(property))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> BeanRegistry {
        BeanRegistry::new()
            .with_type(
                TypeDescriptor::new("Order")
                    .with_property("id", PropertyKind::String)
                    .with_property("lines", PropertyKind::List)
                    .with_setter("note", |bean, value| {
                        bean.set("note", Value::String(format!("[{}]", value)));
                        Ok(())
                    })
                    .with_method("addLine", |bean, value| {
                        if let Value::Bean(mut line) = value {
                            line.set("added", Value::Bool(true));
                            bean.set("lastLine", Value::Bean(line));
                        }
                        Ok(())
                    }),
            )
            .with_type(TypeDescriptor::new("Anything"))
    }

    #[test]
    fn test_new_instance_initialises_collections() {
        let beans = registry();
        let order = beans.new_instance("Order").unwrap();
        assert_eq!(order.type_name, "Order");
        assert_eq!(order.get("lines"), Some(&Value::List(vec![])));
        assert!(beans.new_instance("Missing").is_err());
    }

    #[test]
    fn test_bindings_resolve_and_cache() {
        let beans = registry();
        assert!(matches!(
            beans.binding("Order", "id").unwrap(),
            PropertyBinding::Field
        ));
        assert!(matches!(
            beans.binding("Order", "lines").unwrap(),
            PropertyBinding::Collection
        ));
        assert!(matches!(
            beans.binding("Order", "note").unwrap(),
            PropertyBinding::Setter(_)
        ));
        assert!(beans.binding("Order", "bogus").is_err());
        assert!(matches!(
            beans.binding("Anything", "whatever").unwrap(),
            PropertyBinding::Field
        ));
    }

    #[test]
    fn test_setter_and_collection_writes() {
        let beans = registry();
        let mut order = beans.new_instance("Order").unwrap();
        beans.set_property(&mut order, "note", Value::from("hi")).unwrap();
        assert_eq!(order.get_str("note"), Some("[hi]"));

        beans
            .add_to_collection(&mut order, "lines", Value::Integer(1))
            .unwrap();
        beans
            .add_to_collection(&mut order, "lines", Value::Integer(2))
            .unwrap();
        assert_eq!(beans.collection_len(&order, "lines").unwrap(), 2);

        assert!(beans
            .add_to_collection(&mut order, "id", Value::Integer(3))
            .is_err());
    }

    #[test]
    fn test_add_via_method() {
        let beans = registry();
        let mut order = beans.new_instance("Order").unwrap();
        beans
            .add_via_method(&mut order, "addLine", Value::Bean(Bean::new("Line")))
            .unwrap();
        let last = order.get("lastLine").and_then(Value::as_bean).unwrap();
        assert_eq!(last.get("added"), Some(&Value::Bool(true)));

        assert!(beans
            .add_via_method(&mut order, "removeLine", Value::Null)
            .is_err());
    }

    #[test]
    fn test_open_type_accepts_any_collection() {
        let beans = registry();
        let mut any = beans.new_instance("Anything").unwrap();
        beans
            .add_to_collection(&mut any, "items", Value::from("a"))
            .unwrap();
        assert_eq!(any.list("items").len(), 1);
    }
}
