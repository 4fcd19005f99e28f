//! Injected script functions used by scripted identities and scriptlets.
//!
//! No interpreter is embedded. The embedding application registers native
//! functions under an `(engine, function name)` key and schema loading binds
//! each script reference to its compiled handle.

use crate::constants::{DEFAULT_SCRIPT_ENGINE, DEFAULT_SCRIPT_FUNCTION};
use crate::error::{FlatrecError, Result};
use crate::models::{BeanMap, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Arguments handed to a script function
#[derive(Debug)]
pub struct ScriptCall<'a> {
    /// Record name the call is made for
    pub record: &'a str,
    /// Index of the schema line within the record, for line-level calls
    pub line_index: Option<usize>,
    /// The physical input line, when one is in hand
    pub line: Option<&'a str>,
    /// Beans of the record being parsed, for scriptlets
    pub beans: Option<&'a mut BeanMap>,
}

impl<'a> ScriptCall<'a> {
    pub fn for_record(record: &'a str, line: Option<&'a str>) -> Self {
        Self {
            record,
            line_index: None,
            line,
            beans: None,
        }
    }

    pub fn for_line(record: &'a str, line_index: usize, line: Option<&'a str>) -> Self {
        Self {
            record,
            line_index: Some(line_index),
            line,
            beans: None,
        }
    }

    pub fn with_beans(mut self, beans: &'a mut BeanMap) -> Self {
        self.beans = Some(beans);
        self
    }

    fn target(&self) -> String {
        match self.line_index {
            Some(index) => format!("record '{}' line {}", self.record, index),
            None => format!("record '{}'", self.record),
        }
    }
}

/// A compiled script function
pub trait ScriptFunction: Send + Sync {
    fn call(&self, call: &mut ScriptCall<'_>) -> std::result::Result<Value, String>;
}

impl<F> ScriptFunction for F
where
    F: Fn(&mut ScriptCall<'_>) -> std::result::Result<Value, String> + Send + Sync,
{
    fn call(&self, call: &mut ScriptCall<'_>) -> std::result::Result<Value, String> {
        self(call)
    }
}

/// Functions available to schema scripts, keyed by engine and function name
#[derive(Default, Clone)]
pub struct ScriptRegistry {
    functions: HashMap<(String, String), Arc<dyn ScriptFunction>>,
}

impl fmt::Debug for ScriptRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self
            .functions
            .keys()
            .map(|(engine, name)| format!("{}:{}", engine, name))
            .collect();
        keys.sort();
        f.debug_struct("ScriptRegistry")
            .field("functions", &keys)
            .finish()
    }
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, engine: impl Into<String>, name: impl Into<String>, function: F)
    where
        F: Fn(&mut ScriptCall<'_>) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        self.functions
            .insert((engine.into(), name.into()), Arc::new(function));
    }

    /// Builder-style registration under the default engine
    pub fn with_function<F>(mut self, name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&mut ScriptCall<'_>) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        self.register(DEFAULT_SCRIPT_ENGINE, name, function);
        self
    }

    pub fn resolve(&self, engine: &str, name: &str) -> Option<Arc<dyn ScriptFunction>> {
        self.functions
            .get(&(engine.to_string(), name.to_string()))
            .cloned()
    }
}

/// Either nothing bound yet, or a compiled function
#[derive(Clone, Default)]
pub enum ScriptHandle {
    #[default]
    Unresolved,
    Compiled(Arc<dyn ScriptFunction>),
}

impl fmt::Debug for ScriptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptHandle::Unresolved => f.write_str("Unresolved"),
            ScriptHandle::Compiled(_) => f.write_str("Compiled"),
        }
    }
}

/// A reference from the schema to a script function
#[derive(Debug, Clone)]
pub struct ScriptRef {
    pub engine: String,
    /// Script source or description, kept for diagnostics
    pub script: String,
    pub function_name: String,
    handle: ScriptHandle,
}

impl ScriptRef {
    pub fn new(function_name: impl Into<String>) -> Self {
        Self {
            engine: DEFAULT_SCRIPT_ENGINE.to_string(),
            script: String::new(),
            function_name: function_name.into(),
            handle: ScriptHandle::Unresolved,
        }
    }

    /// Reference to the default identity function name
    pub fn identity() -> Self {
        Self::new(DEFAULT_SCRIPT_FUNCTION)
    }

    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = engine.into();
        self
    }

    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        self.script = script.into();
        self
    }

    /// Bind directly to a function, bypassing a registry
    pub fn compiled<F>(mut self, function: F) -> Self
    where
        F: Fn(&mut ScriptCall<'_>) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        self.handle = ScriptHandle::Compiled(Arc::new(function));
        self
    }

    pub fn is_bound(&self) -> bool {
        matches!(self.handle, ScriptHandle::Compiled(_))
    }

    /// Bind to the registry's function; already-bound references are kept
    pub fn bind(&mut self, registry: &ScriptRegistry) -> Result<()> {
        if self.is_bound() {
            return Ok(());
        }
        let function = registry
            .resolve(&self.engine, &self.function_name)
            .ok_or_else(|| {
                FlatrecError::configuration(format!(
                    "Script function '{}' is not registered for engine '{}'",
                    self.function_name, self.engine
                ))
            })?;
        self.handle = ScriptHandle::Compiled(function);
        Ok(())
    }

    /// Invoke the function; errors name the record or line it ran for
    pub fn invoke(&self, call: &mut ScriptCall<'_>) -> Result<Value> {
        match &self.handle {
            ScriptHandle::Compiled(function) => function
                .call(call)
                .map_err(|message| FlatrecError::script(call.target(), message)),
            ScriptHandle::Unresolved => Err(FlatrecError::script(
                call.target(),
                format!("function '{}' is not bound", self.function_name),
            )),
        }
    }

    /// Invoke as a predicate: `true`/`false`, `null` counts as no match
    pub fn test(&self, call: &mut ScriptCall<'_>) -> Result<bool> {
        match self.invoke(call)? {
            Value::Bool(matched) => Ok(matched),
            Value::Null => Ok(false),
            other => Err(FlatrecError::script(
                call.target(),
                format!(
                    "function '{}' returned {} instead of a boolean",
                    self.function_name,
                    other.type_label()
                ),
            )),
        }
    }
}
