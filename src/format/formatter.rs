//! Formatter trait and registry
//!
//! A formatter is one pipeline stage of a template variable:
//! `${date|format(f=yyyy)|align(w=6)}` runs `format` and then `align`.

use super::align::Align;
use super::cache::PatternCache;
use super::format_value::FormatValue;
use crate::core::error::Result;
use crate::core::scope::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Ordered arguments of one pipeline stage
///
/// `key=value` arguments keep their key; positional arguments are keyed by
/// their position in the argument list (`"0"`, `"1"`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgMap {
    entries: Vec<(String, String)>,
}

impl ArgMap {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Set an argument, replacing an earlier value under the same key
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Argument values in declaration order
    pub fn values(&self) -> Vec<String> {
        self.entries.iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One stage of a template pipeline
pub trait Formatter: Send + Sync {
    /// Normalize the stage arguments.
    ///
    /// Runs once when the template is compiled; the result is what
    /// [`Formatter::apply`] receives on every render.
    fn prepare(&self, args: ArgMap) -> Result<ArgMap> {
        Ok(args)
    }

    /// Transform the working value. `None` makes the variable render empty.
    fn apply(&self, value: Value, args: &ArgMap) -> Option<Value>;
}

impl<F> Formatter for F
where
    F: Fn(Value, &ArgMap) -> Option<Value> + Send + Sync,
{
    fn apply(&self, value: Value, args: &ArgMap) -> Option<Value> {
        self(value, args)
    }
}

/// Formatters available to templates, by name
#[derive(Clone, Default)]
pub struct Formatters {
    entries: HashMap<String, Arc<dyn Formatter>>,
}

impl Formatters {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Registry holding `format` and `align`
    pub fn with_builtins(patterns: Arc<PatternCache>) -> Self {
        let mut formatters = Self::new();
        formatters.register("format", FormatValue::new(patterns));
        formatters.register("align", Align);
        formatters
    }

    /// Add or replace a formatter
    pub fn register<F>(&mut self, name: impl Into<String>, formatter: F)
    where
        F: Formatter + 'static,
    {
        self.entries.insert(name.into(), Arc::new(formatter));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Formatter>> {
        self.entries.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Formatters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.entries.keys().collect();
        names.sort();
        f.debug_struct("Formatters").field("names", &names).finish()
    }
}
