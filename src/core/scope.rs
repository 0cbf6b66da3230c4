//! Values, variable frames and the scope chain templates resolve against
//!
//! This module provides:
//! - `Value`: data or a callable stored under a variable name
//! - `Frame`: one name → value mapping
//! - `ScopeChain`: ordered frames, most specific last

use chrono::{DateTime, FixedOffset};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A variable that computes its value when a template reads it.
///
/// Receives the positional call arguments written in the template,
/// e.g. `${proc.env(HOME)}` calls it with `["HOME"]`.
pub type Callable = Arc<dyn Fn(&[String]) -> Option<Value> + Send + Sync>;

/// Value stored in a frame
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Date(DateTime<FixedOffset>),
    Func(Callable),
}

impl Value {
    /// Wrap a closure as a callable value
    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&[String]) -> Option<Value> + Send + Sync + 'static,
    {
        Value::Func(Arc::new(f))
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Func(_))
    }

    /// Invoke a callable with positional arguments; data values return themselves
    pub fn call(&self, args: &[String]) -> Option<Value> {
        match self {
            Value::Func(f) => f(args),
            other => Some(other.clone()),
        }
    }

    /// Numeric coercion; `None` when the value has no numeric reading.
    ///
    /// Floats are returned as they are, NaN and infinities included.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Null => Some(0.0),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Str(s) => {
                let s = s.trim();
                if s.is_empty() {
                    Some(0.0)
                } else {
                    s.parse::<f64>().ok().filter(|f| !f.is_nan())
                }
            }
            Value::Date(d) => Some(d.timestamp_millis() as f64),
            Value::Func(_) => None,
        }
    }

    /// Convert a JSON configuration value
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(0.0)),
            },
            serde_json::Value::String(s) => Value::Str(s.clone()),
            other => Value::Str(other.to_string()),
        }
    }

    /// Convert to serde_json::Value for JSON output
    pub fn to_json_value(&self) -> serde_json::Value {
        match self {
            Value::Null | Value::Func(_) => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::Number((*i).into()),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Date(d) => serde_json::Value::String(d.to_rfc3339()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(fl) => write!(f, "{}", fl),
            Value::Str(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", d.to_rfc3339()),
            Value::Func(_) => write!(f, "[function]"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Int(i) => write!(f, "Int({})", i),
            Value::Float(fl) => write!(f, "Float({})", fl),
            Value::Str(s) => write!(f, "Str({:?})", s),
            Value::Date(d) => write!(f, "Date({})", d.to_rfc3339()),
            Value::Func(_) => write!(f, "Func"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Func(a), Value::Func(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(d: DateTime<FixedOffset>) -> Self {
        Value::Date(d)
    }
}

/// One mapping of variable names to values
#[derive(Debug, Clone, Default)]
pub struct Frame {
    vars: HashMap<String, Value>,
}

impl Frame {
    pub fn new() -> Self {
        Self {
            vars: HashMap::new(),
        }
    }

    /// Add a variable (builder style)
    pub fn with<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Add a variable (mutable version)
    pub fn insert<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.vars.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Copy every variable of `other` into this frame, overriding
    pub fn extend_from(&mut self, other: &Frame) {
        for (key, value) in &other.vars {
            self.vars.insert(key.clone(), value.clone());
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Frame {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut frame = Frame::new();
        for (key, value) in iter {
            frame.insert(key, value);
        }
        frame
    }
}

/// Ordered list of frames, least specific first
///
/// Built fresh for every log call and never mutated after dispatch starts,
/// so it can be shared between all routes of one fan-out.
#[derive(Debug, Clone, Default)]
pub struct ScopeChain {
    frames: Vec<Arc<Frame>>,
}

impl ScopeChain {
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    /// Append a frame that takes precedence over every frame already present
    pub fn push(&mut self, frame: Arc<Frame>) {
        self.frames.push(frame);
    }

    #[must_use]
    pub fn with_frame(mut self, frame: Frame) -> Self {
        self.frames.push(Arc::new(frame));
        self
    }

    /// Look a name up from the most specific frame to the least specific one.
    ///
    /// A frame that defines the name wins even when the value is `Null`
    /// or `false`; frames that do not define it are skipped.
    pub fn resolve(&self, name: &str) -> Option<&Value> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    pub fn frames(&self) -> &[Arc<Frame>] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_builder() {
        let frame = Frame::new()
            .with("user_id", 123)
            .with("username", "john_doe")
            .with("active", true);

        assert_eq!(frame.len(), 3);
        assert_eq!(frame.get("username"), Some(&Value::from("john_doe")));
        assert!(!frame.contains("missing"));
    }

    #[test]
    fn test_resolve_most_specific_wins() {
        let chain = ScopeChain::new()
            .with_frame(Frame::new().with("host", "global").with("app", "api"))
            .with_frame(Frame::new().with("host", "local"));

        assert_eq!(chain.resolve("host"), Some(&Value::from("local")));
        assert_eq!(chain.resolve("app"), Some(&Value::from("api")));
        assert_eq!(chain.resolve("nope"), None);
    }

    #[test]
    fn test_resolve_keeps_falsy_values() {
        let chain = ScopeChain::new()
            .with_frame(Frame::new().with("flag", true).with("empty", "set"))
            .with_frame(Frame::new().with("flag", false).with("empty", Value::Null));

        assert_eq!(chain.resolve("flag"), Some(&Value::Bool(false)));
        assert_eq!(chain.resolve("empty"), Some(&Value::Null));
    }

    #[test]
    fn test_callable_value() {
        let upper = Value::func(|args| args.first().map(|a| Value::from(a.to_uppercase())));
        assert!(upper.is_callable());
        assert_eq!(upper.call(&["abc".to_string()]), Some(Value::from("ABC")));
        assert_eq!(upper.call(&[]), None);
        assert_eq!(Value::Int(3).call(&[]), Some(Value::Int(3)));
    }

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(Value::from("12.5").as_number(), Some(12.5));
        assert_eq!(Value::from(" 7 ").as_number(), Some(7.0));
        assert_eq!(Value::from("").as_number(), Some(0.0));
        assert_eq!(Value::from("abc").as_number(), None);
        assert_eq!(Value::Bool(true).as_number(), Some(1.0));
        assert!(Value::Float(f64::NAN).as_number().is_some_and(f64::is_nan));
        assert_eq!(Value::Float(f64::INFINITY).as_number(), Some(f64::INFINITY));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Float(2.0).to_string(), "2");
        assert_eq!(Value::Float(1.5).to_string(), "1.5");
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::Int(-4).to_string(), "-4");
    }

    #[test]
    fn test_json_conversion() {
        let json: serde_json::Value = serde_json::json!({"a": 1});
        assert_eq!(Value::from_json(&serde_json::json!(5)), Value::Int(5));
        assert_eq!(Value::from_json(&serde_json::json!(0.5)), Value::Float(0.5));
        assert_eq!(Value::from_json(&serde_json::json!("x")), Value::from("x"));
        assert_eq!(Value::from_json(&json), Value::from("{\"a\":1}"));
        assert_eq!(Value::from("x").to_json_value(), serde_json::json!("x"));
    }
}
