//! `format` formatter: render dates and numbers through a pattern
//!
//! `${date|format(f=yyyy-mm-dd)}` uses the date pattern compiler,
//! `${elapsed|format(f=0,0.00)}` the number pattern compiler. Values that
//! are neither pass through as text.

use super::cache::PatternCache;
use super::formatter::{ArgMap, Formatter};
use crate::core::scope::Value;
use std::sync::Arc;

/// The `format` formatter
#[derive(Debug, Clone)]
pub struct FormatValue {
    patterns: Arc<PatternCache>,
}

impl FormatValue {
    pub fn new(patterns: Arc<PatternCache>) -> Self {
        Self { patterns }
    }
}

impl Formatter for FormatValue {
    fn apply(&self, value: Value, args: &ArgMap) -> Option<Value> {
        let pattern = match args.get("f") {
            Some(f) if !f.is_empty() => f,
            _ => return Some(Value::Str(String::new())),
        };

        match &value {
            Value::Date(date) => Some(Value::Str(self.patterns.date(pattern).format(date))),
            Value::Func(_) => Some(Value::Str(value.to_string())),
            other => match other.as_number() {
                Some(number) => {
                    // unusable pattern: the variable renders empty
                    let compiled = self.patterns.number(pattern).ok()?;
                    Some(Value::Str(compiled.format(number)))
                }
                None => Some(Value::Str(other.to_string())),
            },
        }
    }
}
