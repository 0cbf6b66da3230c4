//! Log messages and their rendering to the `msg` variable

use super::error::{LoggerError, Result};
use super::scope::Value;
use std::fmt;

/// Message argument of a log call
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Used as is
    Text(String),
    /// printf style: the first value is the format string
    ///
    /// Supported directives: `%s %d %i %f %j %o %O %%`. Arguments left over
    /// are appended separated by spaces.
    Format(Vec<Value>),
    /// An error and the chain of errors that caused it
    Error {
        summary: String,
        causes: Vec<String>,
    },
    /// Debug representation of an arbitrary value
    Inspect(String),
}

impl Message {
    pub fn text(text: impl Into<String>) -> Self {
        Message::Text(text.into())
    }

    pub fn format<I, V>(args: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Message::Format(args.into_iter().map(Into::into).collect())
    }

    /// Capture an error together with its `source()` chain
    pub fn error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        Message::Error {
            summary: err.to_string(),
            causes,
        }
    }

    pub fn inspect<T: fmt::Debug + ?Sized>(value: &T) -> Self {
        Message::Inspect(format!("{:?}", value))
    }

    /// Render to the text stored in `msg`
    pub(crate) fn render(&self) -> Result<String> {
        match self {
            Message::Text(text) => Ok(text.clone()),
            Message::Format(args) if args.is_empty() => Err(LoggerError::invalid_call(
                "message should be a string or a non-empty argument list",
            )),
            Message::Format(args) => Ok(printf(args)),
            Message::Error { summary, causes } => {
                let mut out = format!("<Error object>: {}", summary);
                for cause in causes {
                    out.push_str("\n\t\tcaused by: ");
                    out.push_str(cause);
                }
                Ok(out)
            }
            Message::Inspect(repr) => Ok(repr.clone()),
        }
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::Text(text)
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Text(text.to_string())
    }
}

impl From<&String> for Message {
    fn from(text: &String) -> Self {
        Message::Text(text.clone())
    }
}

impl From<Vec<Value>> for Message {
    fn from(args: Vec<Value>) -> Self {
        Message::Format(args)
    }
}

fn inspect_value(value: &Value) -> String {
    match value {
        Value::Str(s) => format!("'{}'", s),
        other => other.to_string(),
    }
}

fn number_text(value: &Value, truncate: bool) -> String {
    match value.as_number() {
        Some(n) if truncate => format!("{}", n.trunc()),
        Some(n) => Value::Float(n).to_string(),
        None => "NaN".to_string(),
    }
}

fn printf(args: &[Value]) -> String {
    let (format, rest) = match args.split_first() {
        Some((Value::Str(format), rest)) => (format, rest),
        _ => {
            return args
                .iter()
                .map(inspect_value)
                .collect::<Vec<_>>()
                .join(" ")
        }
    };

    let mut out = String::with_capacity(format.len());
    let mut pending = rest.iter();
    let mut chars = format.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let directive = match chars.peek() {
            Some(&d) if "sdifjoO%".contains(d) => d,
            _ => {
                out.push('%');
                continue;
            }
        };
        chars.next();
        if directive == '%' {
            out.push('%');
            continue;
        }
        match pending.next() {
            Some(arg) => out.push_str(&match directive {
                's' => arg.to_string(),
                'd' | 'f' => number_text(arg, false),
                'i' => number_text(arg, true),
                'j' => arg.to_json_value().to_string(),
                _ => inspect_value(arg),
            }),
            None => {
                out.push('%');
                out.push(directive);
            }
        }
    }

    for arg in pending {
        out.push(' ');
        match arg {
            Value::Str(s) => out.push_str(s),
            other => out.push_str(&inspect_value(other)),
        }
    }
    out
}
