//! Template language: compiler, formatters and pattern sub-languages

pub mod align;
pub mod cache;
pub mod date_pattern;
pub mod format_value;
pub mod formatter;
pub mod number_pattern;
pub mod template;

pub use align::Align;
pub use cache::{PatternCache, TemplateCache};
pub use date_pattern::DatePattern;
pub use format_value::FormatValue;
pub use formatter::{ArgMap, Formatter, Formatters};
pub use number_pattern::NumberPattern;
pub use template::{CompiledFormat, FormatFn, Template};

/// Name of the format used when the configuration names none
pub const DEFAULT_FORMAT: &str = "text";

/// Source of the built-in `text` format
pub const TEXT_FORMAT: &str =
    "${date|format(f=yyyy-mm-dd HH:MM:ss.l)} | [${level|align(s=right,w=5)}] ${msg}";

/// The built-in `json` format: the message as a JSON value
pub fn json_format() -> CompiledFormat {
    CompiledFormat::function(|chain| {
        chain
            .resolve("msg")
            .map(|msg| msg.to_json_value())
            .unwrap_or(serde_json::Value::Null)
            .to_string()
    })
}
