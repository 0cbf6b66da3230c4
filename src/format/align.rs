//! `align` formatter: pad or crop a value to a fixed width
//!
//! Arguments:
//! - `s`: `left` (default) or `right`
//! - `w`: width; without it the value keeps its own width
//! - `c`: `yes` to crop values longer than the width (default `no`)
//! - `f`: filler string, repeated as needed (default a single space)

use super::formatter::{ArgMap, Formatter};
use crate::core::error::Result;
use crate::core::scope::Value;

/// The `align` formatter
#[derive(Debug, Clone, Copy, Default)]
pub struct Align;

fn is_word(value: Option<&str>, word: &str) -> bool {
    value.is_some_and(|v| v.trim().eq_ignore_ascii_case(word))
}

impl Formatter for Align {
    fn prepare(&self, args: ArgMap) -> Result<ArgMap> {
        let side = if is_word(args.get("s"), "right") {
            "right"
        } else {
            "left"
        };
        let width = args
            .get("w")
            .and_then(|w| w.trim().parse::<usize>().ok())
            .unwrap_or(0);
        let crop = if is_word(args.get("c"), "yes") { "yes" } else { "no" };
        let filler = args.get("f").unwrap_or(" ").to_string();

        Ok(ArgMap::new()
            .with("side", side)
            .with("width", width.to_string())
            .with("crop", crop)
            .with("filler", filler))
    }

    fn apply(&self, value: Value, args: &ArgMap) -> Option<Value> {
        let text = value.to_string();
        let len = text.chars().count();
        let right = args.get("side") == Some("right");
        let crop = args.get("crop") == Some("yes");
        let filler = args.get("filler").filter(|f| !f.is_empty()).unwrap_or(" ");

        let mut width = args
            .get("width")
            .and_then(|w| w.parse::<usize>().ok())
            .filter(|w| *w > 0)
            .unwrap_or(len);
        if width < len && !crop {
            width = len;
        }

        let padding: String = filler.chars().cycle().take(width.saturating_sub(len)).collect();
        let aligned = if right {
            let joined: Vec<char> = padding.chars().chain(text.chars()).collect();
            joined[joined.len() - width..].iter().collect()
        } else {
            text.chars().chain(padding.chars()).take(width).collect()
        };
        Some(Value::Str(aligned))
    }
}
