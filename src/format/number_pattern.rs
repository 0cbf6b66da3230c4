//! Number pattern compiler
//!
//! | Pattern | 1234.5 | 10 | 10.235 |
//! |---|---|---|---|
//! | `0` | `1235` | `10` | `10` |
//! | `0,0` | `1,235` | `10` | `10` |
//! | `0.000` | `1234.500` | `10.000` | `10.235` |
//! | `0,0.00` | `1,234.50` | `10.00` | `10.24` |
//! | `0.[00]` | `1234.5` | `10` | `10.24` |
//! | `0,0[.00]` | `1,234.5` | `10` | `10.24` |
//!
//! Wrapping the pattern in parens takes the absolute value, a trailing `%`
//! multiplies by 100. Rounding is decimal, half away from zero, applied to
//! the shortest representation of the input so that `10.235` rounds up.

use crate::core::error::{LoggerError, Result};
use regex::Regex;
use std::sync::OnceLock;

fn pattern_regex() -> Result<&'static Regex> {
    static RE: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d*,)?(\d+)(\.\d*)?(\[[\d.]+\])?"))
        .as_ref()
        .map_err(|e| LoggerError::other(format!("number pattern grammar: {}", e)))
}

/// A compiled number pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberPattern {
    source: String,
    abs: bool,
    percent: bool,
    thousands: bool,
    min_precision: usize,
    max_precision: usize,
}

impl NumberPattern {
    pub fn compile(pattern: &str) -> Result<Self> {
        let mut body = pattern.trim();

        let abs = body.len() >= 2 && body.starts_with('(') && body.ends_with(')');
        if abs {
            body = &body[1..body.len() - 1];
        }
        let percent = body.ends_with('%');
        if percent {
            body = &body[..body.len() - 1];
        }

        let caps = pattern_regex()?.captures(body).ok_or_else(|| {
            LoggerError::compile("number pattern", pattern, "no digit group found")
        })?;

        let thousands = caps.get(1).is_some();
        let optional = caps.get(4).map(|m| m.as_str());
        let (min_precision, max_precision) = match (caps.get(3), optional) {
            (Some(fixed), optional) => {
                let fixed = fixed.as_str().len() - 1;
                let extra = optional.map_or(0, |o| o.len() - 2);
                (fixed, fixed + extra)
            }
            (None, Some(optional)) => {
                // "[.00]": digits after the dot, closing bracket excluded
                let inner = &optional[1..optional.len() - 1];
                let digits = match inner.find('.') {
                    Some(idx) => inner.len() - idx - 1,
                    None => inner.len(),
                };
                (0, digits)
            }
            (None, None) => (0, 0),
        };

        Ok(Self {
            source: pattern.to_string(),
            abs,
            percent,
            thousands,
            min_precision,
            max_precision,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Fraction digits always printed
    pub fn min_precision(&self) -> usize {
        self.min_precision
    }

    /// Fraction digits printed at most
    pub fn max_precision(&self) -> usize {
        self.max_precision
    }

    pub fn format(&self, value: f64) -> String {
        let mut v = if value.is_finite() { value } else { 0.0 };
        if self.abs {
            v = v.abs();
        }
        if self.percent {
            v *= 100.0;
        }

        let (mut int_part, mut frac_part) = round_decimal(v.abs(), self.max_precision);

        while frac_part.len() > self.min_precision && frac_part.ends_with('0') {
            frac_part.pop();
        }
        if self.thousands {
            int_part = group_thousands(&int_part);
        }

        let is_zero = int_part.bytes().all(|b| b == b'0' || b == b',')
            && frac_part.bytes().all(|b| b == b'0');
        let mut out = String::with_capacity(int_part.len() + frac_part.len() + 2);
        if v < 0.0 && !is_zero {
            out.push('-');
        }
        out.push_str(&int_part);
        if !frac_part.is_empty() {
            out.push('.');
            out.push_str(&frac_part);
        }
        out
    }
}

/// Round a non-negative number to `digits` fraction digits.
///
/// Returns the integer digits and exactly `digits` fraction digits.
fn round_decimal(v: f64, digits: usize) -> (String, String) {
    let repr = v.to_string();
    let (int_str, frac_str) = match repr.split_once('.') {
        Some((i, f)) => (i, f),
        None => (repr.as_str(), ""),
    };

    let mut kept: Vec<u8> = int_str.bytes().collect();
    let int_len = kept.len();
    let frac_bytes = frac_str.as_bytes();
    for idx in 0..digits {
        kept.push(frac_bytes.get(idx).copied().unwrap_or(b'0'));
    }

    let round_up = frac_bytes.get(digits).is_some_and(|d| *d >= b'5');
    let mut int_len = int_len;
    if round_up {
        let mut carry = true;
        for digit in kept.iter_mut().rev() {
            if *digit == b'9' {
                *digit = b'0';
            } else {
                *digit += 1;
                carry = false;
                break;
            }
        }
        if carry {
            kept.insert(0, b'1');
            int_len += 1;
        }
    }

    let frac = kept.split_off(int_len);
    (
        String::from_utf8_lossy(&kept).into_owned(),
        String::from_utf8_lossy(&frac).into_owned(),
    )
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
