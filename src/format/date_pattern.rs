//! Date pattern compiler
//!
//! Token set:
//!
//! | Token | Output |
//! |---|---|
//! | `d` `dd` | day of month, `dd` zero padded |
//! | `ddd` `dddd` | weekday name, short / full |
//! | `m` `mm` | month number, `mm` zero padded |
//! | `mmm` `mmmm` | month name, short / full |
//! | `yy` `yyyy` | two / four digit year |
//! | `h` `hh` `H` `HH` | 12h / 24h hour, doubled form zero padded |
//! | `M` `MM` | minutes |
//! | `s` `ss` | seconds |
//! | `l` `L` | milliseconds (3 digits) / centiseconds (2 digits) |
//! | `t` `tt` `T` `TT` | `a`/`p`, `am`/`pm`, `A`/`P`, `AM`/`PM` |
//! | `Z` | zone: `UTC` or `GMT+hhmm` |
//! | `o` | offset `+hhmm` |
//! | `S` | ordinal suffix of the day (`st`, `nd`, `rd`, `th`) |
//! | `W` `N` | ISO week number / ISO weekday (1 = Monday) |
//! | `'...'` `"..."` | literal text, quotes removed |
//!
//! A leading `UTC:` converts the date to UTC before any token is read.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, Timelike};

const DAY_NAMES_SHORT: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
const DAY_NAMES_FULL: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];
const MONTH_NAMES_SHORT: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];
const MONTH_NAMES_FULL: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateToken {
    Day,
    DayPadded,
    WeekdayShort,
    WeekdayFull,
    Month,
    MonthPadded,
    MonthShort,
    MonthFull,
    YearShort,
    Year,
    Hour12,
    Hour12Padded,
    Hour24,
    Hour24Padded,
    Minute,
    MinutePadded,
    Second,
    SecondPadded,
    Millis,
    Centis,
    MarkerLower,
    MarkerLowerLong,
    MarkerUpper,
    MarkerUpperLong,
    Zone,
    Offset,
    Ordinal,
    IsoWeek,
    IsoWeekday,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(String),
    /// Index into the distinct token list
    Token(usize),
}

/// A compiled date pattern
#[derive(Debug, Clone)]
pub struct DatePattern {
    source: String,
    utc: bool,
    tokens: Vec<DateToken>,
    pieces: Vec<Piece>,
}

impl DatePattern {
    /// Compile a pattern. Every string is a valid pattern: text that is not
    /// a token is copied through.
    pub fn compile(pattern: &str) -> Self {
        let (utc, body) = match pattern.strip_prefix("UTC:") {
            Some(rest) => (true, rest),
            None => (false, pattern),
        };

        let mut tokens = Vec::new();
        let mut pieces = Vec::new();
        let mut literal = String::new();
        let chars: Vec<char> = body.chars().collect();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];

            if c == '\'' || c == '"' {
                if let Some(end) = chars[i + 1..].iter().position(|&q| q == c) {
                    literal.extend(&chars[i + 1..i + 1 + end]);
                    i += end + 2;
                    continue;
                }
            }

            let run = chars[i..].iter().take_while(|&&r| r == c).count();
            let matched = match c {
                'd' => Some((run.min(4), [DateToken::Day, DateToken::DayPadded, DateToken::WeekdayShort, DateToken::WeekdayFull][run.min(4) - 1])),
                'm' => Some((run.min(4), [DateToken::Month, DateToken::MonthPadded, DateToken::MonthShort, DateToken::MonthFull][run.min(4) - 1])),
                'y' if run >= 4 => Some((4, DateToken::Year)),
                'y' if run >= 2 => Some((2, DateToken::YearShort)),
                'H' => Some(pair(run, DateToken::Hour24, DateToken::Hour24Padded)),
                'h' => Some(pair(run, DateToken::Hour12, DateToken::Hour12Padded)),
                'M' => Some(pair(run, DateToken::Minute, DateToken::MinutePadded)),
                's' => Some(pair(run, DateToken::Second, DateToken::SecondPadded)),
                'T' => Some(pair(run, DateToken::MarkerUpper, DateToken::MarkerUpperLong)),
                't' => Some(pair(run, DateToken::MarkerLower, DateToken::MarkerLowerLong)),
                'l' => Some((1, DateToken::Millis)),
                'L' => Some((1, DateToken::Centis)),
                'o' => Some((1, DateToken::Offset)),
                'S' => Some((1, DateToken::Ordinal)),
                'Z' => Some((1, DateToken::Zone)),
                'W' => Some((1, DateToken::IsoWeek)),
                'N' => Some((1, DateToken::IsoWeekday)),
                _ => None,
            };

            match matched {
                Some((len, token)) => {
                    if !literal.is_empty() {
                        pieces.push(Piece::Literal(std::mem::take(&mut literal)));
                    }
                    let idx = match tokens.iter().position(|t| *t == token) {
                        Some(idx) => idx,
                        None => {
                            tokens.push(token);
                            tokens.len() - 1
                        }
                    };
                    pieces.push(Piece::Token(idx));
                    i += len;
                }
                None => {
                    literal.push(c);
                    i += 1;
                }
            }
        }
        if !literal.is_empty() {
            pieces.push(Piece::Literal(literal));
        }

        Self {
            source: pattern.to_string(),
            utc,
            tokens,
            pieces,
        }
    }

    /// The pattern text this was compiled from
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the pattern converts to UTC first
    pub fn is_utc(&self) -> bool {
        self.utc
    }

    pub fn format(&self, date: &DateTime<FixedOffset>) -> String {
        let (naive, offset_secs) = if self.utc {
            (date.naive_utc(), 0)
        } else {
            (date.naive_local(), date.offset().local_minus_utc())
        };

        // each distinct token is computed once, however often it repeats
        let values: Vec<String> = self
            .tokens
            .iter()
            .map(|token| render_token(*token, &naive, offset_secs, self.utc))
            .collect();

        let mut out = String::new();
        for piece in &self.pieces {
            match piece {
                Piece::Literal(text) => out.push_str(text),
                Piece::Token(idx) => out.push_str(&values[*idx]),
            }
        }
        out
    }
}

fn pair(run: usize, single: DateToken, double: DateToken) -> (usize, DateToken) {
    if run >= 2 {
        (2, double)
    } else {
        (1, single)
    }
}

fn offset_digits(offset_secs: i32) -> String {
    let sign = if offset_secs < 0 { '-' } else { '+' };
    let minutes = offset_secs.abs() / 60;
    format!("{}{:02}{:02}", sign, minutes / 60, minutes % 60)
}

fn ordinal_suffix(day: u32) -> &'static str {
    if (11..=13).contains(&(day % 100)) {
        return "th";
    }
    match day % 10 {
        1 => "st",
        2 => "nd",
        3 => "rd",
        _ => "th",
    }
}

fn render_token(token: DateToken, t: &NaiveDateTime, offset_secs: i32, utc: bool) -> String {
    let hour12 = match t.hour() % 12 {
        0 => 12,
        h => h,
    };
    let morning = t.hour() < 12;
    let millis = t.nanosecond() / 1_000_000 % 1000;

    match token {
        DateToken::Day => t.day().to_string(),
        DateToken::DayPadded => format!("{:02}", t.day()),
        DateToken::WeekdayShort => {
            DAY_NAMES_SHORT[t.weekday().num_days_from_sunday() as usize].to_string()
        }
        DateToken::WeekdayFull => {
            DAY_NAMES_FULL[t.weekday().num_days_from_sunday() as usize].to_string()
        }
        DateToken::Month => t.month().to_string(),
        DateToken::MonthPadded => format!("{:02}", t.month()),
        DateToken::MonthShort => MONTH_NAMES_SHORT[t.month0() as usize].to_string(),
        DateToken::MonthFull => MONTH_NAMES_FULL[t.month0() as usize].to_string(),
        DateToken::YearShort => format!("{:02}", t.year().rem_euclid(100)),
        DateToken::Year => t.year().to_string(),
        DateToken::Hour12 => hour12.to_string(),
        DateToken::Hour12Padded => format!("{:02}", hour12),
        DateToken::Hour24 => t.hour().to_string(),
        DateToken::Hour24Padded => format!("{:02}", t.hour()),
        DateToken::Minute => t.minute().to_string(),
        DateToken::MinutePadded => format!("{:02}", t.minute()),
        DateToken::Second => t.second().to_string(),
        DateToken::SecondPadded => format!("{:02}", t.second()),
        DateToken::Millis => format!("{:03}", millis),
        DateToken::Centis => format!("{:02}", millis / 10),
        DateToken::MarkerLower => (if morning { "a" } else { "p" }).to_string(),
        DateToken::MarkerLowerLong => (if morning { "am" } else { "pm" }).to_string(),
        DateToken::MarkerUpper => (if morning { "A" } else { "P" }).to_string(),
        DateToken::MarkerUpperLong => (if morning { "AM" } else { "PM" }).to_string(),
        DateToken::Zone if utc || offset_secs == 0 => "UTC".to_string(),
        DateToken::Zone => format!("GMT{}", offset_digits(offset_secs)),
        DateToken::Offset => offset_digits(offset_secs),
        DateToken::Ordinal => ordinal_suffix(t.day()).to_string(),
        DateToken::IsoWeek => t.iso_week().week().to_string(),
        DateToken::IsoWeekday => t.weekday().number_from_monday().to_string(),
    }
}
