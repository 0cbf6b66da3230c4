//! Console transport
//!
//! Route options:
//!
//! | Option | Meaning |
//! |---|---|
//! | `stderr_level` | records at or above this level go to stderr |
//! | `colors` | colour the line by its level's position in the level table |

use crate::core::{
    Ack, LevelTable, LoggerError, Record, Result, RouteSpec, Transport, TransportContext,
    TransportFactory,
};
use colored::{Color, Colorize};
use std::io::Write;
use std::sync::Arc;

pub struct ConsoleTransport {
    stderr_from: Option<usize>,
    colors: bool,
    level_count: usize,
}

impl ConsoleTransport {
    pub fn new(levels: &LevelTable, spec: &RouteSpec) -> Result<Self> {
        let stderr_from = match spec.option_str("stderr_level") {
            Some(name) => Some(levels.rank(name).ok_or_else(|| {
                LoggerError::config(
                    "console",
                    format!("Unknown level name '{}' in option 'stderr_level'", name),
                )
            })?),
            None => None,
        };
        Ok(Self {
            stderr_from,
            colors: spec.option_bool("colors").unwrap_or(false),
            level_count: levels.len(),
        })
    }

    /// Colour of a rank: lowest levels stay dim, the highest is bright red
    pub fn color_for(&self, rank: usize) -> Color {
        let top = self.level_count.saturating_sub(1).max(1);
        match rank * 4 / top {
            _ if rank >= top => Color::BrightRed,
            0 => Color::Blue,
            1 => Color::Green,
            2 => Color::Yellow,
            _ => Color::Red,
        }
    }

    fn to_stderr(&self, record: &Record) -> bool {
        match (self.stderr_from, record.level) {
            (Some(from), Some(rank)) => rank >= from,
            _ => false,
        }
    }

    fn line(&self, record: &Record) -> String {
        match record.level {
            Some(rank) if self.colors => record.text.color(self.color_for(rank)).to_string(),
            _ => record.text.clone(),
        }
    }
}

impl Transport for ConsoleTransport {
    fn kind(&self) -> &str {
        "console"
    }

    fn out(&self, record: Record, ack: Ack) {
        let line = self.line(&record);
        let result = if self.to_stderr(&record) {
            writeln!(std::io::stderr().lock(), "{}", line)
        } else {
            writeln!(std::io::stdout().lock(), "{}", line)
        };
        match result {
            Ok(()) => ack.ok(),
            Err(e) => ack.fail(LoggerError::transport(record.route, e.to_string())),
        }
    }
}

pub fn factory() -> TransportFactory {
    Arc::new(
        |ctx: &TransportContext,
         spec: &RouteSpec,
         _previous: Option<Arc<dyn Transport>>|
         -> Result<Arc<dyn Transport>> {
            Ok(Arc::new(ConsoleTransport::new(ctx.levels(), spec)?))
        },
    )
}
