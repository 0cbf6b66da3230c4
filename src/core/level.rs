//! Level table, policies, thresholds and roles
//!
//! Severity levels are not a fixed enum: the configuration names them, and a
//! level's rank is its position in that list (index 0 is least severe).

use super::error::{LoggerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Level names used when the configuration does not provide any
pub const DEFAULT_LEVELS: [&str; 5] = ["debug", "info", "warn", "error", "crit"];

/// Role names used when the configuration does not provide any
pub const DEFAULT_ROLES: [&str; 2] = ["master", "worker"];

/// Policy names used when the configuration does not provide any
pub const DEFAULT_POLICIES: [&str; 2] = ["everything", "nothing"];

/// Rank reported in the `level#` variable of tag dispatches
pub const TAG_RANK: i64 = -1;

/// Ordered list of unique, lower-cased level names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelTable {
    names: Vec<String>,
}

impl LevelTable {
    /// Build a table from names in order of increasing severity
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut table = Vec::new();
        for name in names {
            let name = name.as_ref().trim().to_lowercase();
            if name.is_empty() {
                return Err(LoggerError::config("levels", "Level name cannot be empty"));
            }
            if table.contains(&name) {
                return Err(LoggerError::config(
                    "levels",
                    format!("Level '{}' is duplicate", name),
                ));
            }
            table.push(name);
        }
        if table.is_empty() {
            return Err(LoggerError::config("levels", "At least one level is required"));
        }
        Ok(Self { names: table })
    }

    /// Rank of a level name, case-insensitive
    pub fn rank(&self, name: &str) -> Option<usize> {
        let name = name.trim().to_lowercase();
        self.names.iter().position(|n| *n == name)
    }

    /// Name of a rank
    pub fn name(&self, rank: usize) -> Option<&str> {
        self.names.get(rank).map(String::as_str)
    }

    /// Resolve a level argument to a rank
    pub fn resolve(&self, level: &Level) -> Result<usize> {
        match level {
            Level::Rank(rank) if *rank < self.names.len() => Ok(*rank),
            Level::Rank(rank) => Err(LoggerError::invalid_call(format!(
                "level #{} not found",
                rank
            ))),
            Level::Name(name) => self.rank(name).ok_or_else(|| {
                LoggerError::invalid_call(format!("level '{}' not found", name))
            }),
        }
    }

    /// Rank of a level name used inside configuration
    pub(crate) fn config_rank(&self, name: &str) -> Result<usize> {
        self.rank(name)
            .ok_or_else(|| LoggerError::config("level", format!("Unknown level name '{}'", name)))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Highest rank in the table
    pub fn max_rank(&self) -> usize {
        self.names.len().saturating_sub(1)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl Default for LevelTable {
    fn default() -> Self {
        Self {
            names: DEFAULT_LEVELS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Level argument of a log call: a rank or a level name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Level {
    Rank(usize),
    Name(String),
}

impl From<usize> for Level {
    fn from(rank: usize) -> Self {
        Level::Rank(rank)
    }
}

impl From<&str> for Level {
    fn from(name: &str) -> Self {
        Level::Name(name.to_string())
    }
}

impl From<String> for Level {
    fn from(name: String) -> Self {
        Level::Name(name)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Rank(rank) => write!(f, "#{}", rank),
            Level::Name(name) => write!(f, "{}", name),
        }
    }
}

/// Default stance for channels no rule mentions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Policy {
    /// Default allow
    #[default]
    Everything,
    /// Default deny
    Nothing,
}

impl Policy {
    /// Parse a policy from its configured name; index 0 is `Everything`
    pub(crate) fn from_names(names: &[String; 2], value: &str) -> Result<Self> {
        match names.iter().position(|n| n == value.trim()) {
            Some(0) => Ok(Policy::Everything),
            Some(_) => Ok(Policy::Nothing),
            None => Err(LoggerError::config(
                "policy",
                format!("Unknown policy name '{}'", value),
            )),
        }
    }
}

/// Threshold carried by an include or exclude rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threshold {
    /// No explicit level: the rule applies unconditionally
    Always,
    /// Rule applies from this rank
    Rank(usize),
}

/// Cluster role of the running process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Role {
    #[default]
    Master,
    Worker,
}

impl Role {
    pub(crate) fn index(self) -> usize {
        match self {
            Role::Master => 0,
            Role::Worker => 1,
        }
    }

    /// Parse a role requirement; `any` means no requirement
    pub(crate) fn requirement(names: &[String; 2], value: &str) -> Result<Option<Self>> {
        let value = value.trim();
        if value == "any" {
            return Ok(None);
        }
        match names.iter().position(|n| n == value) {
            Some(0) => Ok(Some(Role::Master)),
            Some(_) => Ok(Some(Role::Worker)),
            None => Err(LoggerError::config(
                "role",
                format!("Unknown role name '{}'", value),
            )),
        }
    }
}

/// Turn an optional configured name list into exactly two names
pub(crate) fn name_pair(
    option: &str,
    names: Option<&Vec<String>>,
    defaults: [&str; 2],
) -> Result<[String; 2]> {
    match names {
        None => Ok([defaults[0].to_string(), defaults[1].to_string()]),
        Some(list) if list.len() == 2 => Ok([list[0].trim().to_string(), list[1].trim().to_string()]),
        Some(list) => Err(LoggerError::config(
            option,
            format!("Option '{}' needs exactly 2 names, got {}", option, list.len()),
        )),
    }
}
