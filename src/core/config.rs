//! Engine configuration
//!
//! The configuration is plain data, normally loaded from JSON:
//!
//! ```json
//! {
//!   "modules": true,
//!   "level": "info",
//!   "exclude": ["db*", {"http": "warn"}],
//!   "formats": {"short": "${level}: ${msg}"},
//!   "routes": [
//!     {"name": "screen", "transport": "console", "format": "short"},
//!     {"name": "audit", "transport": "file", "file_name": "audit.log", "tags": ["audit"]}
//!   ]
//! }
//! ```
//!
//! Validation happens when an engine is built from it, not at parse time.

use super::error::{LoggerError, Result};
use super::level::{LevelTable, Threshold};
use super::rules::{Rule, RuleSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Route name used when a single route has none
pub const DEFAULT_ROUTE_NAME: &str = "default-route";

/// Format announced on the `start` event when the configuration defines it
pub const START_MESSAGE_FORMAT: &str = "start-message";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Label of the engine
    pub name: Option<String>,
    /// Level names, least severe first
    pub levels: Option<Vec<String>>,
    /// Exactly two names: master role, worker role
    pub roles: Option<Vec<String>>,
    /// Exactly two names: default allow, default deny
    pub policies: Option<Vec<String>>,
    /// Channel mode
    pub modules: bool,
    /// Language catalogs, or aliases naming another language
    pub messages: Option<BTreeMap<String, LangEntry>>,
    pub lang: Option<String>,
    pub variables: BTreeMap<String, serde_json::Value>,
    /// Named templates
    pub formats: BTreeMap<String, String>,
    /// Name of the default format
    pub format: Option<String>,
    /// Role this configuration applies to (`any` or a role name)
    pub role: Option<String>,
    pub level: Option<String>,
    pub policy: Option<String>,
    pub include: Option<Vec<RuleEntry>>,
    pub exclude: Option<Vec<RuleEntry>>,
    /// Event name to format names
    pub events: Option<BTreeMap<String, OneOrMany>>,
    pub routes: Option<Vec<RouteSpec>>,
}

impl Config {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| {
            LoggerError::io_operation(
                "loading configuration",
                format!("cannot read {}", path.display()),
                e,
            )
        })?;
        Self::from_json_str(&data)
    }

    /// Route specs in effect, with defaults and names filled in
    pub(crate) fn effective_routes(&self) -> Result<Vec<RouteSpec>> {
        let mut routes = match &self.routes {
            None => vec![RouteSpec::new(DEFAULT_ROUTE_NAME, "console").with_level("info")],
            Some(routes) if routes.is_empty() => {
                return Err(LoggerError::config(
                    "routes",
                    "Option 'routes' should be a non-empty array",
                ));
            }
            Some(routes) => routes.clone(),
        };

        let single = routes.len() == 1;
        for (idx, route) in routes.iter_mut().enumerate() {
            if route.transport.as_deref().map_or(true, str::is_empty) {
                return Err(LoggerError::config(
                    "routes",
                    format!("Cannot find transport value in route {}", idx),
                ));
            }
            match &route.name {
                Some(_) => {}
                None if single => route.name = Some(DEFAULT_ROUTE_NAME.to_string()),
                None => {
                    return Err(LoggerError::config(
                        "routes",
                        format!("Cannot find route name for #{}", idx),
                    ));
                }
            }
        }

        for (idx, route) in routes.iter().enumerate() {
            if routes[..idx].iter().any(|r| r.name == route.name) {
                return Err(LoggerError::config(
                    "routes",
                    format!("Route '{}' is duplicate", route.name()),
                ));
            }
        }
        Ok(routes)
    }
}

/// Entry of `messages`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LangEntry {
    /// Another language name to follow
    Alias(String),
    Catalog(BTreeMap<String, String>),
}

/// Include / exclude entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleEntry {
    /// Channel pattern that applies at every level
    Pattern(String),
    /// Channel patterns with the level each applies from
    Levels(BTreeMap<String, String>),
}

impl RuleEntry {
    pub fn pattern(pattern: impl Into<String>) -> Self {
        RuleEntry::Pattern(pattern.into())
    }

    pub fn at_level(pattern: impl Into<String>, level: impl Into<String>) -> Self {
        RuleEntry::Levels(BTreeMap::from([(pattern.into(), level.into())]))
    }
}

/// A single name or a list of names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(name) => vec![name],
            OneOrMany::Many(names) => names,
        }
    }
}

/// One entry of `routes`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteSpec {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub transport: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub policy: Option<String>,
    #[serde(default)]
    pub include: Option<Vec<RuleEntry>>,
    #[serde(default, rename = "include+")]
    pub include_extra: Option<Vec<RuleEntry>>,
    #[serde(default)]
    pub exclude: Option<Vec<RuleEntry>>,
    #[serde(default, rename = "exclude+")]
    pub exclude_extra: Option<Vec<RuleEntry>>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub events: Option<BTreeMap<String, OneOrMany>>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Transport specific settings
    #[serde(flatten)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

impl RouteSpec {
    pub fn new(name: impl Into<String>, transport: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            transport: Some(transport.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(DEFAULT_ROUTE_NAME)
    }

    pub fn transport(&self) -> &str {
        self.transport.as_deref().unwrap_or_default()
    }

    /// Transport option as a string
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(|v| v.as_str())
    }

    /// Transport option as a boolean; `"yes"`/`"true"` strings count as true
    pub fn option_bool(&self, key: &str) -> Option<bool> {
        match self.options.get(key)? {
            serde_json::Value::Bool(b) => Some(*b),
            serde_json::Value::String(s) => Some(matches!(s.trim(), "yes" | "true" | "1")),
            serde_json::Value::Number(n) => Some(n.as_i64() != Some(0)),
            _ => None,
        }
    }
}

/// Compile include / exclude entries into a rule set
pub(crate) fn build_rules(levels: &LevelTable, entries: &[RuleEntry]) -> Result<RuleSet> {
    let mut set = RuleSet::new();
    for entry in entries {
        match entry {
            RuleEntry::Pattern(pattern) => set.push(Rule::new(pattern.trim(), Threshold::Always)?),
            RuleEntry::Levels(map) => {
                for (pattern, level) in map {
                    let rank = levels.rank(level).ok_or_else(|| {
                        LoggerError::config("rules", format!("Bad level name '{}'", level))
                    })?;
                    set.push(Rule::new(pattern.trim(), Threshold::Rank(rank))?);
                }
            }
        }
    }
    Ok(set)
}

/// Optional rule list of option `option`
pub(crate) fn optional_rules(
    levels: &LevelTable,
    option: &str,
    entries: Option<&Vec<RuleEntry>>,
) -> Result<Option<RuleSet>> {
    entries
        .map(|entries| build_rules(levels, entries).map_err(|e| e.in_option(option)))
        .transpose()
}

/// Validate an `events` map against the known format names
pub(crate) fn build_events<F>(
    events: &BTreeMap<String, OneOrMany>,
    format_exists: F,
) -> Result<BTreeMap<String, Vec<String>>>
where
    F: Fn(&str) -> bool,
{
    let mut out = BTreeMap::new();
    for (event, handlers) in events {
        let handlers = handlers.clone().into_vec();
        if handlers.is_empty() {
            continue;
        }
        for format in &handlers {
            if !format_exists(format) {
                return Err(LoggerError::config(
                    "events",
                    format!("Cannot find format '{}'", format),
                ));
            }
        }
        out.insert(event.clone(), handlers);
    }
    Ok(out)
}
