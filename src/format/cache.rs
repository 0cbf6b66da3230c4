//! Compiled pattern and template caches
//!
//! Both caches are owned by an engine and shared by reference with every
//! template and formatter it compiles; nothing here is process-global.

use super::date_pattern::DatePattern;
use super::formatter::Formatters;
use super::number_pattern::NumberPattern;
use super::template::Template;
use crate::core::error::Result;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Date and number patterns keyed by exact pattern text
#[derive(Debug, Default)]
pub struct PatternCache {
    dates: RwLock<HashMap<String, Arc<DatePattern>>>,
    numbers: RwLock<HashMap<String, Arc<NumberPattern>>>,
}

impl PatternCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn date(&self, pattern: &str) -> Arc<DatePattern> {
        if let Some(found) = self.dates.read().get(pattern) {
            return Arc::clone(found);
        }
        let compiled = Arc::new(DatePattern::compile(pattern));
        self.dates
            .write()
            .entry(pattern.to_string())
            .or_insert(compiled)
            .clone()
    }

    /// Compiled number pattern; failures are not cached
    pub fn number(&self, pattern: &str) -> Result<Arc<NumberPattern>> {
        if let Some(found) = self.numbers.read().get(pattern) {
            return Ok(Arc::clone(found));
        }
        let compiled = Arc::new(NumberPattern::compile(pattern)?);
        Ok(self
            .numbers
            .write()
            .entry(pattern.to_string())
            .or_insert(compiled)
            .clone())
    }

    /// Number of cached (date, number) patterns
    pub fn counts(&self) -> (usize, usize) {
        (self.dates.read().len(), self.numbers.read().len())
    }
}

/// Compiled templates keyed by source text
///
/// Formatter arguments are normalized at compile time, so a cache is only
/// valid for the formatter registry it was created with.
#[derive(Debug)]
pub struct TemplateCache {
    formatters: Arc<Formatters>,
    templates: RwLock<HashMap<String, Arc<Template>>>,
}

impl TemplateCache {
    pub fn new(formatters: Arc<Formatters>) -> Self {
        Self {
            formatters,
            templates: RwLock::new(HashMap::new()),
        }
    }

    pub fn formatters(&self) -> &Arc<Formatters> {
        &self.formatters
    }

    pub fn get_or_compile(&self, source: &str) -> Result<Arc<Template>> {
        if let Some(found) = self.templates.read().get(source) {
            return Ok(Arc::clone(found));
        }
        let compiled = Arc::new(Template::compile(source, &self.formatters)?);
        Ok(self
            .templates
            .write()
            .entry(source.to_string())
            .or_insert(compiled)
            .clone())
    }

    pub fn len(&self) -> usize {
        self.templates.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.read().is_empty()
    }
}
