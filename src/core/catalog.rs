//! Per-language message catalogs
//!
//! A language maps to either a catalog or the name of another language, so
//! `{"en": "default", "en-GB": "en"}` makes both names read the default
//! catalog.

use super::config::LangEntry;
use super::error::{LoggerError, Result};
use std::collections::{BTreeMap, HashSet};

/// Language of last resort
pub const DEFAULT_LANG: &str = "default";

#[derive(Debug, Clone)]
pub struct Catalog {
    languages: BTreeMap<String, LangEntry>,
}

impl Catalog {
    /// Build from the `messages` option; it must resolve `default`
    pub fn new(messages: Option<&BTreeMap<String, LangEntry>>) -> Result<Self> {
        let catalog = match messages {
            Some(messages) => Self {
                languages: messages.clone(),
            },
            None => return Ok(Self::default()),
        };
        if catalog.resolve(DEFAULT_LANG).is_none() {
            return Err(LoggerError::config(
                "messages",
                "Messages should contain 'default' language",
            ));
        }
        Ok(catalog)
    }

    /// Follow aliases to the language that owns a catalog.
    ///
    /// `None` for unknown languages and alias cycles. An empty name means
    /// the default language.
    pub fn resolve(&self, lang: &str) -> Option<String> {
        let mut current = match lang.trim() {
            "" => DEFAULT_LANG,
            name => name,
        };
        let mut seen = HashSet::new();
        while seen.insert(current) {
            match self.languages.get(current)? {
                LangEntry::Alias(target) => current = target.trim(),
                LangEntry::Catalog(_) => return Some(current.to_string()),
            }
        }
        None
    }

    /// Resolve `lang` or fail with a configuration error
    pub(crate) fn require(&self, lang: &str) -> Result<String> {
        self.resolve(lang).ok_or_else(|| {
            LoggerError::config("lang", format!("Cannot find language '{}'", lang))
        })
    }

    /// Message text of `key` in a resolved language
    pub fn lookup(&self, lang: &str, key: &str) -> Option<&str> {
        match self.languages.get(lang)? {
            LangEntry::Catalog(messages) => messages.get(key).map(String::as_str),
            LangEntry::Alias(_) => None,
        }
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            languages: BTreeMap::from([(
                DEFAULT_LANG.to_string(),
                LangEntry::Catalog(BTreeMap::new()),
            )]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages() -> BTreeMap<String, LangEntry> {
        BTreeMap::from([
            (
                "default".to_string(),
                LangEntry::Catalog(BTreeMap::from([("hello".to_string(), "Hello".to_string())])),
            ),
            (
                "ru".to_string(),
                LangEntry::Catalog(BTreeMap::from([("hello".to_string(), "Привет".to_string())])),
            ),
            ("en".to_string(), LangEntry::Alias("default".into())),
            ("en-GB".to_string(), LangEntry::Alias("en".into())),
            ("loop-a".to_string(), LangEntry::Alias("loop-b".into())),
            ("loop-b".to_string(), LangEntry::Alias("loop-a".into())),
        ])
    }

    #[test]
    fn test_alias_chain() {
        let catalog = Catalog::new(Some(&messages())).unwrap();
        assert_eq!(catalog.resolve("en-GB").as_deref(), Some("default"));
        assert_eq!(catalog.resolve("ru").as_deref(), Some("ru"));
        assert_eq!(catalog.resolve("").as_deref(), Some("default"));
    }

    #[test]
    fn test_cycles_and_unknown_languages() {
        let catalog = Catalog::new(Some(&messages())).unwrap();
        assert_eq!(catalog.resolve("loop-a"), None);
        assert_eq!(catalog.resolve("fr"), None);
        assert!(catalog.require("fr").is_err());
    }

    #[test]
    fn test_default_required() {
        let mut bad = messages();
        bad.remove("default");
        assert!(Catalog::new(Some(&bad)).is_err());
        assert!(Catalog::new(None).is_ok());
    }

    #[test]
    fn test_lookup() {
        let catalog = Catalog::new(Some(&messages())).unwrap();
        assert_eq!(catalog.lookup("ru", "hello"), Some("Привет"));
        assert_eq!(catalog.lookup("default", "missing"), None);
    }
}
