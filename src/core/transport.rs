//! Transport trait and registry
//!
//! A transport receives the rendered records of the routes bound to it.
//! Transports are created from route specs by named factories each time a
//! configuration generation is built, and released with [`Transport::free`]
//! once that generation is retired.

use super::config::RouteSpec;
use super::error::{LoggerError, Result};
use super::level::{LevelTable, Role};
use super::record::{Ack, Record};
use super::scope::{Frame, ScopeChain};
use crate::format::TemplateCache;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Destination of rendered records
///
/// `out` must not block the caller for the duration of the write: slow
/// transports queue the record and answer the ack later.
pub trait Transport: Send + Sync {
    /// Name of the transport kind, e.g. `console`
    fn kind(&self) -> &str;

    /// Deliver one record and answer `ack` when done
    fn out(&self, record: Record, ack: Ack);

    /// Release shared resources; called exactly once when the generation
    /// owning this instance is retired
    fn free(&self) {}
}

/// Engine state a factory may consult
#[derive(Clone)]
pub struct TransportContext {
    levels: LevelTable,
    variables: Arc<Frame>,
    templates: Arc<TemplateCache>,
    role: Role,
}

impl TransportContext {
    pub(crate) fn new(
        levels: LevelTable,
        variables: Arc<Frame>,
        templates: Arc<TemplateCache>,
        role: Role,
    ) -> Self {
        Self {
            levels,
            variables,
            templates,
            role,
        }
    }

    pub fn levels(&self) -> &LevelTable {
        &self.levels
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Scope chain holding the process variables only
    pub fn variables(&self) -> ScopeChain {
        let mut chain = ScopeChain::new();
        chain.push(Arc::clone(&self.variables));
        chain
    }

    /// Render template text against the process variables
    pub fn render(&self, source: &str) -> Result<String> {
        let template = self.templates.get_or_compile(source)?;
        Ok(template.render(&self.variables()))
    }
}

impl fmt::Debug for TransportContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportContext")
            .field("levels", &self.levels)
            .field("role", &self.role)
            .finish()
    }
}

/// Creates a transport for one route.
///
/// Receives the instance the same route name had in the previous
/// generation, if any.
pub type TransportFactory = Arc<
    dyn Fn(&TransportContext, &RouteSpec, Option<Arc<dyn Transport>>) -> Result<Arc<dyn Transport>>
        + Send
        + Sync,
>;

/// Transport factories by name
#[derive(Clone, Default)]
pub struct TransportRegistry {
    factories: HashMap<String, TransportFactory>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry holding the transports enabled by crate features
    pub fn with_builtins() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();
        #[cfg(feature = "console")]
        registry.register_factory("console", crate::transports::console::factory());
        #[cfg(feature = "file")]
        registry.register_factory("file", crate::transports::file::factory());
        registry
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&TransportContext, &RouteSpec, Option<Arc<dyn Transport>>) -> Result<Arc<dyn Transport>>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn register_factory(&mut self, name: impl Into<String>, factory: TransportFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Create the transport of a route
    pub fn create(
        &self,
        context: &TransportContext,
        spec: &RouteSpec,
        previous: Option<Arc<dyn Transport>>,
    ) -> Result<Arc<dyn Transport>> {
        let factory = self.factories.get(spec.transport()).ok_or_else(|| {
            LoggerError::config(
                "routes",
                format!("Cannot find transport '{}'", spec.transport()),
            )
        })?;
        factory(context, spec, previous).map_err(|e| e.in_route(spec.name()))
    }
}

impl fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("TransportRegistry")
            .field("names", &names)
            .finish()
    }
}
