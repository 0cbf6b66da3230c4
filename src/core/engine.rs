//! Routing engine
//!
//! The engine owns the live configuration generation and dispatches log
//! calls to the routes that qualify for them. Reconfiguration builds a new
//! generation completely, swaps it in atomically and only then releases the
//! transports of the old one; a call always sees exactly one generation.

use super::channel::{Channel, ChannelState};
use super::config::{Config, RouteSpec};
use super::error::{LoggerError, Result};
use super::generation::{BuildContext, Generation};
use super::level::{Level, LevelTable, Role, TAG_RANK};
use super::message::Message;
use super::metrics::DispatchMetrics;
use super::record::{Ack, Completion, FanOut, Record};
use super::scope::{Frame, ScopeChain, Value};
use super::transport::{Transport, TransportContext, TransportRegistry};
use crate::format::{CompiledFormat, Formatter, Formatters, PatternCache, TemplateCache};
use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

/// Per-call options
#[derive(Default)]
pub struct LogOptions {
    vars: Vec<Arc<Frame>>,
    callback: Option<Completion>,
}

impl LogOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a frame of caller variables; later frames take precedence
    #[must_use]
    pub fn with_vars(mut self, vars: Frame) -> Self {
        self.vars.push(Arc::new(vars));
        self
    }

    #[must_use]
    pub fn with_shared_vars(mut self, vars: Arc<Frame>) -> Self {
        self.vars.push(vars);
        self
    }

    /// Callback run once every selected route has answered
    #[must_use]
    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }
}

impl fmt::Debug for LogOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogOptions")
            .field("vars", &self.vars.len())
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

struct EngineInner {
    generation: ArcSwap<Generation>,
    channels: RwLock<Vec<Weak<ChannelState>>>,
    transports: TransportRegistry,
    templates: Arc<TemplateCache>,
    function_formats: HashMap<String, CompiledFormat>,
    extra_vars: Frame,
    metrics: Arc<DispatchMetrics>,
    modules: bool,
    role: Role,
    worker_id: u32,
    started: Instant,
    next_id: AtomicU64,
    reload_lock: Mutex<()>,
    closed: AtomicBool,
}

impl EngineInner {
    fn build_generation(&self, config: &Config, previous: Option<&Generation>) -> Result<Generation> {
        Generation::build(
            config,
            BuildContext {
                id: self.next_id.fetch_add(1, Ordering::Relaxed),
                channel_mode: self.modules,
                role: self.role,
                worker_id: self.worker_id,
                started: self.started,
                templates: &self.templates,
                function_formats: &self.function_formats,
                extra_vars: &self.extra_vars,
                transports: &self.transports,
                previous,
            },
        )
    }
}

/// Builder for [`Engine`]
#[must_use]
pub struct EngineBuilder {
    config: Config,
    transports: TransportRegistry,
    formatters: Formatters,
    function_formats: HashMap<String, CompiledFormat>,
    extra_vars: Frame,
    role: Role,
    worker_id: u32,
}

impl EngineBuilder {
    pub fn new(config: Config) -> Self {
        let patterns = Arc::new(PatternCache::new());
        Self {
            config,
            transports: TransportRegistry::with_builtins(),
            formatters: Formatters::with_builtins(patterns),
            function_formats: HashMap::new(),
            extra_vars: Frame::new(),
            role: Role::Master,
            worker_id: 0,
        }
    }

    /// Add a format implemented by a function instead of template text
    pub fn format_fn<F>(mut self, name: impl Into<String>, format: F) -> Self
    where
        F: Fn(&ScopeChain) -> String + Send + Sync + 'static,
    {
        self.function_formats
            .insert(name.into(), CompiledFormat::function(format));
        self
    }

    /// Add a process-wide variable, overriding configured ones
    pub fn variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra_vars.insert(name, value);
        self
    }

    /// Add a formatter usable as a template pipe stage
    pub fn formatter<F>(mut self, name: impl Into<String>, formatter: F) -> Self
    where
        F: Formatter + 'static,
    {
        self.formatters.register(name, formatter);
        self
    }

    /// Add a transport factory
    pub fn transport<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&TransportContext, &RouteSpec, Option<Arc<dyn Transport>>) -> Result<Arc<dyn Transport>>
            + Send
            + Sync
            + 'static,
    {
        self.transports.register(name, factory);
        self
    }

    /// Cluster role of this process; `worker_id` is ignored for the master
    pub fn role(mut self, role: Role, worker_id: u32) -> Self {
        self.role = role;
        self.worker_id = worker_id;
        self
    }

    pub fn build(self) -> Result<Engine> {
        let templates = Arc::new(TemplateCache::new(Arc::new(self.formatters)));
        let worker_id = match self.role {
            Role::Master => 0,
            Role::Worker => self.worker_id,
        };
        let started = Instant::now();
        let generation = Generation::build(
            &self.config,
            BuildContext {
                id: 1,
                channel_mode: self.config.modules,
                role: self.role,
                worker_id,
                started,
                templates: &templates,
                function_formats: &self.function_formats,
                extra_vars: &self.extra_vars,
                transports: &self.transports,
                previous: None,
            },
        )?;

        Ok(Engine {
            inner: Arc::new(EngineInner {
                generation: ArcSwap::from_pointee(generation),
                channels: RwLock::new(Vec::new()),
                transports: self.transports,
                templates,
                function_formats: self.function_formats,
                extra_vars: self.extra_vars,
                metrics: Arc::new(DispatchMetrics::new()),
                modules: self.config.modules,
                role: self.role,
                worker_id,
                started,
                next_id: AtomicU64::new(2),
                reload_lock: Mutex::new(()),
                closed: AtomicBool::new(false),
            }),
        })
    }
}

impl fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("config", &self.config)
            .field("transports", &self.transports)
            .field("formatters", &self.formatters)
            .field("role", &self.role)
            .finish()
    }
}

/// Configurable routing log engine
///
/// Cheap to clone; clones share the same generation, channels and metrics.
///
/// # Example
///
/// ```no_run
/// use rust_route_logger::prelude::*;
///
/// let config = Config::from_json_str(r#"{"level": "debug"}"#)?;
/// let engine = Engine::new(config)?;
/// engine.log("info", "service started", LogOptions::new());
/// # Ok::<(), rust_route_logger::LoggerError>(())
/// ```
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Engine with the built-in transports and formatters
    pub fn new(config: Config) -> Result<Self> {
        EngineBuilder::new(config).build()
    }

    pub fn builder(config: Config) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// Replace the configuration.
    ///
    /// On error the running generation stays in place untouched. Channel
    /// mode cannot change on reload.
    pub fn reload(&self, config: &Config) -> Result<()> {
        let _guard = self.inner.reload_lock.lock();
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(LoggerError::other("Engine is shut down"));
        }
        if config.modules != self.inner.modules {
            return Err(LoggerError::config(
                "modules",
                "Option 'modules' cannot change once the engine is running",
            ));
        }

        let previous = self.inner.generation.load_full();
        let generation = Arc::new(self.inner.build_generation(config, Some(previous.as_ref()))?);
        self.inner.generation.store(Arc::clone(&generation));
        drop(previous);

        let mut channels = self.inner.channels.write();
        channels.retain(|weak| match weak.upgrade() {
            Some(state) => {
                state.recalc(&generation);
                true
            }
            None => false,
        });
        self.inner.metrics.record_reload();
        Ok(())
    }

    /// Log without a channel
    ///
    /// Problems with the call itself (unknown level, empty argument list)
    /// are reported to the completion callback, never returned.
    ///
    /// # Panics
    ///
    /// Panics when channel mode is on; log through a [`Channel`] instead.
    pub fn log(&self, level: impl Into<Level>, message: impl Into<Message>, options: LogOptions) {
        self.dispatch_level(level.into(), message.into(), options, None);
    }

    /// Send to the routes bound to `tags`, bypassing level filtering.
    ///
    /// The completion callback runs once for all tags together.
    pub fn tag<I, S>(&self, tags: I, message: impl Into<Message>, options: LogOptions)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.dispatch_tags(tags, message.into(), options, None);
    }

    /// Render every format listed for `event` and send it to its route
    pub fn emit(&self, event: &str, options: LogOptions) {
        let generation = self.inner.generation.load_full();
        let LogOptions { vars, callback } = options;
        if self.is_shut_down() {
            return self.reject(LoggerError::other("Engine is shut down"), callback);
        }

        let local = Frame::new()
            .with("event", event)
            .with("level#", TAG_RANK);
        let chain = Arc::new(self.chain(&generation, None, vars, local));

        let mut deliveries = Vec::new();
        for route in &generation.routes {
            for name in generation.event_formats(route, event).unwrap_or_default() {
                if let Some(format) = generation.formats.get(name) {
                    deliveries.push((Arc::clone(route), format.clone()));
                }
            }
        }

        self.inner.metrics.record_accepted();
        if deliveries.is_empty() {
            self.inner.metrics.record_unrouted();
        }
        let fanout = FanOut::new(
            deliveries.len(),
            callback,
            Some(Arc::clone(&self.inner.metrics)),
        );
        for (route, format) in deliveries {
            let ack = Ack::new(route.name.clone(), Arc::clone(&fanout));
            let lang = generation.lang_for(&route).to_string();
            let chain = Arc::clone(&chain);
            let result = catch_unwind(AssertUnwindSafe(move || {
                let record = Record {
                    text: format.render(&chain),
                    level: None,
                    level_name: None,
                    tag: None,
                    route: route.name.clone(),
                    lang,
                    chain,
                };
                route.transport.out(record, ack);
            }));
            if result.is_err() {
                eprintln!("[LOGGER ERROR] Route panicked while handling event '{}'", event);
            }
        }
    }

    /// Register a channel for `module`
    pub fn channel(&self, module: &str) -> Result<Channel> {
        self.register_channel(module, None)
    }

    /// Register a channel for `module` labelled `shown_as`
    pub fn channel_as(&self, module: &str, shown_as: &str) -> Result<Channel> {
        self.register_channel(module, Some(shown_as))
    }

    fn register_channel(&self, module: &str, shown_as: Option<&str>) -> Result<Channel> {
        if !self.inner.modules {
            return Err(LoggerError::ChannelsDisabled);
        }
        let generation = self.inner.generation.load_full();
        let state = Arc::new(ChannelState::new(module, shown_as, &generation));
        self.inner.channels.write().push(Arc::downgrade(&state));
        Ok(Channel::new(self.clone(), state))
    }

    /// Message `key` in the language of `route`, or the global language
    pub fn translate(&self, route: Option<&str>, key: &str) -> Option<String> {
        let generation = self.inner.generation.load_full();
        let lang = match route.and_then(|name| generation.route(name)) {
            Some(route) => generation.lang_for(route),
            None => &generation.lang,
        };
        generation.catalog.lookup(lang, key).map(str::to_string)
    }

    /// Release every transport; later calls are rejected
    pub fn shutdown(&self) {
        let _guard = self.inner.reload_lock.lock();
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            self.inner.generation.load().free_transports();
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn metrics(&self) -> &DispatchMetrics {
        &self.inner.metrics
    }

    /// Live configuration generation
    pub fn generation(&self) -> Arc<Generation> {
        self.inner.generation.load_full()
    }

    pub fn levels(&self) -> LevelTable {
        self.inner.generation.load().levels.clone()
    }

    pub fn route_names(&self) -> Vec<String> {
        self.inner
            .generation
            .load()
            .routes
            .iter()
            .map(|route| route.name.clone())
            .collect()
    }

    pub fn modules(&self) -> bool {
        self.inner.modules
    }

    pub fn role(&self) -> Role {
        self.inner.role
    }

    /// Log and wait for every selected route to answer
    ///
    /// Any callback set on `options` is replaced.
    #[cfg(feature = "async-dispatch")]
    pub async fn log_async(
        &self,
        level: impl Into<Level>,
        message: impl Into<Message>,
        options: LogOptions,
    ) -> Result<()> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let options = options.on_complete(move |result| {
            let _ = tx.send(result);
        });
        self.log(level, message, options);
        rx.await
            .unwrap_or_else(|_| Err(LoggerError::other("Completion was dropped")))
    }

    pub(crate) fn dispatch_level(
        &self,
        level: Level,
        message: Message,
        options: LogOptions,
        channel: Option<&Arc<ChannelState>>,
    ) {
        let generation = self.inner.generation.load_full();
        if generation.channel_mode && channel.is_none() {
            panic!("Channel is required when modules are enabled");
        }
        let LogOptions { vars, callback } = options;
        if self.is_shut_down() {
            return self.reject(LoggerError::other("Engine is shut down"), callback);
        }

        let rank = match generation.levels.resolve(&level) {
            Ok(rank) => rank,
            Err(err) => return self.reject(err, callback),
        };
        let text = match message.render() {
            Ok(text) => text,
            Err(err) => return self.reject(err, callback),
        };

        let routes: Vec<usize> = match channel {
            Some(state) if generation.channel_mode => state.table_for(&generation).select(rank),
            _ => generation.flat_route(rank).into_iter().collect(),
        };

        let level_name = generation.levels.name(rank).map(str::to_string);
        let mut local = Frame::new().with("level#", rank as i64).with("msg", text);
        if let Some(name) = &level_name {
            local.insert("level", name.as_str());
        }
        let chain = Arc::new(self.chain(&generation, channel, vars, local));

        self.inner.metrics.record_accepted();
        if routes.is_empty() {
            self.inner.metrics.record_unrouted();
        }
        let fanout = FanOut::new(routes.len(), callback, Some(Arc::clone(&self.inner.metrics)));
        for idx in routes {
            self.deliver(
                &generation,
                idx,
                &chain,
                &fanout,
                Some(rank),
                level_name.clone(),
                None,
            );
        }
    }

    pub(crate) fn dispatch_tags<I, S>(
        &self,
        tags: I,
        message: Message,
        options: LogOptions,
        channel: Option<&Arc<ChannelState>>,
    ) where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let generation = self.inner.generation.load_full();
        let LogOptions { vars, callback } = options;
        if self.is_shut_down() {
            return self.reject(LoggerError::other("Engine is shut down"), callback);
        }
        let text = match message.render() {
            Ok(text) => text,
            Err(err) => return self.reject(err, callback),
        };

        let tagged: Vec<(String, Vec<usize>)> = tags
            .into_iter()
            .map(|tag| {
                let tag = tag.as_ref();
                (tag.to_string(), generation.tagged(tag).to_vec())
            })
            .filter(|(_, routes)| !routes.is_empty())
            .collect();
        let count = tagged.iter().map(|(_, routes)| routes.len()).sum();

        self.inner.metrics.record_accepted();
        if count == 0 {
            self.inner.metrics.record_unrouted();
        }
        let fanout = FanOut::new(count, callback, Some(Arc::clone(&self.inner.metrics)));
        for (tag, routes) in tagged {
            let local = Frame::new()
                .with("level#", TAG_RANK)
                .with("tag", tag.as_str())
                .with("msg", text.as_str());
            let chain = Arc::new(self.chain(&generation, channel, vars.clone(), local));
            for idx in routes {
                self.deliver(&generation, idx, &chain, &fanout, None, None, Some(tag.clone()));
            }
        }
    }

    /// Process, channel, caller and call frames, least specific first
    fn chain(
        &self,
        generation: &Generation,
        channel: Option<&Arc<ChannelState>>,
        vars: Vec<Arc<Frame>>,
        local: Frame,
    ) -> ScopeChain {
        let mut chain = ScopeChain::new();
        chain.push(Arc::clone(&generation.variables));
        if let Some(state) = channel {
            chain.push(Arc::clone(state.frame()));
        }
        for frame in vars {
            chain.push(frame);
        }
        chain.push(Arc::new(local));
        chain
    }

    #[allow(clippy::too_many_arguments)]
    fn deliver(
        &self,
        generation: &Generation,
        idx: usize,
        chain: &Arc<ScopeChain>,
        fanout: &Arc<FanOut>,
        level: Option<usize>,
        level_name: Option<String>,
        tag: Option<String>,
    ) {
        let Some(route) = generation.routes.get(idx) else {
            return;
        };
        let ack = Ack::new(route.name.clone(), Arc::clone(fanout));
        let format = generation.format_for(route);
        let lang = generation.lang_for(route).to_string();
        let chain = Arc::clone(chain);

        // a panic drops the ack, which reports the route as abandoned
        let result = catch_unwind(AssertUnwindSafe(|| {
            let text = format.map(|f| f.render(&chain)).unwrap_or_default();
            let record = Record {
                text,
                level,
                level_name,
                tag,
                route: route.name.clone(),
                lang,
                chain,
            };
            route.transport.out(record, ack);
        }));
        if result.is_err() {
            eprintln!("[LOGGER ERROR] Route '{}' panicked during delivery", route.name);
        }
    }

    fn reject(&self, err: LoggerError, callback: Option<Completion>) {
        self.inner.metrics.record_rejected();
        if let Some(callback) = callback {
            callback(Err(err));
        }
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("generation", &*self.inner.generation.load())
            .field("modules", &self.inner.modules)
            .field("role", &self.inner.role)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    type Captured = Arc<parking_lot::Mutex<Vec<Record>>>;

    struct Capture {
        records: Captured,
        fail: bool,
    }

    impl Transport for Capture {
        fn kind(&self) -> &str {
            "capture"
        }
        fn out(&self, record: Record, ack: Ack) {
            let route = record.route.clone();
            self.records.lock().push(record);
            if self.fail {
                ack.fail(LoggerError::transport(route, "refused"));
            } else {
                ack.ok();
            }
        }
    }

    struct Panicky;

    impl Transport for Panicky {
        fn kind(&self) -> &str {
            "panicky"
        }
        fn out(&self, _record: Record, _ack: Ack) {
            panic!("transport exploded");
        }
    }

    fn engine(json: &str) -> (Engine, Captured) {
        let records: Captured = Arc::default();
        let sink = Arc::clone(&records);
        let engine = EngineBuilder::new(Config::from_json_str(json).unwrap())
            .transport("capture", move |_ctx: &TransportContext, spec: &RouteSpec, _prev| {
                Ok(Arc::new(Capture {
                    records: Arc::clone(&sink),
                    fail: spec.option_bool("fail") == Some(true),
                }) as Arc<dyn Transport>)
            })
            .transport("panicky", |_ctx: &TransportContext, _spec: &RouteSpec, _prev| {
                Ok(Arc::new(Panicky) as Arc<dyn Transport>)
            })
            .build()
            .unwrap();
        (engine, records)
    }

    fn completion() -> (LogOptions, mpsc::Receiver<Result<()>>) {
        let (tx, rx) = mpsc::channel();
        let options = LogOptions::new().on_complete(move |result| {
            let _ = tx.send(result);
        });
        (options, rx)
    }

    #[test]
    fn test_flat_mode_delivers_to_one_route() {
        let (engine, records) = engine(
            r#"{"formats": {"plain": "${level}:${msg}"}, "format": "plain", "routes": [
                {"name": "all", "transport": "capture", "level": "debug"},
                {"name": "errors", "transport": "capture", "level": "error"}
            ]}"#,
        );
        engine.log("info", "hello", LogOptions::new());
        engine.log("crit", "boom", LogOptions::new());

        let records = records.lock();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].route, "all");
        assert_eq!(records[0].text, "info:hello");
        assert_eq!(records[1].route, "errors");
        assert_eq!(records[1].text, "crit:boom");
        assert_eq!(records[1].level, Some(4));
    }

    #[test]
    fn test_invalid_calls_reach_callback() {
        let (engine, records) = engine(r#"{"routes": [{"transport": "capture"}]}"#);

        let (options, rx) = completion();
        engine.log("loud", "x", options);
        assert!(matches!(rx.try_recv().unwrap(), Err(LoggerError::InvalidCall(_))));

        let (options, rx) = completion();
        engine.log(9usize, "x", options);
        assert!(matches!(rx.try_recv().unwrap(), Err(LoggerError::InvalidCall(_))));

        let (options, rx) = completion();
        engine.log("info", Message::Format(Vec::new()), options);
        assert!(matches!(rx.try_recv().unwrap(), Err(LoggerError::InvalidCall(_))));

        assert!(records.lock().is_empty());
        assert_eq!(engine.metrics().rejected(), 3);
    }

    #[test]
    fn test_unrouted_call_completes_ok() {
        let (engine, _records) =
            engine(r#"{"routes": [{"transport": "capture", "level": "error"}]}"#);
        let (options, rx) = completion();
        engine.log("debug", "quiet", options);
        assert!(rx.try_recv().unwrap().is_ok());
        assert_eq!(engine.metrics().unrouted(), 1);
    }

    #[test]
    #[should_panic(expected = "Channel is required")]
    fn test_channel_required_in_module_mode() {
        let (engine, _records) =
            engine(r#"{"modules": true, "routes": [{"transport": "capture"}]}"#);
        engine.log("info", "no channel", LogOptions::new());
    }

    #[test]
    fn test_channels_disabled_in_flat_mode() {
        let (engine, _records) = engine(r#"{"routes": [{"transport": "capture"}]}"#);
        assert!(matches!(
            engine.channel("http"),
            Err(LoggerError::ChannelsDisabled)
        ));
    }

    #[test]
    fn test_scope_precedence() {
        let (engine, records) = engine(
            r#"{"modules": true, "variables": {"app": "config"},
                "formats": {"vars": "${app}/${module}/${who}/${msg}"}, "format": "vars",
                "routes": [{"transport": "capture"}]}"#,
        );
        let channel = engine.channel("billing").unwrap();
        channel.log(
            "info",
            "paid",
            LogOptions::new()
                .with_vars(Frame::new().with("who", "alice").with("app", "caller"))
                .with_vars(Frame::new().with("msg", "shadowed")),
        );
        assert_eq!(records.lock()[0].text, "caller/billing/alice/paid");
    }

    #[test]
    fn test_tags_share_one_callback() {
        let (engine, records) = engine(
            r#"{"formats": {"t": "${tag}:${msg}:${level#}"}, "format": "t", "routes": [
                {"name": "a", "transport": "capture", "level": "crit", "tags": ["audit"]},
                {"name": "b", "transport": "capture", "tags": ["audit", "ops"], "fail": true}
            ]}"#,
        );
        let (options, rx) = completion();
        engine.tag(["audit", "ops", "unknown"], "login", options);

        let result = rx.try_recv().unwrap();
        match result {
            Err(LoggerError::Multiple(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected two failures, got {:?}", other),
        }
        assert!(rx.try_recv().is_err());

        let records = records.lock();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].text, "audit:login:-1");
        assert_eq!(records[2].text, "ops:login:-1");
        assert_eq!(records[2].tag.as_deref(), Some("ops"));
        assert_eq!(records[0].level, None);
    }

    #[test]
    fn test_panicking_transport_does_not_stop_siblings() {
        let (engine, records) = engine(
            r#"{"routes": [
                {"name": "bad", "transport": "panicky", "tags": ["t"]},
                {"name": "good", "transport": "capture", "tags": ["t"]}
            ]}"#,
        );
        let (options, rx) = completion();
        engine.tag(["t"], "still delivered", options);

        assert_eq!(records.lock().len(), 1);
        assert!(matches!(
            rx.try_recv().unwrap(),
            Err(LoggerError::RouteAbandoned { .. })
        ));
        assert_eq!(engine.metrics().failed(), 1);
        assert_eq!(engine.metrics().delivered(), 1);
    }

    #[test]
    fn test_emit_uses_route_events() {
        let (engine, records) = engine(
            r#"{"formats": {"start-message": "up ${event}", "bye": "down"},
                "routes": [
                    {"name": "a", "transport": "capture"},
                    {"name": "b", "transport": "capture", "events": {"start": [], "stop": "bye"}}
                ]}"#,
        );
        engine.emit("start", LogOptions::new());
        engine.emit("stop", LogOptions::new());

        let records = records.lock();
        let texts: Vec<(&str, &str)> = records
            .iter()
            .map(|r| (r.route.as_str(), r.text.as_str()))
            .collect();
        assert_eq!(texts, vec![("a", "up start"), ("b", "down")]);
    }

    #[test]
    fn test_translate() {
        let (engine, _records) = engine(
            r#"{"messages": {"default": {"hi": "Hello"}, "fr": {"hi": "Bonjour"}, "fr-CA": "fr"},
                "routes": [
                    {"name": "en", "transport": "capture"},
                    {"name": "quebec", "transport": "capture", "lang": "fr-CA"}
                ]}"#,
        );
        assert_eq!(engine.translate(None, "hi").as_deref(), Some("Hello"));
        assert_eq!(engine.translate(Some("en"), "hi").as_deref(), Some("Hello"));
        assert_eq!(engine.translate(Some("quebec"), "hi").as_deref(), Some("Bonjour"));
        assert_eq!(engine.translate(Some("quebec"), "bye"), None);
    }

    #[test]
    fn test_reload_rejects_bad_config_and_keeps_running() {
        let (engine, records) = engine(r#"{"routes": [{"name": "one", "transport": "capture"}]}"#);
        let before = engine.generation().id();

        let bad = Config::from_json_str(r#"{"level": "loud"}"#).unwrap();
        assert!(engine.reload(&bad).is_err());
        let modules = Config::from_json_str(r#"{"modules": true}"#).unwrap();
        assert!(engine.reload(&modules).is_err());
        assert_eq!(engine.generation().id(), before);

        let good = Config::from_json_str(
            r#"{"routes": [{"name": "two", "transport": "capture"}]}"#,
        )
        .unwrap();
        engine.reload(&good).unwrap();
        assert!(engine.generation().id() > before);
        assert_eq!(engine.route_names(), vec!["two".to_string()]);
        assert_eq!(engine.metrics().reloads(), 1);

        engine.log("info", "after", LogOptions::new());
        assert_eq!(records.lock()[0].route, "two");
    }

    #[test]
    fn test_shutdown_rejects_later_calls() {
        let (engine, records) = engine(r#"{"routes": [{"transport": "capture"}]}"#);
        engine.shutdown();
        assert!(engine.is_shut_down());

        let (options, rx) = completion();
        engine.log("info", "late", options);
        assert!(rx.try_recv().unwrap().is_err());
        assert!(records.lock().is_empty());
        assert!(engine.reload(&Config::default()).is_err());
    }

    #[test]
    fn test_function_formats_and_formatters() {
        let records: Captured = Arc::default();
        let sink = Arc::clone(&records);
        let engine = EngineBuilder::new(
            Config::from_json_str(
                r#"{"formats": {"loud": "${msg|upper}"}, "routes": [
                    {"name": "a", "transport": "capture", "format": "loud", "tags": ["x"]},
                    {"name": "b", "transport": "capture", "format": "reversed", "tags": ["x"]}
                ]}"#,
            )
            .unwrap(),
        )
        .format_fn("reversed", |chain: &ScopeChain| {
            chain
                .resolve("msg")
                .map(|m| m.to_string().chars().rev().collect())
                .unwrap_or_default()
        })
        .formatter("upper", |value: Value, _args: &crate::format::ArgMap| {
            Some(Value::from(value.to_string().to_uppercase()))
        })
        .transport("capture", move |_ctx: &TransportContext, _spec: &RouteSpec, _prev| {
            Ok(Arc::new(Capture {
                records: Arc::clone(&sink),
                fail: false,
            }) as Arc<dyn Transport>)
        })
        .variable("host", "test-box")
        .build()
        .unwrap();

        engine.tag(["x"], "abc", LogOptions::new());
        let records = records.lock();
        assert_eq!(records[0].text, "ABC");
        assert_eq!(records[1].text, "cba");
        assert_eq!(
            records[0].chain.resolve("host"),
            Some(&Value::from("test-box"))
        );
    }
}
