//! Configuration generations
//!
//! A generation is everything derived from one configuration: level table,
//! compiled formats, filters, routes and their transports. It is built
//! completely before it becomes visible and never changes afterwards; a
//! reload builds a new one and swaps it in.

use super::catalog::Catalog;
use super::config::{build_events, optional_rules, Config, RouteSpec, START_MESSAGE_FORMAT};
use super::error::{LoggerError, Result};
use super::level::{
    name_pair, LevelTable, Policy, Role, DEFAULT_POLICIES, DEFAULT_ROLES,
};
use super::rules::{GlobalFilter, RouteFilter};
use super::scope::Frame;
use super::transport::{Transport, TransportContext, TransportRegistry};
use super::variables::{process_frame, ProcessInfo};
use crate::format::{json_format, CompiledFormat, TemplateCache, DEFAULT_FORMAT, TEXT_FORMAT};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A configured destination
pub struct Route {
    pub(crate) name: String,
    pub(crate) filter: RouteFilter,
    pub(crate) format: Option<String>,
    pub(crate) lang: Option<String>,
    pub(crate) events: Option<BTreeMap<String, Vec<String>>>,
    pub(crate) tags: Vec<String>,
    pub(crate) transport: Arc<dyn Transport>,
}

impl Route {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("name", &self.name)
            .field("transport", &self.transport.kind())
            .field("filter", &self.filter)
            .field("format", &self.format)
            .field("tags", &self.tags)
            .finish()
    }
}

/// Inputs of a generation that do not come from the configuration
pub(crate) struct BuildContext<'a> {
    pub id: u64,
    pub channel_mode: bool,
    pub role: Role,
    pub worker_id: u32,
    pub started: Instant,
    pub templates: &'a Arc<TemplateCache>,
    pub function_formats: &'a HashMap<String, CompiledFormat>,
    pub extra_vars: &'a Frame,
    pub transports: &'a TransportRegistry,
    pub previous: Option<&'a Generation>,
}

pub struct Generation {
    pub(crate) id: u64,
    pub(crate) name: Option<String>,
    pub(crate) levels: LevelTable,
    pub(crate) channel_mode: bool,
    pub(crate) role: Role,
    pub(crate) role_requirement: Option<Role>,
    pub(crate) filter: GlobalFilter,
    pub(crate) formats: HashMap<String, CompiledFormat>,
    pub(crate) default_format: String,
    pub(crate) lang: String,
    pub(crate) catalog: Catalog,
    pub(crate) events: BTreeMap<String, Vec<String>>,
    pub(crate) routes: Vec<Arc<Route>>,
    pub(crate) tags: HashMap<String, Vec<usize>>,
    pub(crate) variables: Arc<Frame>,
    freed: AtomicBool,
}

impl Generation {
    pub(crate) fn build(config: &Config, ctx: BuildContext<'_>) -> Result<Self> {
        let levels = match &config.levels {
            Some(names) => LevelTable::new(names)?,
            None => LevelTable::default(),
        };
        let role_names = name_pair("roles", config.roles.as_ref(), DEFAULT_ROLES)?;
        let policy_names = name_pair("policies", config.policies.as_ref(), DEFAULT_POLICIES)?;
        let catalog = Catalog::new(config.messages.as_ref())?;

        let info = ProcessInfo {
            role: ctx.role,
            role_names: role_names.clone(),
            worker_id: ctx.worker_id,
            started: ctx.started,
        };
        let variables = Arc::new(process_frame(&info, &config.variables, ctx.extra_vars));

        let role_requirement = match &config.role {
            Some(role) => Role::requirement(&role_names, role)?,
            None => None,
        };
        let floor = config
            .level
            .as_deref()
            .map(|name| levels.config_rank(name))
            .transpose()?;
        let lang = catalog.require(config.lang.as_deref().unwrap_or_default())?;

        let mut formats: HashMap<String, CompiledFormat> = HashMap::new();
        formats.insert(
            DEFAULT_FORMAT.to_string(),
            CompiledFormat::Template(ctx.templates.get_or_compile(TEXT_FORMAT)?),
        );
        formats.insert("json".to_string(), json_format());
        for (name, source) in &config.formats {
            let template = ctx.templates.get_or_compile(source)?;
            formats.insert(name.trim().to_string(), CompiledFormat::Template(template));
        }
        for (name, format) in ctx.function_formats {
            formats.insert(name.clone(), format.clone());
        }

        let default_format = config
            .format
            .clone()
            .unwrap_or_else(|| DEFAULT_FORMAT.to_string());
        if !formats.contains_key(&default_format) {
            return Err(LoggerError::config(
                "format",
                format!("Cannot find format '{}'", default_format),
            ));
        }

        // global policy and rules only matter to channels
        let mut filter = GlobalFilter {
            floor,
            ..GlobalFilter::default()
        };
        if ctx.channel_mode {
            if let Some(policy) = &config.policy {
                filter.policy = Policy::from_names(&policy_names, policy)?;
            }
            filter.include = optional_rules(&levels, "include", config.include.as_ref())?
                .unwrap_or_default();
            filter.exclude = optional_rules(&levels, "exclude", config.exclude.as_ref())?
                .unwrap_or_default();
        }

        let events = match &config.events {
            Some(events) => build_events(events, |f| formats.contains_key(f))?,
            None if formats.contains_key(START_MESSAGE_FORMAT) => BTreeMap::from([(
                "start".to_string(),
                vec![START_MESSAGE_FORMAT.to_string()],
            )]),
            None => BTreeMap::new(),
        };

        let transport_ctx = TransportContext::new(
            levels.clone(),
            Arc::clone(&variables),
            Arc::clone(ctx.templates),
            ctx.role,
        );

        let mut generation = Self {
            id: ctx.id,
            name: config.name.clone(),
            levels,
            channel_mode: ctx.channel_mode,
            role: ctx.role,
            role_requirement,
            filter,
            formats,
            default_format,
            lang,
            catalog,
            events,
            routes: Vec::new(),
            tags: HashMap::new(),
            variables,
            freed: AtomicBool::new(false),
        };

        for spec in config.effective_routes()? {
            let route = generation
                .build_route(&spec, &policy_names, &transport_ctx, &ctx)
                .map_err(|e| e.in_route(spec.name()));
            match route {
                Ok(route) => {
                    let idx = generation.routes.len();
                    for tag in &route.tags {
                        generation.tags.entry(tag.clone()).or_default().push(idx);
                    }
                    generation.routes.push(Arc::new(route));
                }
                Err(err) => {
                    generation.free_transports();
                    return Err(err);
                }
            }
        }
        Ok(generation)
    }

    fn build_route(
        &self,
        spec: &RouteSpec,
        policy_names: &[String; 2],
        transport_ctx: &TransportContext,
        ctx: &BuildContext<'_>,
    ) -> Result<Route> {
        let levels = &self.levels;
        let filter = RouteFilter {
            level: spec
                .level
                .as_deref()
                .map(|name| levels.config_rank(name))
                .transpose()?,
            policy: spec
                .policy
                .as_deref()
                .map(|name| Policy::from_names(policy_names, name))
                .transpose()?,
            include: optional_rules(levels, "include", spec.include.as_ref())?,
            include_extra: optional_rules(levels, "include+", spec.include_extra.as_ref())?
                .unwrap_or_default(),
            exclude: optional_rules(levels, "exclude", spec.exclude.as_ref())?,
            exclude_extra: optional_rules(levels, "exclude+", spec.exclude_extra.as_ref())?
                .unwrap_or_default(),
        };

        if let Some(format) = &spec.format {
            if !self.formats.contains_key(format) {
                return Err(LoggerError::config(
                    "format",
                    format!("Cannot find format '{}'", format),
                ));
            }
        }
        let lang = spec
            .lang
            .as_deref()
            .map(|lang| self.catalog.require(lang))
            .transpose()?;
        let events = spec
            .events
            .as_ref()
            .map(|events| build_events(events, |f| self.formats.contains_key(f)))
            .transpose()?;

        let previous = ctx
            .previous
            .and_then(|generation| generation.route(spec.name()))
            .map(|route| Arc::clone(&route.transport));
        let transport = ctx.transports.create(transport_ctx, spec, previous)?;

        Ok(Route {
            name: spec.name().to_string(),
            filter,
            format: spec.format.clone(),
            lang,
            events,
            tags: spec.tags.clone(),
            transport,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn levels(&self) -> &LevelTable {
        &self.levels
    }

    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    pub fn route(&self, name: &str) -> Option<&Arc<Route>> {
        self.routes.iter().find(|route| route.name == name)
    }

    /// Format a route renders with: its own, else the default one
    pub(crate) fn format_for(&self, route: &Route) -> Option<&CompiledFormat> {
        let name = route.format.as_deref().unwrap_or(&self.default_format);
        self.formats.get(name)
    }

    /// Language a route reads its messages in
    pub(crate) fn lang_for<'a>(&'a self, route: &'a Route) -> &'a str {
        route.lang.as_deref().unwrap_or(&self.lang)
    }

    /// Format names listed for `event` on a route
    pub(crate) fn event_formats<'a>(&'a self, route: &'a Route, event: &str) -> Option<&'a [String]> {
        route
            .events
            .as_ref()
            .unwrap_or(&self.events)
            .get(event)
            .map(Vec::as_slice)
    }

    /// Routes bound to a tag, in configuration order
    pub(crate) fn tagged(&self, tag: &str) -> &[usize] {
        self.tags.get(tag).map(Vec::as_slice).unwrap_or_default()
    }

    /// The single route receiving `rank` when channels are off.
    ///
    /// Routes configured below the global level never qualify. Among the
    /// routes admitting `rank`, the one with the highest level wins and
    /// the later route wins a tie.
    pub(crate) fn flat_route(&self, rank: usize) -> Option<usize> {
        let floor = self.filter.floor.unwrap_or(0);
        let mut best: Option<(usize, usize)> = None;
        for (idx, route) in self.routes.iter().enumerate() {
            let level = route.filter.base_level(&self.filter);
            if level < floor || level > rank {
                continue;
            }
            if best.map_or(true, |(_, best_level)| level >= best_level) {
                best = Some((idx, level));
            }
        }
        best.map(|(idx, _)| idx)
    }

    /// Release every transport of this generation; later calls do nothing
    pub(crate) fn free_transports(&self) {
        if self.freed.swap(true, Ordering::AcqRel) {
            return;
        }
        for route in &self.routes {
            let result = catch_unwind(AssertUnwindSafe(|| route.transport.free()));
            if result.is_err() {
                eprintln!(
                    "[LOGGER ERROR] Route '{}' panicked while releasing its transport",
                    route.name
                );
            }
        }
    }
}

impl Drop for Generation {
    fn drop(&mut self) {
        self.free_transports();
    }
}

impl fmt::Debug for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Generation")
            .field("id", &self.id)
            .field("levels", &self.levels)
            .field("channel_mode", &self.channel_mode)
            .field("routes", &self.routes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::{Ack, Record};
    use crate::format::{Formatters, PatternCache};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Probe {
        freed: Mutex<usize>,
    }

    impl Transport for Probe {
        fn kind(&self) -> &str {
            "probe"
        }
        fn out(&self, _record: Record, ack: Ack) {
            ack.ok();
        }
        fn free(&self) {
            *self.freed.lock() += 1;
        }
    }

    struct Fixture {
        templates: Arc<TemplateCache>,
        functions: HashMap<String, CompiledFormat>,
        extra: Frame,
        transports: TransportRegistry,
        created: Arc<Mutex<Vec<Arc<Probe>>>>,
    }

    impl Fixture {
        fn new() -> Self {
            let created: Arc<Mutex<Vec<Arc<Probe>>>> = Arc::default();
            let mut transports = TransportRegistry::new();
            let sink = Arc::clone(&created);
            transports.register("probe", move |_ctx: &TransportContext, spec: &RouteSpec, _prev| {
                if spec.option_bool("broken") == Some(true) {
                    return Err(LoggerError::config("probe", "broken on purpose"));
                }
                let probe = Arc::new(Probe::default());
                sink.lock().push(Arc::clone(&probe));
                Ok(probe as Arc<dyn Transport>)
            });
            let formatters = Arc::new(Formatters::with_builtins(Arc::new(PatternCache::new())));
            Self {
                templates: Arc::new(TemplateCache::new(formatters)),
                functions: HashMap::new(),
                extra: Frame::new(),
                transports,
                created,
            }
        }

        fn build(&self, json: &str, channel_mode: bool) -> Result<Generation> {
            let config = Config::from_json_str(json)?;
            Generation::build(
                &config,
                BuildContext {
                    id: 1,
                    channel_mode,
                    role: Role::Master,
                    worker_id: 0,
                    started: Instant::now(),
                    templates: &self.templates,
                    function_formats: &self.functions,
                    extra_vars: &self.extra,
                    transports: &self.transports,
                    previous: None,
                },
            )
        }
    }

    #[test]
    fn test_defaults() {
        let fixture = Fixture::new();
        let gen = fixture
            .build(r#"{"routes": [{"transport": "probe"}]}"#, false)
            .unwrap();
        assert_eq!(gen.levels().len(), 5);
        assert_eq!(gen.routes().len(), 1);
        assert_eq!(gen.routes()[0].name(), "default-route");
        assert!(gen.formats.contains_key("text"));
        assert!(gen.formats.contains_key("json"));
        assert_eq!(gen.lang, "default");
        assert!(gen.events.is_empty());
    }

    #[test]
    fn test_unknown_names_rejected() {
        let fixture = Fixture::new();
        let cases = [
            r#"{"level": "loud", "routes": [{"transport": "probe"}]}"#,
            r#"{"format": "nope", "routes": [{"transport": "probe"}]}"#,
            r#"{"role": "leader", "routes": [{"transport": "probe"}]}"#,
            r#"{"lang": "fr", "routes": [{"transport": "probe"}]}"#,
            r#"{"roles": ["a"], "routes": [{"transport": "probe"}]}"#,
            r#"{"routes": [{"transport": "probe", "level": "loud"}]}"#,
            r#"{"routes": [{"transport": "probe", "format": "missing"}]}"#,
            r#"{"routes": [{"transport": "teleport"}]}"#,
        ];
        for json in cases {
            let err = fixture.build(json, false).unwrap_err();
            assert!(
                matches!(err, LoggerError::InvalidConfiguration { .. }),
                "{}: {}",
                json,
                err
            );
        }
    }

    #[test]
    fn test_policy_checked_only_in_channel_mode() {
        let fixture = Fixture::new();
        let json = r#"{"policy": "sometimes", "routes": [{"transport": "probe"}]}"#;
        assert!(fixture.build(json, false).is_ok());
        assert!(fixture.build(json, true).is_err());
    }

    #[test]
    fn test_bad_template_is_compile_error() {
        let fixture = Fixture::new();
        let err = fixture
            .build(
                r#"{"formats": {"bad": "${msg"}, "routes": [{"transport": "probe"}]}"#,
                false,
            )
            .unwrap_err();
        assert!(matches!(err, LoggerError::Compile { .. }));
    }

    #[test]
    fn test_failed_build_frees_created_transports() {
        let fixture = Fixture::new();
        let err = fixture
            .build(
                r#"{"routes": [
                    {"name": "a", "transport": "probe"},
                    {"name": "b", "transport": "probe", "broken": true}
                ]}"#,
                false,
            )
            .unwrap_err();
        assert!(err.to_string().contains("Could not create a route 'b'"));

        let created = fixture.created.lock();
        assert_eq!(created.len(), 1);
        assert_eq!(*created[0].freed.lock(), 1);
    }

    #[test]
    fn test_start_event_defaults_to_start_message() {
        let fixture = Fixture::new();
        let gen = fixture
            .build(
                r#"{"formats": {"start-message": "up"}, "routes": [{"transport": "probe"}]}"#,
                false,
            )
            .unwrap();
        assert_eq!(gen.events["start"], vec!["start-message".to_string()]);
    }

    #[test]
    fn test_tags_indexed() {
        let fixture = Fixture::new();
        let gen = fixture
            .build(
                r#"{"routes": [
                    {"name": "a", "transport": "probe", "tags": ["audit"]},
                    {"name": "b", "transport": "probe", "tags": ["audit", "ops"]}
                ]}"#,
                false,
            )
            .unwrap();
        assert_eq!(gen.tagged("audit"), &[0, 1]);
        assert_eq!(gen.tagged("ops"), &[1]);
        assert!(gen.tagged("none").is_empty());
    }

    #[test]
    fn test_flat_route_picks_highest_admitting_level() {
        let fixture = Fixture::new();
        let gen = fixture
            .build(
                r#"{"routes": [
                    {"name": "all", "transport": "probe", "level": "debug"},
                    {"name": "warnings", "transport": "probe", "level": "warn"},
                    {"name": "errors", "transport": "probe", "level": "error"}
                ]}"#,
                false,
            )
            .unwrap();
        assert_eq!(gen.flat_route(0), Some(0));
        assert_eq!(gen.flat_route(2), Some(1));
        assert_eq!(gen.flat_route(4), Some(2));
    }

    #[test]
    fn test_flat_route_tie_goes_to_last() {
        let fixture = Fixture::new();
        let gen = fixture
            .build(
                r#"{"routes": [
                    {"name": "first", "transport": "probe", "level": "info"},
                    {"name": "second", "transport": "probe", "level": "info"}
                ]}"#,
                false,
            )
            .unwrap();
        assert_eq!(gen.flat_route(1), Some(1));
        assert_eq!(gen.flat_route(0), None);
    }

    #[test]
    fn test_flat_route_skips_routes_below_global_level() {
        let fixture = Fixture::new();
        let gen = fixture
            .build(
                r#"{"level": "warn", "routes": [
                    {"name": "low", "transport": "probe", "level": "debug"},
                    {"name": "default", "transport": "probe"}
                ]}"#,
                false,
            )
            .unwrap();
        assert_eq!(gen.flat_route(4), Some(1));
        assert_eq!(gen.flat_route(1), None);
    }
}
