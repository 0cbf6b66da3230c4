//! Channels: named log sources with their own per-route thresholds

use super::engine::{Engine, LogOptions};
use super::generation::Generation;
use super::level::Level;
use super::message::Message;
use super::rules::resolve_route_level;
use super::scope::Frame;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Lowest rank each route of one generation delivers for a channel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RouteLevelTable {
    generation: u64,
    /// One slot per route of the generation; `None` means never delivered
    thresholds: Vec<Option<usize>>,
}

impl RouteLevelTable {
    pub(crate) fn compute(generation: &Generation, module: &str) -> Self {
        let gated = generation
            .role_requirement
            .map_or(false, |required| required != generation.role);
        let thresholds = if gated {
            vec![None; generation.routes.len()]
        } else {
            generation
                .routes
                .iter()
                .map(|route| {
                    resolve_route_level(
                        &generation.filter,
                        &route.filter,
                        module,
                        generation.levels.len(),
                    )
                })
                .collect()
        };
        Self {
            generation: generation.id,
            thresholds,
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Indices of the routes admitting `rank`
    pub(crate) fn select(&self, rank: usize) -> Vec<usize> {
        self.thresholds
            .iter()
            .enumerate()
            .filter_map(|(idx, threshold)| match threshold {
                Some(level) if rank >= *level => Some(idx),
                _ => None,
            })
            .collect()
    }
}

/// Engine-side state of a registered channel
pub(crate) struct ChannelState {
    module: String,
    shown_as: String,
    frame: Arc<Frame>,
    table: RwLock<RouteLevelTable>,
}

impl ChannelState {
    pub(crate) fn new(module: &str, shown_as: Option<&str>, generation: &Generation) -> Self {
        Self {
            module: module.to_string(),
            shown_as: shown_as.unwrap_or(module).to_string(),
            frame: Arc::new(Frame::new().with("module", module)),
            table: RwLock::new(RouteLevelTable::compute(generation, module)),
        }
    }

    pub(crate) fn frame(&self) -> &Arc<Frame> {
        &self.frame
    }

    pub(crate) fn recalc(&self, generation: &Generation) {
        *self.table.write() = RouteLevelTable::compute(generation, &self.module);
    }

    /// Table matching `generation`, recomputed if a reload has not reached it yet
    pub(crate) fn table_for(&self, generation: &Generation) -> RouteLevelTable {
        {
            let table = self.table.read();
            if table.generation() == generation.id {
                return table.clone();
            }
        }
        let table = RouteLevelTable::compute(generation, &self.module);
        let mut current = self.table.write();
        if current.generation() < table.generation() {
            *current = table.clone();
        }
        table
    }
}

impl fmt::Debug for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelState")
            .field("module", &self.module)
            .field("shown_as", &self.shown_as)
            .field("table", &*self.table.read())
            .finish()
    }
}

/// A named log source
///
/// Obtained from [`Engine::channel`]. Rules of the configuration are
/// matched against the module name, and the `module` variable holds it.
#[derive(Clone)]
pub struct Channel {
    engine: Engine,
    state: Arc<ChannelState>,
}

impl Channel {
    pub(crate) fn new(engine: Engine, state: Arc<ChannelState>) -> Self {
        Self { engine, state }
    }

    pub(crate) fn state(&self) -> &Arc<ChannelState> {
        &self.state
    }

    pub fn module(&self) -> &str {
        &self.state.module
    }

    pub fn shown_as(&self) -> &str {
        &self.state.shown_as
    }

    /// Log through this channel
    pub fn log(&self, level: impl Into<Level>, message: impl Into<Message>, options: LogOptions) {
        self.engine
            .dispatch_level(level.into(), message.into(), options, Some(&self.state));
    }

    /// Send to the routes bound to `tags`, bypassing level filtering
    pub fn tag<I, S>(&self, tags: I, message: impl Into<Message>, options: LogOptions)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.engine
            .dispatch_tags(tags, message.into(), options, Some(&self.state));
    }

    /// Route name to lowest delivered level name, for the live generation
    pub fn route_levels(&self) -> BTreeMap<String, String> {
        let generation = self.engine.generation();
        let table = self.state.table_for(&generation);
        generation
            .routes
            .iter()
            .zip(&table.thresholds)
            .filter_map(|(route, threshold)| {
                let name = generation.levels.name((*threshold)?)?;
                Some((route.name.clone(), name.to_string()))
            })
            .collect()
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("module", &self.state.module)
            .field("shown_as", &self.state.shown_as)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{Config, RouteSpec};
    use crate::core::engine::EngineBuilder;
    use crate::core::level::Role;
    use crate::core::record::{Ack, Record};
    use crate::core::scope::Value;
    use crate::core::transport::{Transport, TransportContext};

    struct Sink;

    impl Transport for Sink {
        fn kind(&self) -> &str {
            "sink"
        }
        fn out(&self, _record: Record, ack: Ack) {
            ack.ok();
        }
    }

    fn engine(json: &str, role: Role) -> Engine {
        EngineBuilder::new(Config::from_json_str(json).unwrap())
            .transport("sink", |_ctx: &TransportContext, _spec: &RouteSpec, _prev| {
                Ok(Arc::new(Sink) as Arc<dyn Transport>)
            })
            .role(role, 1)
            .build()
            .unwrap()
    }

    const ROUTES: &str = r#"
        "routes": [
            {"name": "screen", "transport": "sink"},
            {"name": "db-log", "transport": "sink", "level": "debug", "policy": "nothing",
             "include": ["db*"], "exclude": []}
        ]"#;

    #[test]
    fn test_route_levels_follow_rules() {
        let engine = engine(
            &format!(r#"{{"modules": true, "level": "info", "exclude": ["db*"], {}}}"#, ROUTES),
            Role::Master,
        );

        let http = engine.channel("http").unwrap();
        assert_eq!(
            http.route_levels(),
            BTreeMap::from([("screen".to_string(), "info".to_string())])
        );

        let db = engine.channel("db-pool").unwrap();
        assert_eq!(
            db.route_levels(),
            BTreeMap::from([("db-log".to_string(), "debug".to_string())])
        );
    }

    #[test]
    fn test_role_gating_empties_tables() {
        let json = format!(r#"{{"modules": true, "role": "worker", {}}}"#, ROUTES);
        let master = engine(&json, Role::Master);
        assert!(master.channel("http").unwrap().route_levels().is_empty());

        let worker = engine(&json, Role::Worker);
        assert_eq!(worker.channel("http").unwrap().route_levels().len(), 1);
    }

    #[test]
    fn test_select_by_rank() {
        let table = RouteLevelTable {
            generation: 1,
            thresholds: vec![Some(1), None, Some(3)],
        };
        assert!(table.select(0).is_empty());
        assert_eq!(table.select(1), vec![0]);
        assert_eq!(table.select(4), vec![0, 2]);
    }

    #[test]
    fn test_shown_as_defaults_to_module() {
        let engine = engine(&format!(r#"{{"modules": true, {}}}"#, ROUTES), Role::Master);
        let plain = engine.channel("api").unwrap();
        assert_eq!(plain.shown_as(), "api");

        let named = engine.channel_as("api.v2", "API").unwrap();
        assert_eq!(named.module(), "api.v2");
        assert_eq!(named.shown_as(), "API");
        assert_eq!(named.state().frame().get("module"), Some(&Value::from("api.v2")));
    }
}
