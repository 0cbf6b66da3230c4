//! Core engine types and traits

pub mod catalog;
pub mod channel;
pub mod config;
pub mod engine;
pub mod error;
pub mod generation;
pub mod level;
pub mod message;
pub mod metrics;
pub mod record;
pub mod rules;
pub mod scope;
pub mod transport;
pub mod variables;

pub use catalog::{Catalog, DEFAULT_LANG};
pub use channel::Channel;
pub use config::{
    Config, LangEntry, OneOrMany, RouteSpec, RuleEntry, DEFAULT_ROUTE_NAME, START_MESSAGE_FORMAT,
};
pub use engine::{Engine, EngineBuilder, LogOptions};
pub use error::{LoggerError, Result};
pub use generation::{Generation, Route};
pub use level::{Level, LevelTable, Policy, Role, Threshold, DEFAULT_LEVELS, TAG_RANK};
pub use message::Message;
pub use metrics::DispatchMetrics;
pub use record::{Ack, Completion, Record};
pub use rules::{GlobalFilter, Rule, RouteFilter, RuleSet};
pub use scope::{Callable, Frame, ScopeChain, Value};
pub use transport::{Transport, TransportContext, TransportFactory, TransportRegistry};
pub use variables::ProcessInfo;
