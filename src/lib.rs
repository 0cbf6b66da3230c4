//! # Rust Route Logger
//!
//! A configurable routing log engine: one call fans a message out to any
//! number of routes, each with its own level rules, template and transport.
//!
//! ## Features
//!
//! - **Routing**: Flat mode picks one route per level, channel mode filters
//!   every route by per-module include/exclude rules
//! - **Templates**: `${name | formatter(args)}` with date and number patterns
//! - **Live Reload**: Configuration generations swap atomically
//! - **Transports**: Console, file, and custom transports
//!
//! ## Example
//!
//! ```no_run
//! use rust_route_logger::prelude::*;
//!
//! let config = Config::from_json_str(
//!     r#"{"modules": true, "routes": [{"transport": "console", "level": "info"}]}"#,
//! )?;
//! let engine = Engine::new(config)?;
//! let db = engine.channel("db")?;
//! db.log("warn", "slow query", LogOptions::new());
//! engine.shutdown();
//! # Ok::<(), rust_route_logger::LoggerError>(())
//! ```

pub mod core;
pub mod format;
pub mod macros;
pub mod transports;

pub mod prelude {
    pub use crate::core::{
        Ack, Channel, Completion, Config, DispatchMetrics, Engine, EngineBuilder, Frame, Level,
        LevelTable, LogOptions, LoggerError, Message, Record, Result, Role, RouteSpec, Transport,
        TransportContext, Value,
    };
    pub use crate::format::Formatter;
}

pub use core::{
    Ack, Catalog, Channel, Completion, Config, DispatchMetrics, Engine, EngineBuilder, Frame,
    Generation, Level, LevelTable, LogOptions, LoggerError, Message, Policy, Record, Result, Role,
    Route, RouteSpec, ScopeChain, Transport, TransportContext, TransportFactory,
    TransportRegistry, Value,
};
pub use format::{CompiledFormat, Formatter, Formatters, Template};
