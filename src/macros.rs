//! Logging macros for ergonomic log message formatting.
//!
//! These macros work with anything that has a
//! `log(level, message, LogOptions)` method, i.e. [`Engine`](crate::Engine)
//! and [`Channel`](crate::Channel). The level-named macros use the default
//! level names; with a custom level table use [`log!`](crate::log) and
//! name the level.
//!
//! # Examples
//!
//! ```no_run
//! use rust_route_logger::prelude::*;
//! use rust_route_logger::info;
//!
//! let engine = Engine::new(Config::default())?;
//!
//! // Basic logging
//! info!(engine, "Server started");
//!
//! // With format arguments
//! let port = 8080;
//! info!(engine, "Server listening on port {}", port);
//! # Ok::<(), rust_route_logger::LoggerError>(())
//! ```

/// Log a message at any level with automatic formatting.
///
/// # Examples
///
/// ```no_run
/// # use rust_route_logger::prelude::*;
/// # let engine = Engine::new(Config::default())?;
/// use rust_route_logger::log;
/// log!(engine, "info", "Simple message");
/// log!(engine, 3usize, "Error code: {}", 500);
/// # Ok::<(), rust_route_logger::LoggerError>(())
/// ```
#[macro_export]
macro_rules! log {
    ($logger:expr, $level:expr, $($arg:tt)+) => {
        $logger.log($level, format!($($arg)+), $crate::LogOptions::new())
    };
}

/// Log a debug-level message.
#[macro_export]
macro_rules! debug {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, "debug", $($arg)+)
    };
}

/// Log an info-level message.
#[macro_export]
macro_rules! info {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, "info", $($arg)+)
    };
}

/// Log a warning-level message.
///
/// # Examples
///
/// ```no_run
/// # use rust_route_logger::prelude::*;
/// # let engine = Engine::new(Config::default())?;
/// use rust_route_logger::warn;
/// warn!(engine, "Retry attempt {} of {}", 3, 5);
/// # Ok::<(), rust_route_logger::LoggerError>(())
/// ```
#[macro_export]
macro_rules! warn {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, "warn", $($arg)+)
    };
}

/// Log an error-level message.
#[macro_export]
macro_rules! error {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, "error", $($arg)+)
    };
}

/// Log a critical-level message.
#[macro_export]
macro_rules! crit {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, "crit", $($arg)+)
    };
}
