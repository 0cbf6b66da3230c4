//! Basic engine usage example
//!
//! Demonstrates flat-mode routing: each level goes to the one route with the
//! highest threshold that admits it.
//!
//! Run with: cargo run --example basic_usage

use rust_route_logger::prelude::*;
use rust_route_logger::{info, warn};

fn main() -> Result<()> {
    println!("=== Rust Route Logger - Basic Usage Example ===\n");

    let config = Config::from_json_str(
        r#"{
            "formats": {"short": "${level|align(w=5)} ${msg}"},
            "format": "short",
            "routes": [
                {"name": "everything", "transport": "console", "level": "debug"},
                {"name": "problems", "transport": "console", "level": "error",
                 "stderr_level": "error", "colors": true}
            ]
        }"#,
    )?;
    let engine = Engine::new(config)?;

    println!("1. Logging at different levels:");
    engine.log("debug", "This is a debug message", LogOptions::new());
    engine.log("info", "This is an info message", LogOptions::new());
    engine.log("warn", "This is a warning message", LogOptions::new());
    engine.log("error", "This is an error message (stderr)", LogOptions::new());
    engine.log("crit", "This is a critical message (stderr)", LogOptions::new());

    println!("\n2. Logging with macros and variables:");
    let port = 8080;
    info!(engine, "Server listening on port {}", port);
    warn!(engine, "Retry attempt {} of {}", 3, 5);
    engine.log(
        "info",
        "request served",
        LogOptions::new().with_vars(Frame::new().with("user", "alice")),
    );

    println!("\n3. Routes: {:?}", engine.route_names());

    engine.shutdown();
    println!("\n=== Example completed successfully! ===");

    Ok(())
}
