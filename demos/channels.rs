//! Channel mode example
//!
//! Demonstrates per-module include/exclude rules, tags and events.
//!
//! Run with: cargo run --example channels

use rust_route_logger::prelude::*;

fn main() -> Result<()> {
    println!("=== Rust Route Logger - Channels Example ===\n");

    let config = Config::from_json_str(
        r#"{
            "modules": true,
            "level": "info",
            "formats": {
                "line": "${module}: ${level} ${msg}",
                "tagged": "[${tag}] ${msg}",
                "start-message": "engine started as ${role}"
            },
            "format": "line",
            "routes": [
                {"name": "screen", "transport": "console", "exclude": [{"db*": "warn"}]},
                {"name": "db", "transport": "console", "level": "debug", "policy": "nothing",
                 "include": ["db*"]},
                {"name": "audit", "transport": "console", "format": "tagged", "tags": ["audit"]}
            ]
        }"#,
    )?;
    let engine = Engine::new(config)?;
    engine.emit("start", LogOptions::new());

    let http = engine.channel("http")?;
    let db = engine.channel_as("db-pool", "db")?;

    println!("1. Route levels per channel:");
    println!("   http    -> {:?}", http.route_levels());
    println!("   db-pool -> {:?}", db.route_levels());

    println!("\n2. Channel logging:");
    http.log("info", "GET /health 200", LogOptions::new());
    db.log("debug", "checkout connection #4", LogOptions::new());
    db.log("warn", "pool nearly exhausted", LogOptions::new());

    println!("\n3. Tags:");
    http.tag(["audit"], "admin signed in", LogOptions::new());

    println!("\n4. Completion callback:");
    let (tx, rx) = std::sync::mpsc::channel();
    db.log(
        "error",
        "connection lost",
        LogOptions::new().on_complete(move |result| {
            let _ = tx.send(result.is_ok());
        }),
    );
    println!("   delivered to every route: {:?}", rx.recv().ok());

    engine.shutdown();
    println!("\n=== Example completed successfully! ===");

    Ok(())
}
