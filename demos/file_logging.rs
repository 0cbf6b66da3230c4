//! File transport example
//!
//! Demonstrates templated file names, shared streams and live reload.
//!
//! Run with: cargo run --example file_logging

use rust_route_logger::prelude::*;

fn main() -> Result<()> {
    println!("=== Rust Route Logger - File Logging Example ===\n");

    let config = Config::from_json_str(
        r#"{
            "variables": {"service": "orders"},
            "routes": [
                {"name": "app", "transport": "file", "file_name": "${service}.log",
                 "stream": true, "level": "debug"}
            ]
        }"#,
    )?;
    let engine = Engine::new(config)?;

    println!("1. Writing to orders.log:");
    for i in 0..10 {
        engine.log("info", format!("order #{} accepted", i), LogOptions::new());
    }

    println!("\n2. Reloading with a JSON route added:");
    let reloaded = Config::from_json_str(
        r#"{
            "variables": {"service": "orders"},
            "routes": [
                {"name": "app", "transport": "file", "file_name": "${service}.log",
                 "stream": true, "level": "debug"},
                {"name": "json", "transport": "file", "file_name": "${service}.json",
                 "format": "json", "level": "warn"}
            ]
        }"#,
    )?;
    engine.reload(&reloaded)?;
    engine.log("warn", "inventory low", LogOptions::new());

    engine.shutdown();
    println!("\n=== Example completed successfully! ===");
    println!("Check 'orders.log' and 'orders.json' for file output");

    Ok(())
}
