//! Async logging example
//!
//! Demonstrates awaiting delivery from many tasks.
//!
//! Run with: cargo run --example async_logging --features async-dispatch

use rust_route_logger::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    println!("=== Rust Route Logger - Async Logging Example ===\n");

    let config = Config::from_json_str(
        r#"{"routes": [{"name": "app", "transport": "file", "file_name": "async_test.log",
                        "level": "debug"}]}"#,
    )?;
    let engine = Engine::new(config)?;

    println!("1. Awaiting each delivery:");
    for i in 0..10 {
        engine
            .log_async("info", format!("Message #{}", i), LogOptions::new())
            .await?;
    }

    println!("\n2. Concurrent tasks:");
    let mut handles = vec![];
    for task_id in 0..5 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..20 {
                engine
                    .log_async("info", format!("Task {} - Message {}", task_id, i), LogOptions::new())
                    .await?;
            }
            Ok::<(), LoggerError>(())
        }));
    }
    for handle in handles {
        handle
            .await
            .map_err(|e| LoggerError::other(e.to_string()))??;
    }
    println!("   5 tasks logged 20 messages each");
    println!("   delivered: {}", engine.metrics().delivered());

    engine.shutdown();
    println!("\n=== Example completed successfully! ===");
    println!("Check 'async_test.log' for file output");

    Ok(())
}
