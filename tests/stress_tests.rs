//! Stress tests for file routes under load
//!
//! These tests verify:
//! - No record is lost when many threads log through shared streams
//! - Reloads during heavy logging neither drop nor duplicate records
//! - Every completion callback fires exactly once

#![cfg(feature = "file")]

use rust_route_logger::prelude::*;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const THREADS: usize = 8;
const PER_THREAD: usize = 250;

fn config(dir: &TempDir, format: &str) -> Config {
    let json = format!(
        r#"{{"modules": true, "variables": {{"dir": {dir}}},
            "formats": {{"f": {format}}}, "format": "f",
            "routes": [
                {{"name": "all", "transport": "file", "file_name": "${{dir}}/all.log",
                  "stream": true, "level": "debug"}},
                {{"name": "errors", "transport": "file", "file_name": "${{dir}}/all.log",
                  "stream": true, "level": "error"}}
            ]}}"#,
        dir = serde_json::to_string(dir.path().to_str().unwrap()).unwrap(),
        format = serde_json::to_string(format).unwrap(),
    );
    Config::from_json_str(&json).expect("valid config")
}

fn wait_for(counter: &AtomicUsize, expected: usize) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while counter.load(Ordering::SeqCst) < expected && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
}

/// Many threads sharing one stream through two routes
#[test]
fn test_shared_stream_keeps_every_line() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let engine = Engine::new(config(&temp_dir, "${module} ${level} ${msg}")).expect("engine builds");
    let completed = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let channel = engine.channel(&format!("t{}", t)).unwrap();
            let completed = Arc::clone(&completed);
            thread::spawn(move || {
                for i in 0..PER_THREAD {
                    let level = if i % 10 == 0 { "error" } else { "info" };
                    let completed = Arc::clone(&completed);
                    channel.log(
                        level,
                        format!("message {}", i),
                        LogOptions::new().on_complete(move |result| {
                            assert!(result.is_ok(), "{:?}", result);
                            completed.fetch_add(1, Ordering::SeqCst);
                        }),
                    );
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("logging thread panicked");
    }

    wait_for(&completed, THREADS * PER_THREAD);
    assert_eq!(completed.load(Ordering::SeqCst), THREADS * PER_THREAD);
    engine.shutdown();

    let content = std::fs::read_to_string(temp_dir.path().join("all.log")).expect("log file");
    let errors = THREADS * PER_THREAD / 10;
    assert_eq!(content.lines().count(), THREADS * PER_THREAD + errors);
    assert_eq!(content.matches(" error ").count(), errors * 2);
    for t in 0..THREADS {
        assert!(content.contains(&format!("t{} info message {}", t, PER_THREAD - 1)));
    }
}

/// Reloading the same stream while threads keep logging
#[test]
fn test_reload_under_load_loses_nothing() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let engine = Engine::new(config(&temp_dir, "${module}:${msg}")).expect("engine builds");

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let channel = engine.channel(&format!("t{}", t)).unwrap();
            thread::spawn(move || {
                for i in 0..PER_THREAD {
                    channel.log("info", format!("{}", i), LogOptions::new());
                }
            })
        })
        .collect();

    for n in 0..20 {
        let format = if n % 2 == 0 { "${module}-${msg}" } else { "${module}:${msg}" };
        engine.reload(&config(&temp_dir, format)).expect("reload succeeds");
    }
    for handle in handles {
        handle.join().expect("logging thread panicked");
    }
    engine.shutdown();

    let content = std::fs::read_to_string(temp_dir.path().join("all.log")).expect("log file");
    let seen: HashSet<String> = content
        .lines()
        .map(|line| line.replacen('-', ":", 1))
        .collect();
    assert_eq!(content.lines().count(), THREADS * PER_THREAD);
    assert_eq!(seen.len(), THREADS * PER_THREAD, "duplicate lines written");
    assert_eq!(engine.metrics().reloads(), 20);
}
