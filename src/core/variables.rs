//! Process-wide variables available to every template
//!
//! | Name | Value |
//! |---|---|
//! | `date` | current local date (callable) |
//! | `role` | role name of this process |
//! | `wid` | worker id, 0 for the master |
//! | `role-ident` | `role`, or `role#NNN` for workers |
//! | `os.platform` / `os.arch` / `os.type` / `os.tmpdir` | build target and temp dir |
//! | `proc.pid` | process id |
//! | `proc.cwd` | working directory (callable) |
//! | `proc.env(NAME)` | environment variable (callable) |
//! | `proc.uptime` | seconds since the engine started, millisecond precision (callable) |
//! | `proc.uptime-hr` | same with nanosecond precision (callable) |

use super::level::Role;
use super::scope::{Frame, Value};
use chrono::Local;
use std::collections::BTreeMap;
use std::time::Instant;

/// Facts about the running process the variable frame is built from
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub role: Role,
    pub role_names: [String; 2],
    pub worker_id: u32,
    pub started: Instant,
}

impl ProcessInfo {
    pub fn role_name(&self) -> &str {
        &self.role_names[self.role.index()]
    }

    /// `master`, or `worker#007` style for workers
    pub fn role_ident(&self) -> String {
        match self.role {
            Role::Master => self.role_name().to_string(),
            Role::Worker => format!("{}#{:03}", self.role_name(), self.worker_id),
        }
    }
}

/// Build the process frame; later layers override earlier names
pub fn process_frame(
    info: &ProcessInfo,
    config_vars: &BTreeMap<String, serde_json::Value>,
    extra: &Frame,
) -> Frame {
    let started = info.started;
    let mut frame = Frame::new()
        .with(
            "date",
            Value::func(|_| {
                let now = Local::now();
                Some(Value::Date(now.with_timezone(now.offset())))
            }),
        )
        .with("role", info.role_name())
        .with(
            "wid",
            match info.role {
                Role::Master => 0,
                Role::Worker => i64::from(info.worker_id),
            },
        )
        .with("role-ident", info.role_ident())
        .with("os.platform", std::env::consts::OS)
        .with("os.arch", std::env::consts::ARCH)
        .with("os.type", std::env::consts::FAMILY)
        .with("os.tmpdir", std::env::temp_dir().display().to_string())
        .with("proc.pid", i64::from(std::process::id()))
        .with(
            "proc.cwd",
            Value::func(|_| {
                std::env::current_dir()
                    .ok()
                    .map(|dir| Value::from(dir.display().to_string()))
            }),
        )
        .with(
            "proc.env",
            Value::func(|args| {
                let name = args.first()?;
                std::env::var(name).ok().map(Value::from)
            }),
        )
        .with(
            "proc.uptime",
            Value::func(move |_| {
                Some(Value::Float(started.elapsed().as_millis() as f64 / 1000.0))
            }),
        )
        .with(
            "proc.uptime-hr",
            Value::func(move |_| Some(Value::Float(started.elapsed().as_secs_f64()))),
        );

    for (name, value) in config_vars {
        frame.insert(name.trim(), Value::from_json(value));
    }
    frame.extend_from(extra);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scope::ScopeChain;

    fn info(role: Role) -> ProcessInfo {
        ProcessInfo {
            role,
            role_names: ["master".into(), "worker".into()],
            worker_id: 7,
            started: Instant::now(),
        }
    }

    #[test]
    fn test_role_ident() {
        assert_eq!(info(Role::Master).role_ident(), "master");
        assert_eq!(info(Role::Worker).role_ident(), "worker#007");
    }

    #[test]
    fn test_process_facts() {
        let frame = process_frame(&info(Role::Master), &BTreeMap::new(), &Frame::new());
        assert_eq!(frame.get("role"), Some(&Value::from("master")));
        assert_eq!(frame.get("wid"), Some(&Value::Int(0)));
        assert_eq!(
            frame.get("proc.pid"),
            Some(&Value::Int(i64::from(std::process::id())))
        );
        assert!(frame.get("date").unwrap().is_callable());
        assert!(matches!(
            frame.get("date").unwrap().call(&[]),
            Some(Value::Date(_))
        ));
    }

    #[test]
    fn test_env_lookup() {
        std::env::set_var("ROUTE_LOGGER_TEST_VAR", "present");
        let frame = process_frame(&info(Role::Master), &BTreeMap::new(), &Frame::new());
        let env = frame.get("proc.env").unwrap();
        assert_eq!(
            env.call(&["ROUTE_LOGGER_TEST_VAR".to_string()]),
            Some(Value::from("present"))
        );
        assert_eq!(env.call(&[]), None);
    }

    #[test]
    fn test_layers_override() {
        let config_vars = BTreeMap::from([
            ("app".to_string(), serde_json::json!("billing")),
            ("role".to_string(), serde_json::json!("primary")),
        ]);
        let extra = Frame::new().with("app", "override");
        let frame = process_frame(&info(Role::Master), &config_vars, &extra);

        let chain = ScopeChain::new().with_frame(frame);
        assert_eq!(chain.resolve("app"), Some(&Value::from("override")));
        assert_eq!(chain.resolve("role"), Some(&Value::from("primary")));
    }
}
