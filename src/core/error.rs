//! Error types for the routing engine

pub type Result<T> = std::result::Result<T, LoggerError>;

#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    /// IO error with context
    #[error("IO error while {operation}: {message}")]
    IoOperation {
        operation: String,
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Configuration rejected at load time
    #[error("Invalid configuration for {component}: {message}")]
    InvalidConfiguration { component: String, message: String },

    /// Malformed template or pattern
    #[error("Cannot compile {kind} '{source_text}': {message}")]
    Compile {
        kind: String,
        source_text: String,
        message: String,
    },

    /// A single log call was rejected before dispatch
    #[error("Invalid log call: {0}")]
    InvalidCall(String),

    /// A transport reported a failed write
    #[error("Route '{route}' failed: {message}")]
    Transport { route: String, message: String },

    /// A transport dropped its acknowledgement without answering
    #[error("Route '{route}' never acknowledged the record")]
    RouteAbandoned { route: String },

    /// Several routes of one fan-out failed
    #[error("{} routes failed: {}", .0.len(), join_errors(.0))]
    Multiple(Vec<LoggerError>),

    /// Channels were requested while channel mode is off
    #[error("Channels are not enabled, log through the engine instead")]
    ChannelsDisabled,

    /// Generic error
    #[error("{0}")]
    Other(String),
}

fn join_errors(errors: &[LoggerError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl LoggerError {
    /// Create an IO operation error with context
    pub fn io_operation(
        operation: impl Into<String>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        LoggerError::IoOperation {
            operation: operation.into(),
            message: message.into(),
            source,
        }
    }

    /// Create an invalid configuration error
    pub fn config(component: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::InvalidConfiguration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a compile error for a template or pattern
    pub fn compile(
        kind: impl Into<String>,
        source_text: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        LoggerError::Compile {
            kind: kind.into(),
            source_text: source_text.into(),
            message: message.into(),
        }
    }

    /// Create a per-call validation error
    pub fn invalid_call<S: Into<String>>(msg: S) -> Self {
        LoggerError::InvalidCall(msg.into())
    }

    /// Create a transport error for a route
    pub fn transport(route: impl Into<String>, message: impl Into<String>) -> Self {
        LoggerError::Transport {
            route: route.into(),
            message: message.into(),
        }
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        LoggerError::Other(msg.into())
    }

    /// Prefix the message of a configuration error, leaving other kinds untouched
    pub(crate) fn in_option(self, option: &str) -> Self {
        match self {
            LoggerError::InvalidConfiguration { component, message } => {
                LoggerError::InvalidConfiguration {
                    component,
                    message: format!("Error in option '{}': {}", option, message),
                }
            }
            other => other,
        }
    }

    /// Name the route a configuration error belongs to
    pub(crate) fn in_route(self, route: &str) -> Self {
        match self {
            LoggerError::InvalidConfiguration { component, message }
                if !message.starts_with("Could not create a route") =>
            {
                LoggerError::InvalidConfiguration {
                    component,
                    message: format!("Could not create a route '{}': {}", route, message),
                }
            }
            other => other,
        }
    }

    /// Collapse a list of failures into a single result
    pub(crate) fn collapse(mut errors: Vec<LoggerError>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(LoggerError::Multiple(errors)),
        }
    }
}
