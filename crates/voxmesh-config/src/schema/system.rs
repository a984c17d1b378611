//! Auto-join, presentation and logging settings.

use serde::{Deserialize, Serialize};

/// Automatic joining once a room context is attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoJoinConfig {
    pub enabled: bool,
    /// Delay after attaching to a room before the first join.
    pub initial_delay_ms: u64,
    /// Delay after the server asks the client to join.
    pub server_trigger_delay_ms: u64,
}

impl Default for AutoJoinConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay_ms: 1500,
            server_trigger_delay_ms: 500,
        }
    }
}

/// Ranked participant view settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Entries shown in the collapsed (mini) view.
    pub mini_view_limit: u32,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self { mini_view_limit: 5 }
    }
}

/// Log level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
}
