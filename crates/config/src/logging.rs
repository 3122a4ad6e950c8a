//! `[log]` section

use serde::Deserialize;

/// Crates whose output stays at `warn` unless the level is `trace`
const NOISY_CRATES: [&str; 2] = ["lapin", "amq_protocol"];

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Console,
    /// One JSON object per event, for log shippers
    Json,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
}

/// Logging configuration
///
/// ```toml
/// [log]
/// level = "debug"
/// format = "json"
/// output = "stderr"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub output: LogOutput,
}

impl LogConfig {
    /// Filter directive for the configured level, or `level` when given
    ///
    /// The broker client is capped at `warn` below `trace` so per-frame
    /// AMQP chatter does not drown out gateway events.
    pub fn directive(&self, level: Option<&str>) -> String {
        let level = level.unwrap_or(self.level.as_str());
        if level == LogLevel::Trace.as_str() || level.contains('=') {
            return level.to_string();
        }
        let mut directive = level.to_string();
        for krate in NOISY_CRATES {
            directive.push_str(&format!(",{krate}=warn"));
        }
        directive
    }
}
