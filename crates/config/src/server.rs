//! Client-facing listener configuration

use serde::Deserialize;

use analyzer_protocol::DEFAULT_MAX_LINE_SIZE;

/// Listener configuration
///
/// # Example
///
/// ```toml
/// [server]
/// host = "0.0.0.0"
/// port = 9090
/// backlog = 16
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    /// Default: "0.0.0.0"
    pub host: String,

    /// Listen port
    /// Default: 9090
    pub port: u16,

    /// Pending connection queue length
    /// Default: 16
    pub backlog: u32,

    /// Largest accepted line in a client batch (bytes)
    /// Default: 16 MiB
    pub max_line_size: usize,

    /// Enable TCP_NODELAY on accepted sockets
    /// Default: true
    pub nodelay: bool,

    /// TCP keepalive idle time in seconds, 0 disables it
    /// Default: 60
    pub keepalive_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 9090,
            backlog: 16,
            max_line_size: DEFAULT_MAX_LINE_SIZE,
            nodelay: true,
            keepalive_secs: 60,
        }
    }
}
