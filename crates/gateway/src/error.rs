//! Gateway error types

use std::io;

use thiserror::Error;

use analyzer_broker::BrokerError;
use analyzer_config::ConfigError;
use analyzer_protocol::{EncodeError, ProtocolError, Resource};

/// Errors that end a connection or stop the gateway
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Failed to bind the listener
    #[error("failed to bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Malformed or interrupted client stream
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A client line could not be re-encoded
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// Broker rejected an operation
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    /// Configuration could not be turned into runtime state
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Client sent ERROR while uploading a resource
    #[error("client aborted while sending {0}")]
    ClientAborted(Resource),

    /// The other half of the connection failed first
    #[error("connection cancelled")]
    Cancelled,

    /// A connection task panicked or was aborted
    #[error("connection task failed: {0}")]
    Task(String),
}

impl GatewayError {
    /// True if the peer simply went away
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Protocol(e) if e.is_disconnect())
    }
}
