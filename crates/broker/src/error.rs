//! Broker error types

use thiserror::Error;

/// Errors raised by broker adapters and the sharded publisher
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Could not reach or authenticate against the broker
    #[error("broker connection failed: {0}")]
    Connect(String),

    /// Exchange, queue or binding declaration rejected
    #[error("declare failed: {0}")]
    Declare(String),

    /// Publish rejected or not confirmed
    #[error("publish to {exchange}/{routing_key} failed: {reason}")]
    Publish {
        exchange: String,
        routing_key: String,
        reason: String,
    },

    /// Consumer could not be started or its stream failed
    #[error("consume from {queue} failed: {reason}")]
    Consume { queue: String, reason: String },

    /// Acknowledgement rejected
    #[error("ack of delivery {tag} failed: {reason}")]
    Ack { tag: u64, reason: String },

    /// Broker handle was closed
    #[error("broker closed")]
    Closed,

    /// Shard target is unusable
    #[error("invalid shard target: {0}")]
    InvalidTarget(String),
}

impl BrokerError {
    /// Create a publish error
    pub fn publish(exchange: &str, routing_key: &str, reason: impl Into<String>) -> Self {
        Self::Publish {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a consume error
    pub fn consume(queue: &str, reason: impl Into<String>) -> Self {
        Self::Consume {
            queue: queue.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a declare error
    pub fn declare(msg: impl Into<String>) -> Self {
        Self::Declare(msg.into())
    }
}

/// Result type for broker operations
pub type Result<T> = std::result::Result<T, BrokerError>;
