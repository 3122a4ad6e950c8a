//! Analyzer Broker - Message broker seam for the ingest gateway
//!
//! The gateway only needs a handful of broker operations: declare the
//! topology, publish to a direct exchange and consume one queue with manual
//! acknowledgements. Those are captured by the [`Broker`] and [`Consumer`]
//! traits so the gateway can run against RabbitMQ in production and against
//! an in-process broker in tests.
//!
//! # Adapters
//!
//! - [`AmqpBroker`] - RabbitMQ through `lapin`, publisher confirms enabled
//! - [`MemoryBroker`] - direct-exchange routing in process, with a publish log
//!
//! # Sharding
//!
//! [`ShardedPublisher`] spreads data envelopes over the replica queues of a
//! [`ShardTarget`] round-robin, and broadcasts end markers to all of them.

mod amqp;
mod error;
mod memory;
mod shard;

use async_trait::async_trait;
use bytes::Bytes;

pub use amqp::AmqpBroker;
pub use error::{BrokerError, Result};
pub use memory::{MemoryBroker, Published};
pub use shard::{ShardTarget, ShardedPublisher};

/// Exchange routing type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    /// Route by exact routing key match
    Direct,
    /// Route to every bound queue
    Fanout,
}

impl ExchangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Fanout => "fanout",
        }
    }
}

/// One message handed out by a consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Tag to pass back to [`Consumer::ack`]
    pub tag: u64,
    /// Message body
    pub payload: Bytes,
}

/// Broker operations used by the gateway
#[async_trait]
pub trait Broker: Send + Sync {
    /// Declare an exchange (idempotent)
    async fn declare_exchange(&self, name: &str, kind: ExchangeKind) -> Result<()>;

    /// Declare a queue (idempotent)
    async fn declare_queue(&self, name: &str) -> Result<()>;

    /// Bind a queue to an exchange under a routing key
    async fn bind(&self, exchange: &str, queue: &str, routing_key: &str) -> Result<()>;

    /// Publish one message, returning once the broker accepted it
    async fn publish(&self, exchange: &str, routing_key: &str, payload: Bytes) -> Result<()>;

    /// Start consuming a queue with manual acknowledgements
    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<Box<dyn Consumer>>;

    /// Release the connection; later operations fail with `Closed`
    async fn close(&self) -> Result<()>;

    /// Adapter name for logging
    fn name(&self) -> &'static str;
}

/// A running subscription to one queue
///
/// Deliveries that were handed out but never acknowledged go back to the
/// queue once the consumer is cancelled or dropped.
#[async_trait]
pub trait Consumer: Send {
    /// Wait for the next delivery; `None` once the subscription ended
    async fn next(&mut self) -> Option<Result<Delivery>>;

    /// Acknowledge a delivery
    async fn ack(&mut self, tag: u64) -> Result<()>;

    /// Stop the subscription
    async fn cancel(&mut self) -> Result<()>;
}
