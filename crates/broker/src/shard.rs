//! Sharded publishing across the replica queues of a stage
//!
//! A downstream stage runs N replicas, each reading its own queue named from
//! a template (`movies-{}` → `movies-0`, `movies-1`, ...). The gateway binds
//! every replica queue to its output exchange with the queue name as routing
//! key, so picking a replica is picking a routing key.
//!
//! # Design
//!
//! - `direct` sends one message to one replica and advances a cursor, so
//!   consecutive calls visit replicas `0, 1, ..., N-1, 0, ...`
//! - `broadcast` sends the same message to every replica and leaves the
//!   cursor alone; end markers use it so each replica sees end-of-input
//! - The cursor lives in the [`ShardTarget`], which the caller owns and lends
//!   out mutably, so no synchronization is needed around it

use std::sync::Arc;

use bytes::Bytes;
use tracing::trace;

use crate::error::{BrokerError, Result};
use crate::Broker;

/// Replica slot in a name template
const SLOT: &str = "{}";

/// Replica set of one downstream stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardTarget {
    name_format: String,
    replicas: usize,
    cursor: usize,
}

impl ShardTarget {
    /// Create a target
    ///
    /// `name_format` must contain exactly one `{}` slot and `replicas` must
    /// be at least 1.
    pub fn new(name_format: impl Into<String>, replicas: usize) -> Result<Self> {
        let name_format = name_format.into();
        let slots = name_format.matches(SLOT).count();
        if slots != 1 {
            return Err(BrokerError::InvalidTarget(format!(
                "name format '{name_format}' must contain exactly one '{SLOT}', found {slots}"
            )));
        }
        if replicas == 0 {
            return Err(BrokerError::InvalidTarget(format!(
                "'{name_format}' needs at least one replica"
            )));
        }
        Ok(Self {
            name_format,
            replicas,
            cursor: 0,
        })
    }

    /// Routing key (and queue name) of one replica
    pub fn replica_key(&self, index: usize) -> String {
        self.name_format.replacen(SLOT, &index.to_string(), 1)
    }

    /// Routing keys of every replica, in index order
    pub fn keys(&self) -> impl Iterator<Item = String> + '_ {
        (0..self.replicas).map(|i| self.replica_key(i))
    }

    /// Key for the next direct publish, advancing the cursor
    pub fn next_key(&mut self) -> String {
        let key = self.replica_key(self.cursor);
        self.cursor = (self.cursor + 1) % self.replicas;
        key
    }

    /// Replica index the next direct publish goes to
    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    #[inline]
    pub fn replicas(&self) -> usize {
        self.replicas
    }

    #[inline]
    pub fn name_format(&self) -> &str {
        &self.name_format
    }
}

/// Publishes onto shard targets through one exchange
#[derive(Clone)]
pub struct ShardedPublisher {
    broker: Arc<dyn Broker>,
    exchange: String,
}

impl ShardedPublisher {
    pub fn new(broker: Arc<dyn Broker>, exchange: impl Into<String>) -> Self {
        Self {
            broker,
            exchange: exchange.into(),
        }
    }

    #[inline]
    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Publish to the replica under the cursor and advance it
    ///
    /// Returns the routing key used.
    pub async fn direct(&self, target: &mut ShardTarget, payload: Bytes) -> Result<String> {
        let key = target.next_key();
        trace!(exchange = %self.exchange, routing_key = %key, bytes = payload.len(), "direct publish");
        self.broker.publish(&self.exchange, &key, payload).await?;
        Ok(key)
    }

    /// Publish the same payload to every replica
    ///
    /// Returns the number of replicas reached. Stops at the first failure.
    pub async fn broadcast(&self, target: &ShardTarget, payload: Bytes) -> Result<usize> {
        for key in target.keys() {
            trace!(exchange = %self.exchange, routing_key = %key, "broadcast publish");
            self.broker
                .publish(&self.exchange, &key, payload.clone())
                .await?;
        }
        Ok(target.replicas())
    }
}

impl std::fmt::Debug for ShardedPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardedPublisher")
            .field("broker", &self.broker.name())
            .field("exchange", &self.exchange)
            .finish()
    }
}

#[cfg(test)]
#[path = "shard_test.rs"]
mod tests;
