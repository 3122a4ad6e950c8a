//! In-process broker
//!
//! Implements the subset of AMQP semantics the gateway relies on: exchanges
//! route to bound queues (exact key for direct, every binding for fanout),
//! the nameless default exchange routes straight to the queue named by the
//! key, and deliveries stay owned by their consumer until acknowledged.
//! Messages published to a key with no binding are dropped, as RabbitMQ does
//! without the `mandatory` flag.
//!
//! Every accepted publish is also appended to a log that tests can inspect.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{BrokerError, Result};
use crate::{Broker, Consumer, Delivery, ExchangeKind};

/// One entry of the publish log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub exchange: String,
    pub routing_key: String,
    pub payload: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Binding {
    exchange: String,
    queue: String,
    routing_key: String,
}

#[derive(Debug, Default)]
struct MemoryQueue {
    messages: Mutex<VecDeque<Bytes>>,
    notify: Notify,
}

impl MemoryQueue {
    fn push(&self, payload: Bytes) {
        self.messages.lock().push_back(payload);
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<Bytes> {
        self.messages.lock().pop_front()
    }

    /// Put unacknowledged messages back at the head, keeping their order
    fn requeue(&self, payloads: impl DoubleEndedIterator<Item = Bytes>) {
        let mut messages = self.messages.lock();
        let mut count = 0;
        for payload in payloads.rev() {
            messages.push_front(payload);
            count += 1;
        }
        drop(messages);
        for _ in 0..count {
            self.notify.notify_one();
        }
    }

    fn len(&self) -> usize {
        self.messages.lock().len()
    }
}

#[derive(Debug, Default)]
struct State {
    exchanges: HashMap<String, ExchangeKind>,
    queues: HashMap<String, Arc<MemoryQueue>>,
    bindings: Vec<Binding>,
    published: Vec<Published>,
}

#[derive(Debug, Default)]
struct Inner {
    state: Mutex<State>,
    closed: CancellationToken,
}

/// Broker that lives entirely in the current process
///
/// Cheap to clone; clones share the same exchanges and queues.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl MemoryBroker {
    /// Create an empty broker
    pub fn new() -> Self {
        Self::default()
    }

    /// Every publish accepted so far, in order
    pub fn published(&self) -> Vec<Published> {
        self.inner.state.lock().published.clone()
    }

    /// Publishes whose routing key matched `routing_key`
    pub fn published_to(&self, routing_key: &str) -> Vec<Bytes> {
        self.inner
            .state
            .lock()
            .published
            .iter()
            .filter(|p| p.routing_key == routing_key)
            .map(|p| p.payload.clone())
            .collect()
    }

    /// Messages waiting in a queue (not counting unacknowledged ones)
    pub fn queue_depth(&self, queue: &str) -> Option<usize> {
        self.inner.state.lock().queues.get(queue).map(|q| q.len())
    }

    /// Snapshot of the messages waiting in a queue
    pub fn peek_queue(&self, queue: &str) -> Vec<Bytes> {
        self.inner
            .state
            .lock()
            .queues
            .get(queue)
            .map(|q| q.messages.lock().iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Reject further operations and end every subscription
    pub fn close(&self) {
        self.inner.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(BrokerError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn declare_exchange(&self, name: &str, kind: ExchangeKind) -> Result<()> {
        self.ensure_open()?;
        if name.is_empty() {
            return Err(BrokerError::declare("the default exchange cannot be redeclared"));
        }

        let mut state = self.inner.state.lock();
        match state.exchanges.get(name) {
            Some(existing) if *existing != kind => Err(BrokerError::declare(format!(
                "exchange '{name}' already declared as {}",
                existing.as_str()
            ))),
            Some(_) => Ok(()),
            None => {
                state.exchanges.insert(name.to_string(), kind);
                Ok(())
            }
        }
    }

    async fn declare_queue(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        self.inner
            .state
            .lock()
            .queues
            .entry(name.to_string())
            .or_default();
        Ok(())
    }

    async fn bind(&self, exchange: &str, queue: &str, routing_key: &str) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.inner.state.lock();
        if !state.exchanges.contains_key(exchange) {
            return Err(BrokerError::declare(format!(
                "cannot bind to undeclared exchange '{exchange}'"
            )));
        }
        if !state.queues.contains_key(queue) {
            return Err(BrokerError::declare(format!(
                "cannot bind undeclared queue '{queue}'"
            )));
        }

        let binding = Binding {
            exchange: exchange.to_string(),
            queue: queue.to_string(),
            routing_key: routing_key.to_string(),
        };
        if !state.bindings.contains(&binding) {
            state.bindings.push(binding);
        }
        Ok(())
    }

    async fn publish(&self, exchange: &str, routing_key: &str, payload: Bytes) -> Result<()> {
        self.ensure_open()?;

        let targets: Vec<Arc<MemoryQueue>> = {
            let mut state = self.inner.state.lock();
            let names: BTreeSet<&str> = if exchange.is_empty() {
                state
                    .queues
                    .contains_key(routing_key)
                    .then_some(routing_key)
                    .into_iter()
                    .collect()
            } else {
                let kind = *state.exchanges.get(exchange).ok_or_else(|| {
                    BrokerError::publish(exchange, routing_key, "exchange not declared")
                })?;
                state
                    .bindings
                    .iter()
                    .filter(|b| b.exchange == exchange)
                    .filter(|b| kind == ExchangeKind::Fanout || b.routing_key == routing_key)
                    .map(|b| b.queue.as_str())
                    .collect()
            };
            let targets = names
                .into_iter()
                .filter_map(|name| state.queues.get(name).cloned())
                .collect();

            state.published.push(Published {
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                payload: payload.clone(),
            });
            targets
        };

        if targets.is_empty() {
            trace!(exchange, routing_key, "message unroutable, dropped");
        }
        for queue in targets {
            queue.push(payload.clone());
        }
        Ok(())
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<Box<dyn Consumer>> {
        self.ensure_open()?;
        let handle = self
            .inner
            .state
            .lock()
            .queues
            .get(queue)
            .cloned()
            .ok_or_else(|| BrokerError::consume(queue, "queue not declared"))?;

        trace!(queue, consumer_tag, "consumer started");
        Ok(Box::new(MemoryConsumer {
            queue: handle,
            closed: self.inner.closed.clone(),
            unacked: BTreeMap::new(),
            next_tag: 0,
            cancelled: false,
        }))
    }

    async fn close(&self) -> Result<()> {
        MemoryBroker::close(self);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Subscription handed out by [`MemoryBroker::consume`]
struct MemoryConsumer {
    queue: Arc<MemoryQueue>,
    closed: CancellationToken,
    unacked: BTreeMap<u64, Bytes>,
    next_tag: u64,
    cancelled: bool,
}

impl MemoryConsumer {
    fn release(&mut self) {
        if self.unacked.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.unacked);
        self.queue.requeue(pending.into_values());
    }
}

#[async_trait]
impl Consumer for MemoryConsumer {
    async fn next(&mut self) -> Option<Result<Delivery>> {
        loop {
            if self.cancelled || self.closed.is_cancelled() {
                return None;
            }
            if let Some(payload) = self.queue.pop() {
                self.next_tag += 1;
                let tag = self.next_tag;
                self.unacked.insert(tag, payload.clone());
                return Some(Ok(Delivery { tag, payload }));
            }

            tokio::select! {
                _ = self.queue.notify.notified() => {}
                _ = self.closed.cancelled() => return None,
            }
        }
    }

    async fn ack(&mut self, tag: u64) -> Result<()> {
        match self.unacked.remove(&tag) {
            Some(_) => Ok(()),
            None => Err(BrokerError::Ack {
                tag,
                reason: "unknown delivery tag".into(),
            }),
        }
    }

    async fn cancel(&mut self) -> Result<()> {
        self.cancelled = true;
        self.release();
        Ok(())
    }
}

impl Drop for MemoryConsumer {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
