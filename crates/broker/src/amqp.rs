//! RabbitMQ adapter
//!
//! One channel is kept for declarations and publishing, in confirm mode so
//! that `publish` only returns once the broker took responsibility for the
//! message. Every consumer gets its own channel with a prefetch limit; the
//! delivery tags it hands out are scoped to that channel.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
    ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tracing::{debug, info};

use crate::error::{BrokerError, Result};
use crate::{Broker, Consumer, Delivery, ExchangeKind};

/// AMQP reply code for a normal close
const REPLY_SUCCESS: u16 = 200;

/// Broker backed by a RabbitMQ connection
pub struct AmqpBroker {
    connection: Connection,
    channel: Channel,
    prefetch: u16,
}

impl AmqpBroker {
    /// Connect and open the publishing channel
    pub async fn connect(url: &str, prefetch: u16) -> Result<Self> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| BrokerError::Connect(e.to_string()))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| BrokerError::Connect(e.to_string()))?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| BrokerError::Connect(e.to_string()))?;

        info!(prefetch, "connected to amqp broker");
        Ok(Self {
            connection,
            channel,
            prefetch,
        })
    }
}

impl std::fmt::Debug for AmqpBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmqpBroker")
            .field("status", &self.connection.status().state())
            .field("prefetch", &self.prefetch)
            .finish()
    }
}

fn lapin_kind(kind: ExchangeKind) -> lapin::ExchangeKind {
    match kind {
        ExchangeKind::Direct => lapin::ExchangeKind::Direct,
        ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
    }
}

#[async_trait]
impl Broker for AmqpBroker {
    async fn declare_exchange(&self, name: &str, kind: ExchangeKind) -> Result<()> {
        self.channel
            .exchange_declare(
                name,
                lapin_kind(kind),
                ExchangeDeclareOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::declare(format!("exchange '{name}': {e}")))
    }

    async fn declare_queue(&self, name: &str) -> Result<()> {
        self.channel
            .queue_declare(name, QueueDeclareOptions::default(), FieldTable::default())
            .await
            .map(|_| ())
            .map_err(|e| BrokerError::declare(format!("queue '{name}': {e}")))
    }

    async fn bind(&self, exchange: &str, queue: &str, routing_key: &str) -> Result<()> {
        self.channel
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::declare(format!("bind '{queue}' to '{exchange}': {e}")))
    }

    async fn publish(&self, exchange: &str, routing_key: &str, payload: Bytes) -> Result<()> {
        let confirm = self
            .channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default(),
            )
            .await
            .map_err(|e| BrokerError::publish(exchange, routing_key, e.to_string()))?;

        let confirmation = confirm
            .await
            .map_err(|e| BrokerError::publish(exchange, routing_key, e.to_string()))?;
        if confirmation.is_nack() {
            return Err(BrokerError::publish(
                exchange,
                routing_key,
                "broker nacked the message",
            ));
        }
        Ok(())
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<Box<dyn Consumer>> {
        let channel = self
            .connection
            .create_channel()
            .await
            .map_err(|e| BrokerError::consume(queue, e.to_string()))?;
        channel
            .basic_qos(self.prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| BrokerError::consume(queue, e.to_string()))?;
        let consumer = channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::consume(queue, e.to_string()))?;

        debug!(queue, consumer_tag, prefetch = self.prefetch, "amqp consumer started");
        Ok(Box::new(AmqpConsumer {
            queue: queue.to_string(),
            channel,
            consumer,
        }))
    }

    /// Closes the connection and every channel on it
    async fn close(&self) -> Result<()> {
        self.connection
            .close(REPLY_SUCCESS, "gateway shutdown")
            .await
            .map_err(|_| BrokerError::Closed)?;
        debug!("amqp connection closed");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "amqp"
    }
}

struct AmqpConsumer {
    queue: String,
    channel: Channel,
    consumer: lapin::Consumer,
}

#[async_trait]
impl Consumer for AmqpConsumer {
    async fn next(&mut self) -> Option<Result<Delivery>> {
        let delivery = self.consumer.next().await?;
        Some(
            delivery
                .map(|d| Delivery {
                    tag: d.delivery_tag,
                    payload: Bytes::from(d.data),
                })
                .map_err(|e| BrokerError::consume(&self.queue, e.to_string())),
        )
    }

    async fn ack(&mut self, tag: u64) -> Result<()> {
        self.channel
            .basic_ack(tag, BasicAckOptions::default())
            .await
            .map_err(|e| BrokerError::Ack {
                tag,
                reason: e.to_string(),
            })
    }

    /// Closing the channel returns unacknowledged deliveries to the queue
    async fn cancel(&mut self) -> Result<()> {
        self.channel
            .close(REPLY_SUCCESS, "consumer cancelled")
            .await
            .map_err(|e| BrokerError::consume(&self.queue, e.to_string()))
    }
}
