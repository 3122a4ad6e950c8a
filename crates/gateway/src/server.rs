//! Gateway orchestrator
//!
//! Owns the broker handle, the shard cursors and both per-connection loops.
//! Connections are served one at a time: the relay side consumes a single
//! results queue, so results of two concurrent clients could not be told
//! apart.
//!
//! Per connection, the read half drives the ingest loop on the accept task
//! while a spawned task drives the relay loop on the write half. Whichever
//! side fails first cancels the other through a shared token. Once the
//! upload is complete the read half is watched for the client leaving, so
//! a relay waiting on results never outlives its client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use analyzer_broker::{
    AmqpBroker, Broker, BrokerError, ExchangeKind, MemoryBroker, ShardedPublisher,
};
use analyzer_config::{BrokerConfig, BrokerKind, Config};
use analyzer_protocol::ProtocolError;

use crate::error::GatewayError;
use crate::ingest::{IngestLoop, ShardTargets};
use crate::metrics::GatewayMetrics;
use crate::relay::RelayLoop;
use crate::wire::{Listener, Stream};

/// Pause after a failed accept so a persistent failure does not spin
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Open the broker named by the config
pub async fn connect_broker(config: &BrokerConfig) -> Result<Arc<dyn Broker>, BrokerError> {
    match config.kind {
        BrokerKind::Amqp => {
            let broker = AmqpBroker::connect(&config.url, config.prefetch).await?;
            Ok(Arc::new(broker))
        }
        BrokerKind::Memory => {
            warn!("using in-memory broker; nothing leaves this process");
            Ok(Arc::new(MemoryBroker::new()))
        }
    }
}

/// Connection orchestrator
pub struct Gateway {
    config: Config,
    broker: Arc<dyn Broker>,
    targets: ShardTargets,
    ingest: IngestLoop,
    relay: RelayLoop,
    metrics: Arc<GatewayMetrics>,
}

impl Gateway {
    pub fn new(config: Config, broker: Arc<dyn Broker>) -> Result<Self, GatewayError> {
        let dictionary = Arc::new(config.field_dictionary()?);
        let targets = ShardTargets::from_config(&config.resources)?;
        let metrics = Arc::new(GatewayMetrics::new());

        let ingest = IngestLoop::new(
            ShardedPublisher::new(Arc::clone(&broker), config.broker.output_exchange.clone()),
            Arc::clone(&dictionary),
            config.ingest.clone(),
            Arc::clone(&metrics),
        );
        let relay = RelayLoop::new(
            Arc::clone(&broker),
            config.broker.results_queue.clone(),
            dictionary,
            config.relay.clone(),
            Arc::clone(&metrics),
        );

        Ok(Self {
            config,
            broker,
            targets,
            ingest,
            relay,
            metrics,
        })
    }

    pub fn metrics(&self) -> &Arc<GatewayMetrics> {
        &self.metrics
    }

    pub fn targets(&self) -> &ShardTargets {
        &self.targets
    }

    /// Release the broker connection once serving is over
    pub async fn close(self) -> Result<(), GatewayError> {
        self.broker.close().await?;
        info!(broker = self.broker.name(), "broker connection closed");
        Ok(())
    }

    /// Declare exchanges, replica queues and the results queue
    ///
    /// Every replica queue is bound to the output exchange under its own
    /// name, which is the routing key the shard target produces for it.
    pub async fn declare_topology(&self) -> Result<(), GatewayError> {
        let broker = &self.config.broker;

        self.broker
            .declare_exchange(&broker.output_exchange, ExchangeKind::Direct)
            .await?;
        for (resource, target) in self.targets.iter() {
            for queue in target.keys() {
                self.broker.declare_queue(&queue).await?;
                self.broker
                    .bind(&broker.output_exchange, &queue, &queue)
                    .await?;
            }
            debug!(resource = %resource, replicas = target.replicas(), "replica queues declared");
        }

        self.broker
            .declare_exchange(&broker.input_exchange, ExchangeKind::Direct)
            .await?;
        self.broker.declare_queue(&broker.results_queue).await?;
        self.broker
            .bind(&broker.input_exchange, &broker.results_queue, &broker.results_queue)
            .await?;

        info!(
            broker = self.broker.name(),
            output_exchange = %broker.output_exchange,
            input_exchange = %broker.input_exchange,
            results_queue = %broker.results_queue,
            "broker topology declared"
        );
        Ok(())
    }

    /// Accept and serve clients until the listener is shut down
    ///
    /// A connection in progress when shutdown is requested is served to the
    /// end before this returns.
    pub async fn run(&mut self, listener: &Listener) -> Result<(), GatewayError> {
        info!(address = %listener.local_addr(), "gateway accepting clients");

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(Some(accepted)) => accepted,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "accept error");
                    self.metrics.error();
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            self.metrics.connection_opened();
            if let Err(e) = self.serve_connection(stream, peer).await {
                self.metrics.error();
                if e.is_disconnect() {
                    info!(peer = %peer, error = %e, "client disconnected");
                } else {
                    warn!(peer = %peer, error = %e, "connection failed");
                }
            }
            self.metrics.connection_closed();

            let s = self.metrics.snapshot();
            info!(
                peer = %peer,
                lines_received = s.lines_received,
                envelopes_published = s.envelopes_published,
                results_relayed = s.results_relayed,
                "connection closed"
            );
        }

        let s = self.metrics.snapshot();
        info!(
            connections = s.connections_total,
            batches = s.batches_received,
            lines = s.lines_received,
            dropped_lines = s.lines_dropped,
            envelopes = s.envelopes_published,
            results = s.results_relayed,
            rows = s.rows_relayed,
            dropped_results = s.results_dropped,
            errors = s.errors,
            "gateway stopped"
        );
        Ok(())
    }

    /// Run ingest and relay for one client until both are done
    pub async fn serve_connection(
        &mut self,
        stream: Stream,
        peer: SocketAddr,
    ) -> Result<(), GatewayError> {
        let server = &self.config.server;
        let keepalive = (server.keepalive_secs > 0).then(|| Duration::from_secs(server.keepalive_secs));
        stream.configure(server.nodelay, keepalive);
        let (mut reader, mut writer) = stream.split(server.max_line_size);
        info!(peer = %peer, "client connected");

        let cancel = CancellationToken::new();
        let relay = self.relay.clone();
        let relay_cancel = cancel.clone();
        let mut relay_task = tokio::spawn(async move {
            let result = relay.run(&mut writer, &relay_cancel).await;
            if result.is_err() {
                relay_cancel.cancel();
            }
            (writer, result)
        });

        let ingested = self
            .ingest
            .run(&mut reader, &mut self.targets, &cancel)
            .await;

        // After the upload the read half only reports the peer leaving,
        // which is the one thing that ends a relay still waiting on results
        let mut peer_left = false;
        let joined = if ingested.is_err() {
            cancel.cancel();
            relay_task.await
        } else {
            let finished = tokio::select! {
                biased;
                joined = &mut relay_task => Some(joined),
                closed = reader.closed() => {
                    if let Err(e) = closed {
                        debug!(peer = %peer, error = %e, "read half failed after upload");
                    }
                    None
                }
            };
            match finished {
                Some(joined) => joined,
                None => {
                    peer_left = true;
                    cancel.cancel();
                    relay_task.await
                }
            }
        };

        let relayed = match joined {
            Ok((mut writer, result)) => {
                if let Err(e) = writer.shutdown().await {
                    debug!(peer = %peer, error = %e, "shutdown of write half failed");
                }
                result
            }
            Err(e) => Err(GatewayError::Task(e.to_string())),
        };

        match (ingested, relayed) {
            (Ok(ingest), Ok(relay)) => {
                info!(
                    peer = %peer,
                    lines = ingest.lines,
                    envelopes = ingest.envelopes,
                    frames = relay.frames,
                    rows = relay.rows,
                    "client served"
                );
                Ok(())
            }
            // A cancelled side only reports that the other one failed
            (Err(GatewayError::Cancelled), Err(e)) => Err(e),
            (Ok(_), Err(GatewayError::Cancelled)) if peer_left => {
                Err(ProtocolError::ConnectionClosed { field: "results" }.into())
            }
            (Err(e), _) | (_, Err(e)) => Err(e),
        }
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("broker", &self.broker.name())
            .field("targets", &self.targets)
            .field("ingest", &self.ingest)
            .field("relay", &self.relay)
            .finish()
    }
}

#[cfg(test)]
#[path = "server_test.rs"]
mod tests;
