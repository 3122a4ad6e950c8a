//! Result relay loop
//!
//! Drains the gateway's results queue and writes each query's rows back to
//! the connected client while ingest is still running on the read half.
//!
//! A delivery is acknowledged only after the frame it produced reached the
//! client. If the connection breaks first, the consumer is cancelled and the
//! broker hands the unacknowledged results to the next consumer.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use analyzer_broker::{Broker, BrokerError, Consumer};
use analyzer_config::RelayConfig;
use analyzer_protocol::{
    EnvelopeKind, FieldDictionary, ResultEnvelope, decode_lines, decode_result_envelope,
    render_eof, render_error, render_result_envelope, render_result_row,
};

use crate::error::GatewayError;
use crate::metrics::GatewayMetrics;
use crate::wire::FrameWriter;

const CONSUMER_TAG: &str = "gateway-relay";

/// Per-connection completion state of the expected queries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryProgress {
    /// Open queries and the EOF copies each still waits for
    pending: BTreeMap<u8, usize>,
}

impl QueryProgress {
    pub fn new(queries: &[u8], eof_copies: usize) -> Self {
        Self {
            pending: queries.iter().map(|&q| (q, eof_copies.max(1))).collect(),
        }
    }

    pub fn is_open(&self, query: u8) -> bool {
        self.pending.contains_key(&query)
    }

    /// Count one EOF; true when it completed the query
    pub fn eof(&mut self, query: u8) -> bool {
        let Some(remaining) = self.pending.get_mut(&query) else {
            return false;
        };
        *remaining -= 1;
        if *remaining == 0 {
            self.pending.remove(&query);
            true
        } else {
            false
        }
    }

    /// Close a query as failed; true if it was still open
    pub fn fail(&mut self, query: u8) -> bool {
        self.pending.remove(&query).is_some()
    }

    pub fn is_complete(&self) -> bool {
        self.pending.is_empty()
    }

    /// Queries still waiting, ascending
    pub fn open_queries(&self) -> impl Iterator<Item = u8> + '_ {
        self.pending.keys().copied()
    }
}

/// What one relay pass delivered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelaySummary {
    pub frames: u64,
    pub rows: u64,
    pub dropped: u64,
    pub failed_queries: usize,
}

/// A frame ready for the client
#[derive(Debug)]
struct Outgoing {
    frame: Bytes,
    rows: usize,
}

/// Drives the results queue into the write half of a connection
#[derive(Clone)]
pub struct RelayLoop {
    broker: Arc<dyn Broker>,
    queue: String,
    dictionary: Arc<FieldDictionary>,
    config: RelayConfig,
    metrics: Arc<GatewayMetrics>,
}

impl RelayLoop {
    pub fn new(
        broker: Arc<dyn Broker>,
        queue: impl Into<String>,
        dictionary: Arc<FieldDictionary>,
        config: RelayConfig,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Self {
            broker,
            queue: queue.into(),
            dictionary,
            config,
            metrics,
        }
    }

    /// Relay until every configured query reported EOF or ERROR
    pub async fn run<W: AsyncWrite + Unpin>(
        &self,
        writer: &mut FrameWriter<W>,
        cancel: &CancellationToken,
    ) -> Result<RelaySummary, GatewayError> {
        let mut consumer = self.broker.consume(&self.queue, CONSUMER_TAG).await?;
        debug!(queue = %self.queue, queries = ?self.config.queries, "relay started");

        let result = self.drain(consumer.as_mut(), writer, cancel).await;

        if let Err(e) = consumer.cancel().await {
            warn!(queue = %self.queue, error = %e, "failed to cancel result consumer");
        }
        result
    }

    async fn drain<W: AsyncWrite + Unpin>(
        &self,
        consumer: &mut dyn Consumer,
        writer: &mut FrameWriter<W>,
        cancel: &CancellationToken,
    ) -> Result<RelaySummary, GatewayError> {
        let mut progress = QueryProgress::new(&self.config.queries, self.config.eof_copies);
        let mut summary = RelaySummary::default();

        while !progress.is_complete() {
            let delivery = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
                delivery = consumer.next() => match delivery {
                    Some(delivery) => delivery?,
                    None => return Err(BrokerError::Closed.into()),
                },
            };

            match self.handle(delivery.payload, &mut progress, &mut summary) {
                Some(out) => {
                    writer.send(&out.frame).await?;
                    summary.frames += 1;
                    summary.rows += out.rows as u64;
                    self.metrics.result_relayed(out.rows as u64);
                }
                None => trace!(tag = delivery.tag, "nothing to relay"),
            }
            consumer.ack(delivery.tag).await?;
        }

        info!(
            frames = summary.frames,
            rows = summary.rows,
            dropped = summary.dropped,
            failed = summary.failed_queries,
            "all query results relayed"
        );
        Ok(summary)
    }

    /// Turn one result envelope into the frame to send, if any
    fn handle(
        &self,
        payload: Bytes,
        progress: &mut QueryProgress,
        summary: &mut RelaySummary,
    ) -> Option<Outgoing> {
        let envelope = match decode_result_envelope(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "dropping undecodable result envelope");
                self.drop_result(summary);
                return None;
            }
        };

        let query = envelope.query;
        if !progress.is_open(query) {
            debug!(query, kind = envelope.kind.as_str(), "result for a query that is not open");
            self.drop_result(summary);
            return None;
        }

        match envelope.kind {
            EnvelopeKind::Batch => self.render_batch(&envelope, summary),
            EnvelopeKind::Eof => {
                if !progress.eof(query) {
                    debug!(query, "partial EOF received");
                    return None;
                }
                info!(query, "query complete");
                Some(Outgoing {
                    frame: render_eof(query),
                    rows: 0,
                })
            }
            EnvelopeKind::Error => {
                progress.fail(query);
                summary.failed_queries += 1;
                warn!(query, "query failed upstream");
                Some(Outgoing {
                    frame: render_error(query),
                    rows: 0,
                })
            }
        }
    }

    fn render_batch(&self, envelope: &ResultEnvelope, summary: &mut RelaySummary) -> Option<Outgoing> {
        let query = envelope.query;
        let mut rows = Vec::new();

        for record in decode_lines(&envelope.payload, &self.dictionary) {
            match render_result_row(&record, query) {
                Ok(row) => rows.push(row),
                Err(e) => {
                    warn!(query, error = %e, "skipping result row");
                    self.drop_result(summary);
                }
            }
        }

        if rows.is_empty() {
            debug!(query, "result batch had no renderable rows");
            return None;
        }
        debug!(query, rows = rows.len(), "relaying result batch");
        Some(Outgoing {
            frame: render_result_envelope(EnvelopeKind::Batch, query, &rows),
            rows: rows.len(),
        })
    }

    fn drop_result(&self, summary: &mut RelaySummary) {
        summary.dropped += 1;
        self.metrics.result_dropped();
    }
}

impl std::fmt::Debug for RelayLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayLoop")
            .field("broker", &self.broker.name())
            .field("queue", &self.queue)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
#[path = "relay_test.rs"]
mod tests;
