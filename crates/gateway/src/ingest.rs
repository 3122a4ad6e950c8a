//! Ingest loop
//!
//! Reads the three resources of one connection and forwards them to the
//! first pipeline stage:
//!
//! - `BATCH` → lines re-encoded as records (or passed through verbatim),
//!   wrapped in batch envelopes and sent round-robin to one replica
//! - `FIN`   → EOF envelope broadcast to every replica of the resource
//! - `ERROR` or a broken stream → ERROR envelope broadcast, connection ends
//!
//! The shard cursors are lent to the loop for the duration of a connection
//! and carry over to the next one.

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use analyzer_broker::{BrokerError, ShardTarget, ShardedPublisher};
use analyzer_config::{IngestConfig, LineFormat, ResourcesConfig};
use analyzer_protocol::{
    EncodeError, FieldDictionary, Message, ProtocolError, Resource, decode_line,
    encode_batch_envelope, encode_eof_envelope, encode_error_envelope, encode_line,
};

use crate::error::GatewayError;
use crate::metrics::GatewayMetrics;
use crate::wire::FrameReader;

/// Shard targets of the first stage, one per resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardTargets {
    targets: [ShardTarget; 3],
}

impl ShardTargets {
    pub fn new(movies: ShardTarget, credits: ShardTarget, ratings: ShardTarget) -> Self {
        Self {
            targets: [movies, credits, ratings],
        }
    }

    pub fn from_config(resources: &ResourcesConfig) -> Result<Self, BrokerError> {
        let [movies, credits, ratings] = Resource::ALL.map(|resource| {
            let target = resources.get(resource);
            ShardTarget::new(target.name_format(resource), target.replicas)
        });
        Ok(Self::new(movies?, credits?, ratings?))
    }

    pub fn get(&self, resource: Resource) -> &ShardTarget {
        &self.targets[resource.to_u8() as usize]
    }

    pub fn get_mut(&mut self, resource: Resource) -> &mut ShardTarget {
        &mut self.targets[resource.to_u8() as usize]
    }

    /// Targets in resource id order
    pub fn iter(&self) -> impl Iterator<Item = (Resource, &ShardTarget)> {
        Resource::ALL.into_iter().zip(self.targets.iter())
    }
}

/// What one successful ingest pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub resources: usize,
    pub batches: u64,
    pub lines: u64,
    pub envelopes: u64,
}

enum ResourceEnd {
    Finished,
    Aborted,
}

/// Drives the read half of a connection into the broker
#[derive(Debug, Clone)]
pub struct IngestLoop {
    publisher: ShardedPublisher,
    dictionary: Arc<FieldDictionary>,
    config: IngestConfig,
    metrics: Arc<GatewayMetrics>,
}

impl IngestLoop {
    pub fn new(
        publisher: ShardedPublisher,
        dictionary: Arc<FieldDictionary>,
        config: IngestConfig,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Self {
            publisher,
            dictionary,
            config,
            metrics,
        }
    }

    /// Receive every resource exactly once
    ///
    /// Returns early with an error on a protocol violation, a client
    /// `ERROR`, a broker failure or cancellation. In every case where a
    /// resource was open, its replicas are sent an ERROR envelope first.
    pub async fn run<R: AsyncRead + Unpin>(
        &self,
        reader: &mut FrameReader<R>,
        targets: &mut ShardTargets,
        cancel: &CancellationToken,
    ) -> Result<IngestSummary, GatewayError> {
        let mut summary = IngestSummary::default();
        let mut seen = [false; Resource::ALL.len()];

        for _ in Resource::ALL {
            let resource = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
                resource = reader.resource() => resource?,
            };
            let slot = &mut seen[resource.to_u8() as usize];
            if *slot {
                return Err(ProtocolError::DuplicateResource(resource.as_str()).into());
            }
            *slot = true;

            info!(resource = %resource, "receiving resource");
            let target = targets.get_mut(resource);
            let before = summary;

            match self
                .ingest_resource(reader, target, cancel, &mut summary)
                .await
            {
                Ok(ResourceEnd::Finished) => {
                    info!(
                        resource = %resource,
                        batches = summary.batches - before.batches,
                        lines = summary.lines - before.lines,
                        replicas = target.replicas(),
                        "resource received"
                    );
                    summary.resources += 1;
                }
                Ok(ResourceEnd::Aborted) => {
                    warn!(resource = %resource, "client aborted the upload");
                    self.abort(resource, target).await;
                    return Err(GatewayError::ClientAborted(resource));
                }
                Err(e) => {
                    self.abort(resource, target).await;
                    return Err(e);
                }
            }
        }

        info!(
            batches = summary.batches,
            lines = summary.lines,
            envelopes = summary.envelopes,
            "all resources received"
        );
        Ok(summary)
    }

    async fn ingest_resource<R: AsyncRead + Unpin>(
        &self,
        reader: &mut FrameReader<R>,
        target: &mut ShardTarget,
        cancel: &CancellationToken,
        summary: &mut IngestSummary,
    ) -> Result<ResourceEnd, GatewayError> {
        loop {
            let message = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
                message = reader.recv() => message?,
            };

            match message {
                Message::Batch(lines) => {
                    let bytes: usize = lines.iter().map(Bytes::len).sum();
                    self.metrics.batch_received(lines.len() as u64, bytes as u64);
                    summary.batches += 1;
                    summary.lines += lines.len() as u64;

                    for envelope in self.envelopes(&lines)? {
                        let key = self.publisher.direct(target, envelope).await?;
                        trace!(routing_key = %key, "batch envelope published");
                        summary.envelopes += 1;
                        self.metrics.envelopes_published(1);
                    }
                }
                Message::Fin => {
                    let reached = self
                        .publisher
                        .broadcast(target, encode_eof_envelope())
                        .await?;
                    summary.envelopes += reached as u64;
                    self.metrics.envelopes_published(reached as u64);
                    return Ok(ResourceEnd::Finished);
                }
                Message::Error => return Ok(ResourceEnd::Aborted),
            }
        }
    }

    /// Turn one client batch into the envelopes to publish
    ///
    /// Empty when no line survived.
    pub fn envelopes(&self, lines: &[Bytes]) -> Result<Vec<Bytes>, EncodeError> {
        let forwarded = match self.config.line_format {
            LineFormat::Raw => lines.to_vec(),
            LineFormat::Record => self.reencode(lines)?,
        };
        if forwarded.is_empty() {
            debug!(received = lines.len(), "batch had no forwardable lines");
            return Ok(Vec::new());
        }

        let chunk = match self.config.max_envelope_lines {
            0 => forwarded.len(),
            n => n,
        };
        Ok(forwarded.chunks(chunk).map(encode_batch_envelope).collect())
    }

    fn reencode(&self, lines: &[Bytes]) -> Result<Vec<Bytes>, EncodeError> {
        let mut out = Vec::with_capacity(lines.len());
        let mut dropped = 0u64;

        for line in lines {
            let record = decode_line(line, &self.dictionary);
            if record.is_empty() {
                dropped += 1;
                trace!(line = %String::from_utf8_lossy(line), "line has no known fields");
                continue;
            }
            out.push(encode_line(&record, &self.dictionary)?);
        }

        if dropped > 0 {
            self.metrics.lines_dropped(dropped);
        }
        Ok(out)
    }

    /// Tell every replica the resource will not complete
    async fn abort(&self, resource: Resource, target: &ShardTarget) {
        match self
            .publisher
            .broadcast(target, encode_error_envelope())
            .await
        {
            Ok(reached) => {
                self.metrics.envelopes_published(reached as u64);
                debug!(resource = %resource, replicas = reached, "error envelope broadcast");
            }
            Err(e) => {
                warn!(resource = %resource, error = %e, "failed to broadcast error envelope");
            }
        }
    }
}

#[cfg(test)]
#[path = "ingest_test.rs"]
mod tests;
