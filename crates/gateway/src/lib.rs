//! Analyzer Gateway
//!
//! Entry point of the analysis pipeline. A client uploads three CSV
//! resources over one TCP connection; the gateway re-encodes every line,
//! spreads the batches over the replicas of the first pipeline stage and
//! relays per-query results back on the same socket while the upload is
//! still running.
//!
//! # Architecture
//!
//! ```text
//! client ──► Listener ──► FrameReader ──► IngestLoop ──► ShardedPublisher ──► broker
//!                                                                              │
//! client ◄── FrameWriter ◄── RelayLoop ◄──── results queue ◄──── stages ◄──────┘
//! ```
//!
//! - [`wire`] - listener, connection halves and client framing
//! - [`ingest`] - resource/batch handling, envelope building, EOF broadcast
//! - [`relay`] - result decoding, query projection, EOF aggregation
//! - [`server`] - topology declaration and per-connection orchestration

mod error;
mod metrics;

pub mod ingest;
pub mod relay;
pub mod server;
pub mod wire;

pub use error::GatewayError;
pub use ingest::{IngestLoop, IngestSummary, ShardTargets};
pub use metrics::{GatewayMetrics, MetricsSnapshot};
pub use relay::{QueryProgress, RelayLoop, RelaySummary};
pub use server::{Gateway, connect_broker};
pub use wire::{FrameReader, FrameWriter, Listener, Stream};
