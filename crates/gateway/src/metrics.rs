//! Gateway counters
//!
//! Shared by the accept loop, the ingest loop and the relay loop of every
//! connection. All counters are monotonic except `connections_active`.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one gateway process
#[derive(Debug, Default)]
pub struct GatewayMetrics {
    /// Currently open client connections
    pub connections_active: AtomicU64,

    /// Client connections accepted
    pub connections_total: AtomicU64,

    /// BATCH frames received from clients
    pub batches_received: AtomicU64,

    /// Lines received from clients
    pub lines_received: AtomicU64,

    /// Line bytes received from clients
    pub bytes_received: AtomicU64,

    /// Lines that decoded to an empty record and were not forwarded
    pub lines_dropped: AtomicU64,

    /// Envelopes published to the broker (data, EOF and ERROR)
    pub envelopes_published: AtomicU64,

    /// Result frames written to clients
    pub results_relayed: AtomicU64,

    /// Result rows written to clients
    pub rows_relayed: AtomicU64,

    /// Result envelopes or rows that could not be relayed
    pub results_dropped: AtomicU64,

    /// Connections that ended with an error
    pub errors: AtomicU64,
}

impl GatewayMetrics {
    pub const fn new() -> Self {
        Self {
            connections_active: AtomicU64::new(0),
            connections_total: AtomicU64::new(0),
            batches_received: AtomicU64::new(0),
            lines_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            lines_dropped: AtomicU64::new(0),
            envelopes_published: AtomicU64::new(0),
            results_relayed: AtomicU64::new(0),
            rows_relayed: AtomicU64::new(0),
            results_dropped: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn connection_opened(&self) {
        self.connections_active.fetch_add(1, Ordering::Relaxed);
        self.connections_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a client batch
    #[inline]
    pub fn batch_received(&self, lines: u64, bytes: u64) {
        self.batches_received.fetch_add(1, Ordering::Relaxed);
        self.lines_received.fetch_add(lines, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    pub fn lines_dropped(&self, count: u64) {
        self.lines_dropped.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn envelopes_published(&self, count: u64) {
        self.envelopes_published.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a frame written to the client
    #[inline]
    pub fn result_relayed(&self, rows: u64) {
        self.results_relayed.fetch_add(1, Ordering::Relaxed);
        self.rows_relayed.fetch_add(rows, Ordering::Relaxed);
    }

    #[inline]
    pub fn result_dropped(&self) {
        self.results_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connections_total: self.connections_total.load(Ordering::Relaxed),
            batches_received: self.batches_received.load(Ordering::Relaxed),
            lines_received: self.lines_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            lines_dropped: self.lines_dropped.load(Ordering::Relaxed),
            envelopes_published: self.envelopes_published.load(Ordering::Relaxed),
            results_relayed: self.results_relayed.load(Ordering::Relaxed),
            rows_relayed: self.rows_relayed.load(Ordering::Relaxed),
            results_dropped: self.results_dropped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_active: u64,
    pub connections_total: u64,
    pub batches_received: u64,
    pub lines_received: u64,
    pub bytes_received: u64,
    pub lines_dropped: u64,
    pub envelopes_published: u64,
    pub results_relayed: u64,
    pub rows_relayed: u64,
    pub results_dropped: u64,
    pub errors: u64,
}
