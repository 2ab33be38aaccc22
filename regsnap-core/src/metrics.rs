//! # Metrics
//!
//! Cumulative counters for monitoring the mirror across refresh cycles.
//! Per-refresh statistics are reported separately by the ingest pipeline.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    // Refresh metrics
    refreshes: AtomicU64,
    records_processed: AtomicU64,
    entries_added: AtomicU64,
    entries_updated: AtomicU64,
    entries_removed: AtomicU64,

    // Error metrics
    record_decode_errors: AtomicU64,
    value_parse_errors: AtomicU64,

    // Query metrics
    queries_executed: AtomicU64,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                refreshes: AtomicU64::new(0),
                records_processed: AtomicU64::new(0),
                entries_added: AtomicU64::new(0),
                entries_updated: AtomicU64::new(0),
                entries_removed: AtomicU64::new(0),
                record_decode_errors: AtomicU64::new(0),
                value_parse_errors: AtomicU64::new(0),
                queries_executed: AtomicU64::new(0),
            }),
        }
    }

    /// Record a completed refresh
    pub fn record_refresh(&self, records: u64, added: u64, updated: u64, removed: u64) {
        self.inner.refreshes.fetch_add(1, Ordering::Relaxed);
        self.inner.records_processed.fetch_add(records, Ordering::Relaxed);
        self.inner.entries_added.fetch_add(added, Ordering::Relaxed);
        self.inner.entries_updated.fetch_add(updated, Ordering::Relaxed);
        self.inner.entries_removed.fetch_add(removed, Ordering::Relaxed);
    }

    /// Record a record that failed to decode
    pub fn record_decode_error(&self) {
        self.inner.record_decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record resource values dropped by value-level parse failures
    pub fn record_value_parse_errors(&self, count: u64) {
        if count > 0 {
            self.inner.value_parse_errors.fetch_add(count, Ordering::Relaxed);
        }
    }

    /// Record query execution
    pub fn record_query(&self) {
        self.inner.queries_executed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            refreshes: self.inner.refreshes.load(Ordering::Relaxed),
            records_processed: self.inner.records_processed.load(Ordering::Relaxed),
            entries_added: self.inner.entries_added.load(Ordering::Relaxed),
            entries_updated: self.inner.entries_updated.load(Ordering::Relaxed),
            entries_removed: self.inner.entries_removed.load(Ordering::Relaxed),
            record_decode_errors: self.inner.record_decode_errors.load(Ordering::Relaxed),
            value_parse_errors: self.inner.value_parse_errors.load(Ordering::Relaxed),
            queries_executed: self.inner.queries_executed.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics snapshot
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub refreshes: u64,
    pub records_processed: u64,
    pub entries_added: u64,
    pub entries_updated: u64,
    pub entries_removed: u64,
    pub record_decode_errors: u64,
    pub value_parse_errors: u64,
    pub queries_executed: u64,
}
