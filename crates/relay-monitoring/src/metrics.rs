//! Sync channel metrics, emitted as structured log events and kept as counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Counters for snapshot pushes, step result reports and resyncs
#[derive(Debug, Default)]
pub struct SyncMetrics {
    pushes_ok: AtomicU64,
    pushes_failed: AtomicU64,
    reports_ok: AtomicU64,
    reports_failed: AtomicU64,
    retries: AtomicU64,
    dead_letters: AtomicU64,
    resyncs: AtomicU64,
}

/// Point-in-time copy of [`SyncMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetricsSnapshot {
    /// Snapshots delivered
    pub pushes_ok: u64,
    /// Snapshot deliveries that failed after retries
    pub pushes_failed: u64,
    /// Step results delivered
    pub reports_ok: u64,
    /// Step result deliveries that failed after retries
    pub reports_failed: u64,
    /// Retry attempts across all deliveries
    pub retries: u64,
    /// Messages parked after exhausting retries
    pub dead_letters: u64,
    /// Completed resyncs
    pub resyncs: u64,
}

impl SyncMetrics {
    /// Create zeroed metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a snapshot push
    pub fn record_push(&self, request_id: u64, transport: &str, duration_ms: f64, success: bool) {
        let counter = if success { &self.pushes_ok } else { &self.pushes_failed };
        counter.fetch_add(1, Ordering::Relaxed);
        info!(request_id, transport, duration_ms, success, "Snapshot push");
    }

    /// Record a step result report
    pub fn record_report(&self, request_id: u64, transport: &str, duration_ms: f64, success: bool) {
        let counter = if success { &self.reports_ok } else { &self.reports_failed };
        counter.fetch_add(1, Ordering::Relaxed);
        info!(request_id, transport, duration_ms, success, "Step result report");
    }

    /// Record one retry attempt
    pub fn record_retry(&self, operation: &str, attempt: u32, delay_ms: u64) {
        self.retries.fetch_add(1, Ordering::Relaxed);
        info!(operation, attempt, delay_ms, "Sync retry");
    }

    /// Record a message parked in a dead-letter list
    pub fn record_dead_letter(&self, request_id: u64, message_kind: &str, partition: usize) {
        self.dead_letters.fetch_add(1, Ordering::Relaxed);
        info!(request_id, message_kind, partition, "Dead letter");
    }

    /// Record a completed resync
    pub fn record_resync(&self, received: usize, indexed: usize, duration_ms: f64) {
        self.resyncs.fetch_add(1, Ordering::Relaxed);
        info!(received, indexed, duration_ms, "Projection resync");
    }

    /// Current counter values
    pub fn snapshot(&self) -> SyncMetricsSnapshot {
        SyncMetricsSnapshot {
            pushes_ok: self.pushes_ok.load(Ordering::Relaxed),
            pushes_failed: self.pushes_failed.load(Ordering::Relaxed),
            reports_ok: self.reports_ok.load(Ordering::Relaxed),
            reports_failed: self.reports_failed.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            dead_letters: self.dead_letters.load(Ordering::Relaxed),
            resyncs: self.resyncs.load(Ordering::Relaxed),
        }
    }
}
