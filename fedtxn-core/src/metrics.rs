use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;

/// Lifetime counters for the coordinator.
#[derive(Clone)]
pub struct TransactionMetrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    started_at: Instant,
    started_at_ms: u64,
    begun: AtomicU64,
    committed: AtomicU64,
    commit_failures: AtomicU64,
    aborted: AtomicU64,
    expired: AtomicU64,
    write_rejections: AtomicU64,
}

#[derive(Clone, Serialize)]
pub struct TransactionMetricsSnapshot {
    pub started_at_ms: u64,
    pub uptime_ms: u64,
    pub active: usize,
    pub begun: u64,
    pub committed: u64,
    pub commit_failures: u64,
    pub aborted: u64,
    pub expired: u64,
    pub write_rejections: u64,
}

impl Default for TransactionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionMetrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                started_at: Instant::now(),
                started_at_ms: now_millis(),
                begun: AtomicU64::new(0),
                committed: AtomicU64::new(0),
                commit_failures: AtomicU64::new(0),
                aborted: AtomicU64::new(0),
                expired: AtomicU64::new(0),
                write_rejections: AtomicU64::new(0),
            }),
        }
    }

    pub fn record_begun(&self) {
        self.inner.begun.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_committed(&self) {
        self.inner.committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_commit_failure(&self) {
        self.inner.commit_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_aborted(&self) {
        self.inner.aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expired(&self) {
        self.inner.expired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_rejection(&self) {
        self.inner.write_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, active: usize) -> TransactionMetricsSnapshot {
        TransactionMetricsSnapshot {
            started_at_ms: self.inner.started_at_ms,
            uptime_ms: self.inner.started_at.elapsed().as_millis() as u64,
            active,
            begun: self.inner.begun.load(Ordering::Relaxed),
            committed: self.inner.committed.load(Ordering::Relaxed),
            commit_failures: self.inner.commit_failures.load(Ordering::Relaxed),
            aborted: self.inner.aborted.load(Ordering::Relaxed),
            expired: self.inner.expired.load(Ordering::Relaxed),
            write_rejections: self.inner.write_rejections.load(Ordering::Relaxed),
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_events() {
        let metrics = TransactionMetrics::new();
        metrics.record_begun();
        metrics.record_begun();
        metrics.record_committed();
        metrics.record_aborted();
        metrics.record_expired();
        metrics.record_write_rejection();

        let clone = metrics.clone();
        clone.record_commit_failure();

        let snapshot = metrics.snapshot(1);
        assert_eq!(snapshot.active, 1);
        assert_eq!(snapshot.begun, 2);
        assert_eq!(snapshot.committed, 1);
        assert_eq!(snapshot.commit_failures, 1);
        assert_eq!(snapshot.aborted, 1);
        assert_eq!(snapshot.expired, 1);
        assert_eq!(snapshot.write_rejections, 1);
        assert!(snapshot.started_at_ms > 0);
    }
}
