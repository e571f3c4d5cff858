//! Atomic proxy counters.
//!
//! Lock-free monotonic counters with `Relaxed` ordering. These are display
//! values only, with no synchronization requirements.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

struct StatsInner {
    total_requests: AtomicU64,
    streamed_responses: AtomicU64,
    upstream_errors: AtomicU64,
    records_written: AtomicU64,
    record_write_failures: AtomicU64,
}

/// Thread-safe proxy statistics. Cheap to clone (Arc).
#[derive(Clone)]
pub struct ProxyStats {
    inner: Arc<StatsInner>,
}

/// Snapshot of current stats values, serializable to JSON.
#[derive(Debug, Serialize)]
pub struct StatsSnapshot {
    pub total_requests: u64,
    pub streamed_responses: u64,
    pub upstream_errors: u64,
    pub records_written: u64,
    pub record_write_failures: u64,
}

impl ProxyStats {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StatsInner {
                total_requests: AtomicU64::new(0),
                streamed_responses: AtomicU64::new(0),
                upstream_errors: AtomicU64::new(0),
                records_written: AtomicU64::new(0),
                record_write_failures: AtomicU64::new(0),
            }),
        }
    }

    pub fn inc_requests(&self) {
        self.inner.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_streamed(&self) {
        self.inner.streamed_responses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_upstream_errors(&self) {
        self.inner.upstream_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_records_written(&self) {
        self.inner.records_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_write_failures(&self) {
        self.inner
            .record_write_failures
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_requests: self.inner.total_requests.load(Ordering::Relaxed),
            streamed_responses: self.inner.streamed_responses.load(Ordering::Relaxed),
            upstream_errors: self.inner.upstream_errors.load(Ordering::Relaxed),
            records_written: self.inner.records_written.load(Ordering::Relaxed),
            record_write_failures: self.inner.record_write_failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for ProxyStats {
    fn default() -> Self {
        Self::new()
    }
}
