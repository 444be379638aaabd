use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

/// Per-record outcome counters shared by every delivery task of one run.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    delivered: AtomicU64,
    rejected: AtomicU64,
    retried: AtomicU64,
    abandoned: AtomicU64,
    cancelled: AtomicU64,
    encode_failures: AtomicU64,
}

impl DeliveryStats {
    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_abandoned(&self) {
        self.abandoned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancelled(&self, count: u64) {
        self.cancelled.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_encode_failure(&self) {
        self.encode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn summary(&self) -> DeliverySummary {
        DeliverySummary {
            delivered: self.delivered.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            encode_failures: self.encode_failures.load(Ordering::Relaxed),
            panicked_tasks: 0,
            discarded_batches: 0,
        }
    }
}

/// Snapshot of a run's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliverySummary {
    /// Writes answered with a status in `[200, 400)`
    pub delivered: u64,
    /// Writes answered with any other status; never retried
    pub rejected: u64,
    /// Transport failures followed by another attempt
    pub retried: u64,
    /// Records whose retry budget ran out
    pub abandoned: u64,
    /// Records left undelivered by a forced shutdown
    pub cancelled: u64,
    pub encode_failures: u64,
    pub panicked_tasks: u64,
    /// Queued batches dropped by a forced shutdown or an interrupted submit
    pub discarded_batches: u64,
}

impl fmt::Display for DeliverySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "delivered={} rejected={} retried={} abandoned={} cancelled={} \
             encode_failures={} panicked_tasks={} discarded_batches={}",
            self.delivered,
            self.rejected,
            self.retried,
            self.abandoned,
            self.cancelled,
            self.encode_failures,
            self.panicked_tasks,
            self.discarded_batches
        )
    }
}
