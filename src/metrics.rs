use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing the progress of a pipeline run.
#[derive(Default)]
pub struct PipelineMetrics {
    processed: AtomicU64,
    skipped: AtomicU64,
    errored: AtomicU64,
    flushes: AtomicU64,
    modified: AtomicU64,
    write_failures: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a document whose enrichment value was produced.
    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a document skipped because its input field was missing.
    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a document that failed permanently or exhausted its retries.
    pub fn record_errored(&self) {
        self.errored.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a bulk write and how many documents it modified or failed to write.
    pub fn record_flush(&self, modified: u64, failed: u64) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.modified.fetch_add(modified, Ordering::Relaxed);
        self.write_failures.fetch_add(failed, Ordering::Relaxed);
    }

    /// Record results given up on after repeated failed bulk writes.
    pub fn record_dropped(&self, dropped: u64) {
        self.write_failures.fetch_add(dropped, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            errored: self.errored.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            modified: self.modified.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents enriched successfully.
    pub processed: u64,
    /// Documents skipped for missing input content.
    pub skipped: u64,
    /// Documents that failed permanently or exhausted their retries.
    pub errored: u64,
    /// Bulk writes issued.
    pub flushes: u64,
    /// Documents the store reported as modified.
    pub modified: u64,
    /// Documents the store reported as not written, or dropped after failed bulk writes.
    pub write_failures: u64,
}
