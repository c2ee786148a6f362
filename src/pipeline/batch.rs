//! Buffered bulk writes of enrichment results.

use super::EnrichmentResult;
use crate::metrics::PipelineMetrics;
use crate::store::{DocumentStore, FieldUpdate};

/// Consecutive failed bulk writes after which the buffered results are dropped.
pub const MAX_WRITE_ATTEMPTS: usize = 3;

/// Result of one flush attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushOutcome {
    /// Results sent to the store.
    pub attempted: usize,
    /// Documents the store reported as modified.
    pub modified: usize,
    /// Documents the store reported as not written.
    pub failed: usize,
    /// Results kept in the buffer because the request itself failed.
    pub retained: usize,
    /// Results discarded after [`MAX_WRITE_ATTEMPTS`] failed requests in a row.
    pub dropped: usize,
}

/// Accumulates results and writes them with a single bulk upsert per flush.
///
/// The buffer is cleared after every flush the store answers, even when it reports per-document
/// failures. When the request fails outright the results stay buffered and are sent again once
/// another `threshold` results arrive, or at the final flush. After [`MAX_WRITE_ATTEMPTS`] failed
/// requests in a row the buffer is dropped and counted as write failures, so it never holds more
/// than `threshold * MAX_WRITE_ATTEMPTS` results.
pub struct BatchWriter<'a> {
    store: &'a dyn DocumentStore,
    target_field: String,
    threshold: usize,
    buffer: Vec<EnrichmentResult>,
    /// Results added since the last flush attempt.
    pending: usize,
    failed_attempts: usize,
    metrics: &'a PipelineMetrics,
}

impl<'a> BatchWriter<'a> {
    /// Create a writer that flushes every `threshold` results.
    pub fn new(
        store: &'a dyn DocumentStore,
        target_field: impl Into<String>,
        threshold: usize,
        metrics: &'a PipelineMetrics,
    ) -> Self {
        let threshold = threshold.max(1);
        Self {
            store,
            target_field: target_field.into(),
            threshold,
            buffer: Vec::with_capacity(threshold),
            pending: 0,
            failed_attempts: 0,
            metrics,
        }
    }

    /// Number of buffered results.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Buffer `result`, flushing once `threshold` results arrived since the last attempt.
    pub async fn add(&mut self, result: EnrichmentResult) -> Option<FlushOutcome> {
        self.buffer.push(result);
        self.pending += 1;
        if self.pending >= self.threshold {
            Some(self.flush().await)
        } else {
            None
        }
    }

    /// Write every buffered result in one bulk upsert.
    pub async fn flush(&mut self) -> FlushOutcome {
        if self.buffer.is_empty() {
            return FlushOutcome::default();
        }
        self.pending = 0;

        let updates = self
            .buffer
            .iter()
            .map(|result| FieldUpdate {
                id: result.id.clone(),
                field: self.target_field.clone(),
                value: result.value.clone(),
            })
            .collect::<Vec<_>>();
        let attempted = updates.len();

        match self.store.bulk_upsert(updates).await {
            Ok(report) => {
                self.buffer.clear();
                self.failed_attempts = 0;
                for failure in &report.errors {
                    tracing::warn!(
                        document_id = %failure.id,
                        error = %failure.message,
                        "Bulk write did not apply update"
                    );
                }
                let failed = report.errors.len();
                self.metrics
                    .record_flush(report.modified_count as u64, failed as u64);
                tracing::info!(
                    batch = attempted,
                    modified = report.modified_count,
                    failed,
                    "Flushed enrichment batch"
                );
                FlushOutcome {
                    attempted,
                    modified: report.modified_count,
                    failed,
                    ..FlushOutcome::default()
                }
            }
            Err(error) if self.failed_attempts + 1 >= MAX_WRITE_ATTEMPTS => {
                self.buffer.clear();
                self.failed_attempts = 0;
                self.metrics.record_dropped(attempted as u64);
                tracing::error!(
                    batch = attempted,
                    attempts = MAX_WRITE_ATTEMPTS,
                    error = %error,
                    "Bulk write failed repeatedly; dropping buffered results"
                );
                FlushOutcome {
                    attempted,
                    dropped: attempted,
                    ..FlushOutcome::default()
                }
            }
            Err(error) => {
                self.failed_attempts += 1;
                tracing::error!(
                    batch = attempted,
                    attempt = self.failed_attempts,
                    error = %error,
                    "Bulk write failed; keeping results for the next flush"
                );
                FlushOutcome {
                    attempted,
                    retained: self.buffer.len(),
                    ..FlushOutcome::default()
                }
            }
        }
    }
}
