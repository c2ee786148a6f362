//! Per-document enrichment loop.

use super::batch::{BatchWriter, FlushOutcome};
use super::checkpoint::{ResumableScan, ScanError};
use super::invoker::InferenceInvoker;
use super::retry::{RetryError, RetryPolicy};
use super::{PipelineError, RunSummary, Termination, WorkItem};
use crate::config::PipelineSettings;
use crate::enrichment::Enricher;
use crate::metrics::PipelineMetrics;
use crate::store::{DocumentStore, ScanQuery};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Drives one enrichment task over every eligible document in the store.
pub struct Pipeline {
    store: Arc<dyn DocumentStore>,
    enricher: Arc<dyn Enricher>,
    settings: PipelineSettings,
}

impl Pipeline {
    /// Assemble a pipeline for `enricher` over `store`.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        enricher: Arc<dyn Enricher>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            enricher,
            settings,
        }
    }

    /// Settings applied to each run.
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Number of documents the task would currently process.
    pub async fn count_eligible(&self) -> Result<u64, PipelineError> {
        self.store
            .count_matching(&self.enricher.eligibility())
            .await
            .map_err(PipelineError::Startup)
    }

    /// Process eligible documents until the work source is exhausted or `cancel` fires.
    ///
    /// Individual document failures are counted and never end the run. The buffer is flushed
    /// before returning, whatever the reason for stopping.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunSummary, PipelineError> {
        let task = self.enricher.name().to_string();
        let target_field = self.enricher.target_field().to_string();
        let total_eligible = self.count_eligible().await?;
        tracing::info!(
            task = %task,
            target_field = %target_field,
            total_eligible,
            "Starting enrichment run"
        );

        let metrics = PipelineMetrics::new();
        let policy = RetryPolicy::from(&self.settings);
        let invoker = InferenceInvoker::new(self.enricher.as_ref());
        let mut writer = BatchWriter::new(
            self.store.as_ref(),
            target_field.clone(),
            self.settings.batch_flush_size,
            &metrics,
        );
        let mut scan = ResumableScan::open(
            self.store.as_ref(),
            ScanQuery {
                filter: self.enricher.eligibility(),
                exclude_up_to: None,
                batch_size: self.settings.scan_batch_size,
                max_scan_duration: self.settings.max_scan_duration,
            },
        );

        let termination = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Termination::Cancelled,
                next = scan.next() => next,
            };

            let document = match next {
                Ok(Some(document)) => document,
                Ok(None) => break Termination::Exhausted,
                Err(ScanError::Unrecoverable { elapsed }) => {
                    tracing::warn!(
                        task = %task,
                        ?elapsed,
                        processed = metrics.snapshot().processed,
                        "Halting run: scan cannot be resumed"
                    );
                    break Termination::ScanUnrecoverable;
                }
                Err(ScanError::Store(error)) => {
                    tracing::error!(task = %task, error = %error, "Work source failed");
                    writer.flush().await;
                    return Err(PipelineError::Store(error));
                }
            };

            let item = WorkItem::new(document, target_field.as_str());
            if let Err(fault) = invoker.input(&item) {
                metrics.record_skipped();
                tracing::warn!(
                    document_id = %item.document.id,
                    error = %fault,
                    "Skipping document without input"
                );
                continue;
            }

            match policy.execute(cancel, || invoker.invoke(&item)).await {
                Ok(result) => {
                    metrics.record_processed();
                    if let Some(outcome) = writer.add(result).await {
                        log_progress(&metrics, total_eligible, outcome);
                    }
                }
                Err(RetryError::Cancelled) => break Termination::Cancelled,
                Err(error) => {
                    metrics.record_errored();
                    tracing::error!(
                        document_id = %item.document.id,
                        error = %error,
                        "Document enrichment failed"
                    );
                }
            }
        };

        let outcome = writer.flush().await;
        if outcome.attempted > 0 {
            log_progress(&metrics, total_eligible, outcome);
        }
        if !writer.is_empty() {
            tracing::error!(
                unflushed = writer.len(),
                "Results could not be written before shutdown"
            );
        }

        let counters = metrics.snapshot();
        let summary = RunSummary {
            task,
            total_eligible,
            processed: counters.processed,
            skipped: counters.skipped,
            errored: counters.errored,
            flushes: counters.flushes,
            modified: counters.modified,
            write_failures: counters.write_failures,
            unflushed: writer.len() as u64,
            invalidations: scan.invalidations(),
            checkpoint: scan.checkpoint().last().map(ToString::to_string),
            termination,
        };
        tracing::info!(
            task = %summary.task,
            total_eligible = summary.total_eligible,
            processed = summary.processed,
            skipped = summary.skipped,
            errored = summary.errored,
            modified = summary.modified,
            termination = %summary.termination,
            "Enrichment run finished"
        );
        Ok(summary)
    }
}

fn log_progress(metrics: &PipelineMetrics, total: u64, outcome: FlushOutcome) {
    let counters = metrics.snapshot();
    let handled = counters.processed + counters.skipped + counters.errored;
    tracing::info!(
        handled,
        total,
        batch = outcome.attempted,
        modified = outcome.modified,
        "Progress"
    );
}
