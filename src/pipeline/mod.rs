//! Resilient batch enrichment engine.
//!
//! A run scans eligible documents in identifier order, enriches each one under a bounded retry
//! policy, and writes results back in bulk. Scan expiry is recovered by reopening the scan after
//! the last checkpointed identifier.

pub mod batch;
pub mod checkpoint;
pub mod classify;
pub mod invoker;
pub mod orchestrator;
pub mod retry;

use crate::store::{Document, DocumentId, StoreError};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

pub use batch::{BatchWriter, FlushOutcome, MAX_WRITE_ATTEMPTS};
pub use checkpoint::{Checkpoint, ResumableScan, ScanError, ScanState};
pub use classify::{ErrorCategory, classify};
pub use invoker::InferenceInvoker;
pub use orchestrator::Pipeline;
pub use retry::{RetryError, RetryPolicy, RetryState};

/// One document dequeued for enrichment together with the field to populate.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    /// Document pulled from the work source.
    pub document: Document,
    /// Field the enrichment populates.
    pub target_field: String,
}

impl WorkItem {
    /// Wrap `document` for enrichment of `target_field`.
    pub fn new(document: Document, target_field: impl Into<String>) -> Self {
        Self {
            document,
            target_field: target_field.into(),
        }
    }
}

/// Value computed for one document, waiting to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentResult {
    /// Document the value belongs to.
    pub id: DocumentId,
    /// Value written to the target field.
    pub value: Value,
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The work source had no more eligible documents.
    Exhausted,
    /// Cancellation was requested.
    Cancelled,
    /// The scan expired and could not be resumed from a checkpoint.
    ScanUnrecoverable,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Exhausted => "exhausted",
            Self::Cancelled => "cancelled",
            Self::ScanUnrecoverable => "scan_unrecoverable",
        };
        f.write_str(label)
    }
}

/// Terminal report of a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// Enrichment task that ran.
    pub task: String,
    /// Documents eligible when the run started.
    pub total_eligible: u64,
    /// Documents enriched successfully.
    pub processed: u64,
    /// Documents skipped for missing input.
    pub skipped: u64,
    /// Documents that failed permanently or exhausted retries.
    pub errored: u64,
    /// Bulk writes completed.
    pub flushes: u64,
    /// Documents the store reported as modified.
    pub modified: u64,
    /// Documents the store reported as not written, or dropped after repeated failed writes.
    pub write_failures: u64,
    /// Results still buffered because the final bulk write failed.
    pub unflushed: u64,
    /// Scan expiries observed during the run.
    pub invalidations: u64,
    /// Last identifier pulled from the work source.
    pub checkpoint: Option<String>,
    /// Why the run stopped.
    pub termination: Termination,
}

/// Failures that abort a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The store could not be reached before processing started.
    #[error("store unavailable at startup: {0}")]
    Startup(#[source] StoreError),
    /// The work source failed mid-run for a reason other than expiry.
    #[error("work source failed: {0}")]
    Store(#[source] StoreError),
}
