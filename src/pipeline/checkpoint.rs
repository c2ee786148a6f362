//! Checkpointing work source that reopens expired scans.

use crate::store::{Document, DocumentId, DocumentStore, DocumentStream, ScanQuery, StoreError};
use futures_util::StreamExt;
use std::time::Duration;
use thiserror::Error;

/// Last identifier pulled from the work source. Only ever moves forward.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Checkpoint {
    last: Option<DocumentId>,
}

impl Checkpoint {
    /// Last recorded identifier, if any.
    pub fn last(&self) -> Option<&DocumentId> {
        self.last.as_ref()
    }

    /// Record `id`; ignored unless it is greater than the current checkpoint.
    pub fn advance(&mut self, id: DocumentId) -> bool {
        if self.last.as_ref().is_some_and(|last| id <= *last) {
            return false;
        }
        self.last = Some(id);
        true
    }
}

/// Lifecycle of a [`ResumableScan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Pulling documents in order.
    Scanning,
    /// Reopened after expiry; the next document comes from the new scan.
    Resuming,
    /// No further documents will be produced.
    Exhausted,
}

/// Work source failures the controller cannot recover from.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The scan expired with no checkpoint progress to resume from.
    #[error("scan expired after {elapsed:?} with no checkpoint to resume from")]
    Unrecoverable {
        /// Age of the scan when it expired.
        elapsed: Duration,
    },
    /// Any other store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Ordered scan that tracks a checkpoint and transparently resumes after expiry.
///
/// The checkpoint advances as each document is handed out. Documents are processed one at a
/// time, so by the time the next pull observes an expiry the previous document is finished and
/// the reopened scan starts strictly after it.
pub struct ResumableScan<'a> {
    store: &'a dyn DocumentStore,
    query: ScanQuery,
    stream: DocumentStream<'a>,
    checkpoint: Checkpoint,
    state: ScanState,
    invalidations: u64,
    resumed_from: Option<DocumentId>,
}

impl<'a> ResumableScan<'a> {
    /// Open the work source described by `query`.
    pub fn open(store: &'a dyn DocumentStore, query: ScanQuery) -> Self {
        let stream = store.scan(query.clone());
        let checkpoint = Checkpoint {
            last: query.exclude_up_to.clone(),
        };
        Self {
            store,
            query,
            stream,
            checkpoint,
            state: ScanState::Scanning,
            invalidations: 0,
            resumed_from: None,
        }
    }

    /// Current checkpoint.
    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Expiries observed so far, including an unrecoverable one.
    pub fn invalidations(&self) -> u64 {
        self.invalidations
    }

    /// Next eligible document, reopening the scan after expiry as needed.
    pub async fn next(&mut self) -> Result<Option<Document>, ScanError> {
        loop {
            if self.state == ScanState::Exhausted {
                return Ok(None);
            }

            match self.stream.next().await {
                Some(Ok(document)) => {
                    self.checkpoint.advance(document.id.clone());
                    self.state = ScanState::Scanning;
                    return Ok(Some(document));
                }
                None => {
                    self.state = ScanState::Exhausted;
                    return Ok(None);
                }
                Some(Err(StoreError::ScanInvalidated { elapsed })) => {
                    self.invalidations += 1;
                    let resume_at = match self.checkpoint.last() {
                        Some(last) if self.resumed_from.as_ref() != Some(last) => last.clone(),
                        last => {
                            self.state = ScanState::Exhausted;
                            tracing::warn!(
                                checkpoint = ?last.map(ToString::to_string),
                                ?elapsed,
                                "Scan expired without checkpoint progress; cannot resume"
                            );
                            return Err(ScanError::Unrecoverable { elapsed });
                        }
                    };

                    tracing::info!(
                        checkpoint = %resume_at,
                        invalidations = self.invalidations,
                        ?elapsed,
                        "Scan expired; resuming after checkpoint"
                    );
                    self.state = ScanState::Resuming;
                    self.stream = self.store.scan(self.query.resuming_after(resume_at.clone()));
                    self.resumed_from = Some(resume_at);
                }
                Some(Err(error)) => {
                    self.state = ScanState::Exhausted;
                    return Err(error.into());
                }
            }
        }
    }
}
