//! Document store abstraction and its Qdrant adapter.
//!
//! The pipeline only depends on [`DocumentStore`]: an ordered, resumable scan over eligible
//! documents, an eligibility count, and a keyed bulk upsert. [`QdrantStore`] implements it over
//! the Qdrant HTTP API.

pub mod client;
pub mod filters;
/// Streaming helpers for Qdrant scroll pagination.
pub mod scroller;
pub mod types;

use async_trait::async_trait;
use futures_core::Stream;
use std::pin::Pin;

pub use client::QdrantStore;
pub use filters::build_eligibility_filter;
pub use types::{
    BulkWriteFailure, BulkWriteReport, Document, DocumentId, EligibilityFilter, FieldUpdate,
    ScanQuery, StoreError,
};

/// Lazy, ordered sequence of eligible documents produced by [`DocumentStore::scan`].
pub type DocumentStream<'a> = Pin<Box<dyn Stream<Item = Result<Document, StoreError>> + Send + 'a>>;

/// Storage backend consumed by the enrichment pipeline.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Open a scan over documents matching `query.filter`, ascending by identifier.
    ///
    /// The stream yields [`StoreError::ScanInvalidated`] when the scan expires; callers reopen it
    /// with [`ScanQuery::resuming_after`].
    fn scan(&self, query: ScanQuery) -> DocumentStream<'_>;

    /// Count documents currently matching `filter`.
    async fn count_matching(&self, filter: &EligibilityFilter) -> Result<u64, StoreError>;

    /// Apply keyed single-field updates in one request.
    async fn bulk_upsert(&self, updates: Vec<FieldUpdate>) -> Result<BulkWriteReport, StoreError>;
}
