#![deny(missing_docs)]

//! Resilient batch enrichment of documents stored in Qdrant.

/// Environment-driven configuration management.
pub mod config;
/// Enrichment tasks: summaries, categories, and metadata backfills.
pub mod enrichment;
/// Inference client abstraction and provider adapters.
pub mod inference;
/// Structured logging and tracing setup.
pub mod logging;
/// Run counters shared by the pipeline components.
pub mod metrics;
/// Retry, batching, checkpointing, and the per-document loop.
pub mod pipeline;
/// Document store abstraction and the Qdrant adapter.
pub mod store;
