//! Enrichment tasks run by the pipeline engine.
//!
//! Each task names the field it reads, the field it populates, and how a value is computed.
//! The engine treats all of them the same way; only [`Enricher::enrich`] differs.

mod caribbean;
mod categorize;
mod country;
mod summarize;

use crate::config::Config;
use crate::inference::{InferenceClient, InferenceError};
use crate::store::EligibilityFilter;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

pub use caribbean::{CARIBBEAN_FIELD, CaribbeanClassifier};
pub use categorize::{CATEGORY_FIELD, Categorizer, Topic, load_topics, parse_topics};
pub use country::{COUNTRY_NAME_FIELD, CountryNameBackfill, country_full_name};
pub use summarize::{CONTENT_FIELD, SUMMARY_FIELD, Summarizer};

/// Per-document transform applied by the pipeline.
#[async_trait]
pub trait Enricher: Send + Sync {
    /// Short task name used in logs and summaries.
    fn name(&self) -> &str;

    /// Field whose text is handed to [`Enricher::enrich`].
    fn input_field(&self) -> &str;

    /// Field populated with the computed value.
    fn target_field(&self) -> &str;

    /// Input used when the document's input field is absent or blank.
    ///
    /// `None` means such documents are skipped and stay eligible.
    fn input_fallback(&self) -> Option<&'static str> {
        None
    }

    /// Predicate selecting the documents this task still has to process.
    fn eligibility(&self) -> EligibilityFilter {
        EligibilityFilter::missing(self.target_field())
    }

    /// Compute the enrichment value from the input field's text.
    async fn enrich(&self, input: &str) -> Result<Value, InferenceError>;
}

/// Errors raised while assembling an enrichment task.
#[derive(Debug, Error)]
pub enum EnrichmentError {
    /// Categorization requires a topic file.
    #[error("CATEGORY_TOPICS_PATH must be set for the categorize task")]
    MissingTopics,
    /// Topic file could not be read.
    #[error("Failed to read topics from {path}: {source}")]
    TopicsIo {
        /// Path that failed to load.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Topic file was not valid JSON in the expected shape.
    #[error("Invalid topics file: {0}")]
    TopicsFormat(#[from] serde_json::Error),
    /// Topic file contained no usable topics.
    #[error("Topics file defines no categories")]
    EmptyTopics,
}

/// Enrichment tasks available from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EnrichmentTask {
    /// Summarize article content.
    Summarize,
    /// Assign a research category to each summary.
    Categorize,
    /// Flag whether a summary is about a Caribbean country.
    Caribbean,
    /// Backfill full country names from ISO codes.
    Country,
}

impl fmt::Display for EnrichmentTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Summarize => "summarize",
            Self::Categorize => "categorize",
            Self::Caribbean => "caribbean",
            Self::Country => "country",
        };
        f.write_str(name)
    }
}

/// Build the enricher for `task` using the configured model and inference client.
pub fn build_enricher(
    task: EnrichmentTask,
    config: &Config,
    client: Arc<dyn InferenceClient>,
) -> Result<Arc<dyn Enricher>, EnrichmentError> {
    let model = config.inference_model.clone();
    let enricher: Arc<dyn Enricher> = match task {
        EnrichmentTask::Summarize => Arc::new(Summarizer::new(client, model)),
        EnrichmentTask::Categorize => {
            let path = config
                .category_topics_path
                .as_deref()
                .ok_or(EnrichmentError::MissingTopics)?;
            Arc::new(Categorizer::new(client, model, load_topics(path)?)?)
        }
        EnrichmentTask::Caribbean => Arc::new(CaribbeanClassifier::new(client, model)),
        EnrichmentTask::Country => Arc::new(CountryNameBackfill),
    };
    Ok(enricher)
}

/// Extract the first JSON object from model output, tolerating code fences and prose.
pub(crate) fn extract_json_object(text: &str) -> Result<Value, InferenceError> {
    let start = text.find('{');
    let end = text.rfind('}');
    let candidate = match (start, end) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => {
            return Err(InferenceError::InvalidResponse(format!(
                "expected a JSON object, got: {}",
                truncate(text, 120)
            )));
        }
    };
    serde_json::from_str(candidate)
        .map_err(|error| InferenceError::InvalidResponse(format!("invalid JSON output: {error}")))
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated = text.chars().take(max_chars - 1).collect::<String>();
    truncated.push('…');
    truncated
}
