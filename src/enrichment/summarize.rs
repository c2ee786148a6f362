use super::Enricher;
use crate::inference::{CompletionRequest, InferenceClient, InferenceError};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Field holding the article body.
pub const CONTENT_FIELD: &str = "content";
/// Field populated with the generated summary.
pub const SUMMARY_FIELD: &str = "msbm_llm_summary";

const SUMMARY_WORDS: usize = 75;

/// Produces a short professional summary of each article's content.
pub struct Summarizer {
    client: Arc<dyn InferenceClient>,
    model: String,
}

impl Summarizer {
    /// Create a summarizer backed by `client` and `model`.
    pub fn new(client: Arc<dyn InferenceClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

pub(crate) fn build_summary_prompt(content: &str, max_words: usize) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You are an expert at summarising article text about gender topics within the Caribbean.\n",
    );
    prompt.push_str(&format!(
        "Write a detailed yet concise summary of at most {max_words} words in a professional tone \
         for journalists, researchers, lecturers, and gender activists.\n"
    ));
    prompt.push_str(
        "Respond with a single paragraph containing only the summary. Rely only on the provided \
         text.\n\n",
    );
    prompt.push_str("<article_context>\n");
    prompt.push_str(content);
    prompt.push_str("\n</article_context>\n");
    prompt
}

#[async_trait]
impl Enricher for Summarizer {
    fn name(&self) -> &str {
        "summarize"
    }

    fn input_field(&self) -> &str {
        CONTENT_FIELD
    }

    fn target_field(&self) -> &str {
        SUMMARY_FIELD
    }

    async fn enrich(&self, input: &str) -> Result<Value, InferenceError> {
        let summary = self
            .client
            .complete(CompletionRequest {
                model: self.model.clone(),
                prompt: build_summary_prompt(input, SUMMARY_WORDS),
                temperature: 0.5,
            })
            .await?;

        if summary.trim().is_empty() {
            return Err(InferenceError::InvalidResponse(
                "model returned an empty summary".into(),
            ));
        }
        Ok(Value::String(summary.trim().to_string()))
    }
}
