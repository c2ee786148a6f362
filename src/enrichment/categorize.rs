use super::summarize::SUMMARY_FIELD;
use super::{Enricher, EnrichmentError, extract_json_object};
use crate::inference::{CompletionRequest, InferenceClient, InferenceError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// Field populated with the assigned research category.
pub const CATEGORY_FIELD: &str = "msbm_category";

/// Research category offered to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    /// Category name written to the document.
    pub name: String,
    /// Definition shown to the model.
    pub definition: String,
}

#[derive(Debug, Deserialize)]
struct RawTopic {
    research_topic: TopicName,
    #[serde(default)]
    definition: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TopicName {
    Single(String),
    Combined(Vec<String>),
}

impl TopicName {
    /// `["Gender Equality", "Gender Violence"]` becomes `"Gender Equality & Violence"`.
    fn into_name(self) -> Option<String> {
        match self {
            Self::Single(name) => Some(name.trim().to_string()).filter(|name| !name.is_empty()),
            Self::Combined(parts) => {
                let prefix = parts.first()?.split_whitespace().next()?.to_string();
                let suffixes = parts
                    .iter()
                    .filter_map(|part| part.split_whitespace().last())
                    .collect::<Vec<_>>();
                Some(format!("{prefix} {}", suffixes.join(" & ")))
            }
        }
    }
}

/// Parse a JSON array of `{research_topic, definition}` entries.
pub fn parse_topics(json: &str) -> Result<Vec<Topic>, EnrichmentError> {
    let raw: Vec<RawTopic> = serde_json::from_str(json)?;
    Ok(raw
        .into_iter()
        .filter_map(|topic| {
            let definition = topic.definition.trim().to_string();
            topic
                .research_topic
                .into_name()
                .map(|name| Topic { name, definition })
        })
        .collect())
}

/// Read and parse the topics file at `path`.
pub fn load_topics(path: &Path) -> Result<Vec<Topic>, EnrichmentError> {
    let contents = std::fs::read_to_string(path).map_err(|source| EnrichmentError::TopicsIo {
        path: path.to_path_buf(),
        source,
    })?;
    parse_topics(&contents)
}

/// Assigns exactly one research category to each summary.
pub struct Categorizer {
    client: Arc<dyn InferenceClient>,
    model: String,
    topics: Vec<Topic>,
}

impl Categorizer {
    /// Create a categorizer over `topics`; an empty list is rejected.
    pub fn new(
        client: Arc<dyn InferenceClient>,
        model: impl Into<String>,
        topics: Vec<Topic>,
    ) -> Result<Self, EnrichmentError> {
        if topics.is_empty() {
            return Err(EnrichmentError::EmptyTopics);
        }
        Ok(Self {
            client,
            model: model.into(),
            topics,
        })
    }

    fn prompt(&self, summary: &str) -> String {
        let mut prompt = String::from(
            "You are an expert at categorising article summaries about gender topics within the \
             Caribbean.\nChoose the single category that best fits the summary.\n\n\
             <research_topics>\n",
        );
        for topic in &self.topics {
            prompt.push_str(&format!("- {}: {}\n", topic.name, topic.definition));
        }
        prompt.push_str("</research_topics>\n\n<summary>\n");
        prompt.push_str(summary);
        prompt.push_str(
            "\n</summary>\n\nRespond only with JSON of the form {\"category\": \"<one of the \
             research topics>\"}.",
        );
        prompt
    }

    fn validate(&self, output: &str) -> Result<String, InferenceError> {
        let parsed = extract_json_object(output)?;
        let category = parsed
            .get("category")
            .and_then(Value::as_str)
            .map(str::trim)
            .ok_or_else(|| {
                InferenceError::InvalidResponse("response is missing a \"category\" string".into())
            })?;

        self.topics
            .iter()
            .find(|topic| topic.name.eq_ignore_ascii_case(category))
            .map(|topic| topic.name.clone())
            .ok_or_else(|| {
                InferenceError::Validation(format!("category {category:?} is not a known topic"))
            })
    }
}

#[async_trait]
impl Enricher for Categorizer {
    fn name(&self) -> &str {
        "categorize"
    }

    fn input_field(&self) -> &str {
        SUMMARY_FIELD
    }

    fn target_field(&self) -> &str {
        CATEGORY_FIELD
    }

    async fn enrich(&self, input: &str) -> Result<Value, InferenceError> {
        let output = self
            .client
            .complete(CompletionRequest {
                model: self.model.clone(),
                prompt: self.prompt(input),
                temperature: 0.0,
            })
            .await?;
        self.validate(&output).map(Value::String)
    }
}
