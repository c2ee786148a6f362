use super::summarize::SUMMARY_FIELD;
use super::{Enricher, extract_json_object};
use crate::inference::{CompletionRequest, InferenceClient, InferenceError};
use crate::store::EligibilityFilter;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Field populated with `"True"` or `"False"`.
pub const CARIBBEAN_FIELD: &str = "msbm_caribbean_article";

/// Flags whether a summary is about a Caribbean country.
pub struct CaribbeanClassifier {
    client: Arc<dyn InferenceClient>,
    model: String,
}

impl CaribbeanClassifier {
    /// Create a classifier backed by `client` and `model`.
    pub fn new(client: Arc<dyn InferenceClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

fn build_prompt(summary: &str) -> String {
    format!(
        "Decide whether the following article summary is about a Caribbean country or \
         territory.\n\n\
         <summary>\n{summary}\n</summary>\n\n\
         Respond only with JSON of the form {{\"is_caribbean\": \"True\"}} or \
         {{\"is_caribbean\": \"False\"}}."
    )
}

fn parse_flag(output: &str) -> Result<&'static str, InferenceError> {
    let parsed = extract_json_object(output)?;
    match parsed.get("is_caribbean") {
        Some(Value::Bool(true)) => Ok("True"),
        Some(Value::Bool(false)) => Ok("False"),
        Some(Value::String(flag)) if flag.trim().eq_ignore_ascii_case("true") => Ok("True"),
        Some(Value::String(flag)) if flag.trim().eq_ignore_ascii_case("false") => Ok("False"),
        Some(other) => Err(InferenceError::Validation(format!(
            "is_caribbean must be True or False, got {other}"
        ))),
        None => Err(InferenceError::InvalidResponse(
            "response is missing \"is_caribbean\"".into(),
        )),
    }
}

#[async_trait]
impl Enricher for CaribbeanClassifier {
    fn name(&self) -> &str {
        "caribbean"
    }

    fn input_field(&self) -> &str {
        SUMMARY_FIELD
    }

    fn target_field(&self) -> &str {
        CARIBBEAN_FIELD
    }

    fn eligibility(&self) -> EligibilityFilter {
        EligibilityFilter::missing(CARIBBEAN_FIELD).requiring(SUMMARY_FIELD)
    }

    async fn enrich(&self, input: &str) -> Result<Value, InferenceError> {
        let output = self
            .client
            .complete(CompletionRequest {
                model: self.model.clone(),
                prompt: build_prompt(input),
                temperature: 0.0,
            })
            .await?;
        parse_flag(&output).map(|flag| Value::String(flag.to_string()))
    }
}
