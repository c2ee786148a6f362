//! Abstractions for calling hosted or local LLMs during enrichment.
//!
//! Clients only translate transport and provider failures into [`InferenceError`]; deciding
//! whether a failure is worth retrying is left to the pipeline's classifier.

mod ollama;
mod openai;

use crate::config::{Config, InferenceProvider};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";

/// Faults raised while producing an enrichment value.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// Request did not complete before the client timeout.
    #[error("Inference request timed out: {0}")]
    Timeout(String),
    /// Provider could not be reached or the connection dropped.
    #[error("Failed to reach inference provider: {0}")]
    Network(String),
    /// Provider answered with a non-success status.
    #[error("Inference provider returned {status}: {body}")]
    Status {
        /// HTTP status code returned by the provider.
        status: u16,
        /// Response body, useful for diagnosing throttling or validation messages.
        body: String,
    },
    /// Provider response could not be decoded.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
    /// Decoded output did not satisfy the enrichment's constraints.
    #[error("Enrichment output failed validation: {0}")]
    Validation(String),
    /// Document lacks the content the enrichment reads.
    #[error("Document is missing input field '{field}'")]
    MissingInput {
        /// Name of the absent or empty input field.
        field: String,
    },
}

impl InferenceError {
    /// HTTP status attached to the fault, when the provider returned one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Translate a transport error raised by `reqwest`.
    pub fn from_transport(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error.to_string())
        } else if error.is_decode() {
            Self::InvalidResponse(error.to_string())
        } else if let Some(status) = error.status() {
            Self::Status {
                status: status.as_u16(),
                body: error.to_string(),
            }
        } else {
            Self::Network(error.to_string())
        }
    }
}

/// Single prompt completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Fully qualified model identifier understood by the provider.
    pub model: String,
    /// Prompt assembled by the enrichment task.
    pub prompt: String,
    /// Sampling temperature.
    pub temperature: f32,
}

/// Interface implemented by inference providers.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Produce a text completion for the prompt.
    async fn complete(&self, request: CompletionRequest) -> Result<String, InferenceError>;
}

/// Build an inference client based on configuration.
pub fn build_inference_client(
    config: &Config,
) -> Result<Arc<dyn InferenceClient>, reqwest::Error> {
    let timeout = config.inference_timeout;
    match config.inference_provider {
        InferenceProvider::Ollama => {
            let base_url = config
                .inference_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
            Ok(Arc::new(OllamaClient::new(base_url, timeout)?))
        }
        InferenceProvider::OpenAI => {
            let base_url = config
                .inference_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string());
            let api_key = config.inference_api_key.clone().unwrap_or_default();
            Ok(Arc::new(OpenAiClient::new(base_url, api_key, timeout)?))
        }
    }
}

pub(crate) fn http_client(
    agent: &str,
    timeout: Duration,
) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(agent)
        .timeout(timeout)
        .build()
}
