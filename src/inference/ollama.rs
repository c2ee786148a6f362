use super::{CompletionRequest, InferenceClient, InferenceError, http_client};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Client for a local Ollama runtime using the non-streaming generate endpoint.
pub struct OllamaClient {
    http: Client,
    base_url: String,
}

impl OllamaClient {
    /// Construct a client for the runtime at `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: http_client("rusty-enrich/ollama", timeout)?,
            base_url: base_url.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

#[async_trait]
impl InferenceClient for OllamaClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, InferenceError> {
        let payload = json!({
            "model": request.model,
            "prompt": request.prompt,
            "stream": false,
            "options": {
                "temperature": request.temperature,
            }
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(InferenceError::from_transport)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Status { status, body });
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            if error.is_decode() {
                InferenceError::InvalidResponse(format!(
                    "failed to decode Ollama response: {error}"
                ))
            } else {
                InferenceError::from_transport(error)
            }
        })?;

        if !body.done {
            return Err(InferenceError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.response.trim().to_string())
    }
}
