use super::{CompletionRequest, InferenceClient, InferenceError, http_client};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Client for OpenAI-compatible chat completion endpoints (OpenAI, Groq, vLLM, ...).
pub struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    /// Construct a client for the endpoint rooted at `base_url` (e.g. `https://api.openai.com/v1`).
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: http_client("rusty-enrich/openai", timeout)?,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl InferenceClient for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, InferenceError> {
        let payload = json!({
            "model": request.model,
            "temperature": request.temperature,
            "messages": [
                { "role": "user", "content": request.prompt }
            ]
        });

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(InferenceError::from_transport)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Status { status, body });
        }

        let body: ChatResponse = response.json().await.map_err(|error| {
            if error.is_decode() {
                InferenceError::InvalidResponse(format!(
                    "failed to decode chat completion: {error}"
                ))
            } else {
                InferenceError::from_transport(error)
            }
        })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| InferenceError::InvalidResponse("chat completion had no content".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "gpt-4o".into(),
            prompt: "Categorize".into(),
            temperature: 0.5,
        }
    }

    #[tokio::test]
    async fn sends_bearer_token_and_reads_first_choice() {
        let server = MockServer::start_async().await;
        let client = OpenAiClient::new(server.url("/v1"), "sk-test", Duration::from_secs(5))
            .expect("client");

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .header("authorization", "Bearer sk-test")
                    .body_contains("\"role\":\"user\"");
                then.status(200).json_body(json!({
                    "choices": [
                        {
                            "message": {
                                "role": "assistant",
                                "content": " {\"category\":\"Health\"} "
                            }
                        }
                    ]
                }));
            })
            .await;

        let text = client.complete(request()).await.expect("completion");

        mock.assert();
        assert_eq!(text, "{\"category\":\"Health\"}");
    }

    #[tokio::test]
    async fn empty_choices_are_invalid() {
        let server = MockServer::start_async().await;
        let client = OpenAiClient::new(server.url("/v1"), "sk-test", Duration::from_secs(5))
            .expect("client");

        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(200).json_body(json!({ "choices": [] }));
            })
            .await;

        let error = client.complete(request()).await.expect_err("error");
        assert!(matches!(error, InferenceError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn error_status_carries_body() {
        let server = MockServer::start_async().await;
        let client = OpenAiClient::new(server.url("/v1"), "sk-test", Duration::from_secs(5))
            .expect("client");

        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(400).body("{\"error\":{\"message\":\"bad request\"}}");
            })
            .await;

        let error = client.complete(request()).await.expect_err("error");
        assert_eq!(error.status(), Some(400));
    }
}
