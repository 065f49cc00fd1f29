use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

use crate::config::AppConfig;

/// Sampling temperature used for every request. The endpoints never
/// vary it.
const SAMPLING_TEMPERATURE: f32 = 0.7;

// Structures matching the OpenAI-style /chat/completions endpoint
#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize, Debug)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize, Debug)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize, Debug)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("OpenAI API key is not configured")]
    MissingApiKey,
    #[error("error communicating with the completion API: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("completion API request failed ({status}): {message}")]
    Api { status: StatusCode, message: String },
    #[error("completion API returned no generated text")]
    EmptyCompletion,
}

impl CompletionError {
    /// True for the config-error case; everything else is an upstream
    /// failure for status-mapping purposes.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::MissingApiKey)
    }
}

/// Client for the hosted text-completion service. One instance is
/// shared across all requests; it holds no per-request state.
#[derive(Debug, Clone)]
pub struct CompletionClient {
    http: Client,
    api_base: String,
    api_key: Option<String>,
    model: String,
}

impl CompletionClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("Failed to build HTTP client for the completion API")?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    /// Send one system+user message pair and return the first choice's
    /// text. No retry is attempted; every failure mode maps to one
    /// [`CompletionError`] variant.
    pub async fn chat_completion(
        &self,
        system_prompt: &str,
        user_text: &str,
        max_tokens: u32,
    ) -> Result<String, CompletionError> {
        let api_key = self.api_key.as_deref().ok_or(CompletionError::MissingApiKey)?;

        let request_payload = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_text.to_string(),
                },
            ],
            temperature: SAMPLING_TEMPERATURE,
            max_tokens,
        };

        let url = format!("{}/chat/completions", self.api_base);
        debug!(%url, model = %self.model, max_tokens, "Sending completion request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&request_payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(%status, %body, "Completion API request failed");
            return Err(CompletionError::Api {
                status,
                message: describe_api_failure(status, &body),
            });
        }

        let completion = response.json::<ChatCompletionResponse>().await?;

        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(CompletionError::EmptyCompletion);
        }

        debug!(response = %text, "Received completion response");
        Ok(text)
    }
}

/// Fold the upstream status taxonomy into a message a caller can relay
/// to the user.
fn describe_api_failure(status: StatusCode, body: &str) -> String {
    // The upstream reports failures as {"error": {"message": ...}};
    // fall back to the raw body when it doesn't.
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("error")
                .and_then(|err| err.get("message"))
                .and_then(|message| message.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string());

    match status {
        StatusCode::UNAUTHORIZED => "Invalid API key. Please check your API key configuration.".to_string(),
        StatusCode::TOO_MANY_REQUESTS => {
            format!("Rate limit or quota exceeded. Please try again later. ({detail})")
        }
        StatusCode::INTERNAL_SERVER_ERROR | StatusCode::SERVICE_UNAVAILABLE => {
            "The completion service is temporarily unavailable. Please try again later.".to_string()
        }
        _ => detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(api_base: String, api_key: Option<&str>) -> AppConfig {
        AppConfig {
            api_key: api_key.map(str::to_string),
            api_base,
            model: "gpt-3.5-turbo".to_string(),
            timeout_ms: 5_000,
        }
    }

    #[tokio::test]
    async fn returns_first_choice_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [
                    { "message": { "role": "assistant", "content": "Your baby step: write one sentence." } }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = CompletionClient::new(&test_config(server.uri(), Some("sk-test"))).unwrap();
        let text = client
            .chat_completion("system", "I feel stuck", 500)
            .await
            .unwrap();
        assert_eq!(text, "Your baby step: write one sentence.");
    }

    #[tokio::test]
    async fn missing_api_key_short_circuits() {
        let server = MockServer::start().await;
        // Mounted with an expectation of zero calls: the client must
        // not touch the network without a credential.
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = CompletionClient::new(&test_config(server.uri(), None)).unwrap();
        let err = client.chat_completion("system", "stuck", 500).await.unwrap_err();
        assert!(matches!(err, CompletionError::MissingApiKey));
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn unauthorized_maps_to_api_key_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("nope"))
            .mount(&server)
            .await;

        let client = CompletionClient::new(&test_config(server.uri(), Some("sk-bad"))).unwrap();
        let err = client.chat_completion("system", "stuck", 500).await.unwrap_err();
        match err {
            CompletionError::Api { status, message } => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert!(message.contains("API key"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn quota_error_surfaces_upstream_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": { "message": "You exceeded your current quota.", "type": "insufficient_quota" }
            })))
            .mount(&server)
            .await;

        let client = CompletionClient::new(&test_config(server.uri(), Some("sk-test"))).unwrap();
        let err = client.chat_completion("system", "stuck", 500).await.unwrap_err();
        match err {
            CompletionError::Api { status, message } => {
                assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
                assert!(message.contains("You exceeded your current quota."));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_choices_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let client = CompletionClient::new(&test_config(server.uri(), Some("sk-test"))).unwrap();
        let err = client.chat_completion("system", "stuck", 500).await.unwrap_err();
        assert!(matches!(err, CompletionError::EmptyCompletion));
    }

    #[tokio::test]
    async fn sends_fixed_sampling_parameters() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [ { "message": { "content": "ok" } } ]
            })))
            .mount(&server)
            .await;

        let client = CompletionClient::new(&test_config(server.uri(), Some("sk-test"))).unwrap();
        client
            .chat_completion("the system prompt", "the problem", 200)
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["model"], "gpt-3.5-turbo");
        assert_eq!(body["temperature"], 0.7);
        assert_eq!(body["max_tokens"], 200);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "the system prompt");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "the problem");
    }
}
