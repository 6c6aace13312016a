//! OpenAI-compatible chat-completions provider.
//!
//! Speaks the `/v1/chat/completions` dialect most inference routers expose.
//! HTTP status codes map onto the failure taxonomy; the wrapper layer owns
//! deadlines, so the embedded reqwest timeout is only a backstop.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::{Completion, FinishReason, ModelProvider, TurnPrompt};
use crate::error::{ApiError, FailureKind, InvokeError};

/// Backstop timeout on the embedded HTTP client.
const HTTP_CLIENT_TIMEOUT_SECS: u64 = 300;

/// Provider for OpenAI-compatible endpoints.
pub struct OpenAiCompatProvider {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    temperature: f32,
}

impl OpenAiCompatProvider {
    /// Create a provider for `endpoint` (a full chat-completions URL).
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_CLIENT_TIMEOUT_SECS))
            .build()
            .map_err(|e| ApiError::InvalidConfig(format!("http client: {e}")))?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            api_key,
            temperature: 0.3,
        })
    }

    /// Set the sampling temperature (default 0.3).
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

/// Map an HTTP status onto the failure taxonomy.
fn classify_status(status: StatusCode) -> FailureKind {
    match status.as_u16() {
        401 | 403 => FailureKind::Auth,
        402 => FailureKind::BudgetExhausted,
        400 | 404 | 422 => FailureKind::InvalidRequest,
        429 => FailureKind::RateLimited,
        500..=504 => FailureKind::Unavailable,
        _ => FailureKind::Transient,
    }
}

/// Map a transport-level reqwest error onto the failure taxonomy.
fn classify_transport(err: &reqwest::Error) -> FailureKind {
    if err.is_timeout() {
        FailureKind::Timeout
    } else if err.is_connect() {
        FailureKind::Unavailable
    } else {
        FailureKind::Transient
    }
}

fn parse_finish_reason(raw: Option<&str>) -> FinishReason {
    match raw {
        Some("stop") => FinishReason::Stop,
        Some("length") => FinishReason::Length,
        Some("content_filter") => FinishReason::ContentFilter,
        _ => FinishReason::Other,
    }
}

#[async_trait]
impl ModelProvider for OpenAiCompatProvider {
    async fn complete(
        &self,
        model: &str,
        prompt: &TurnPrompt,
        max_tokens: u32,
    ) -> Result<Completion, InvokeError> {
        let request = ChatRequest {
            model: model.to_string(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: prompt.system.clone(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt.user.clone(),
                },
            ],
            max_tokens,
            temperature: self.temperature,
        };

        let mut builder = self.http.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| InvokeError::failed(classify_transport(&e), model, e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(InvokeError::failed(
                classify_status(status),
                model,
                format!("HTTP {status}: {body}"),
            ));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| InvokeError::failed(FailureKind::Transient, model, e.to_string()))?;

        let choice = chat
            .choices
            .first()
            .ok_or_else(|| InvokeError::failed(FailureKind::Transient, model, "empty choices"))?;

        let usage = chat.usage.as_ref();
        Ok(Completion {
            text: choice.message.content.clone().unwrap_or_default(),
            input_tokens: usage.and_then(|u| u.prompt_tokens).unwrap_or(0),
            output_tokens: usage.and_then(|u| u.completion_tokens).unwrap_or(0),
            latency_ms: 0, // measured by the client wrapper
            finish_reason: parse_finish_reason(choice.finish_reason.as_deref()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(classify_status(StatusCode::UNAUTHORIZED), FailureKind::Auth);
        assert_eq!(classify_status(StatusCode::FORBIDDEN), FailureKind::Auth);
        assert_eq!(
            classify_status(StatusCode::PAYMENT_REQUIRED),
            FailureKind::BudgetExhausted
        );
        assert_eq!(
            classify_status(StatusCode::BAD_REQUEST),
            FailureKind::InvalidRequest
        );
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            FailureKind::RateLimited
        );
        assert_eq!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE),
            FailureKind::Unavailable
        );
        assert_eq!(
            classify_status(StatusCode::IM_A_TEAPOT),
            FailureKind::Transient
        );
    }

    #[test]
    fn test_finish_reason_parsing() {
        assert_eq!(parse_finish_reason(Some("stop")), FinishReason::Stop);
        assert_eq!(parse_finish_reason(Some("length")), FinishReason::Length);
        assert_eq!(
            parse_finish_reason(Some("content_filter")),
            FinishReason::ContentFilter
        );
        assert_eq!(parse_finish_reason(Some("weird")), FinishReason::Other);
        assert_eq!(parse_finish_reason(None), FinishReason::Other);
    }

    #[test]
    fn test_provider_construction() {
        let provider =
            OpenAiCompatProvider::new("http://localhost:8000/v1/chat/completions", None).unwrap();
        assert!((provider.temperature - 0.3).abs() < f32::EPSILON);

        let warmer = OpenAiCompatProvider::new("http://localhost:8000/v1/chat/completions", None)
            .unwrap()
            .with_temperature(0.9);
        assert!((warmer.temperature - 0.9).abs() < f32::EPSILON);
    }
}
