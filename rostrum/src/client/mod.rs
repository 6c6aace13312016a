//! Model client — the single seam to external LLM providers.
//!
//! [`ModelProvider`] is the pluggable boundary: anything that can turn a
//! prompt into a completion. [`ModelClient`] wraps a provider with the
//! mandatory per-call deadline, cooperative cancellation, and metric
//! emission. Retries and breaker isolation live one layer up in
//! `resilience` — never here.

pub mod http;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{FailureKind, InvokeError};
use crate::telemetry::{CallRecord, MetricsObserver, TracingMetrics};

pub use http::OpenAiCompatProvider;

/// Composed prompt for one turn: a role/phase system instruction plus the
/// user-visible debate context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnPrompt {
    pub system: String,
    pub user: String,
}

impl TurnPrompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Why the provider stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural stop.
    Stop,
    /// Completion-token cap reached.
    Length,
    /// Provider-side content filter.
    ContentFilter,
    /// Anything else the provider reports.
    Other,
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stop => write!(f, "stop"),
            Self::Length => write!(f, "length"),
            Self::ContentFilter => write!(f, "content_filter"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// A successful completion with its measured costs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub latency_ms: u64,
    pub finish_reason: FinishReason,
}

/// The provider boundary. Implementations perform exactly one upstream call
/// per `complete` invocation — no retries, no queueing.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn complete(
        &self,
        model: &str,
        prompt: &TurnPrompt,
        max_tokens: u32,
    ) -> Result<Completion, InvokeError>;
}

/// Provider wrapper enforcing deadlines and cancellation, and emitting one
/// [`CallRecord`] per call.
pub struct ModelClient {
    provider: Arc<dyn ModelProvider>,
    observer: Arc<dyn MetricsObserver>,
    /// USD per 1k tokens, by model id. Missing models cost 0.
    prices: HashMap<String, f64>,
}

impl ModelClient {
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self {
            provider,
            observer: Arc::new(TracingMetrics),
            prices: HashMap::new(),
        }
    }

    /// Replace the metrics observer.
    pub fn with_observer(mut self, observer: Arc<dyn MetricsObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Set the per-1k-token price table used for cost estimates.
    pub fn with_prices(mut self, prices: HashMap<String, f64>) -> Self {
        self.prices = prices;
        self
    }

    /// Invoke the provider once, bounded by `deadline` and `cancel`.
    ///
    /// A call abandoned by cancellation returns [`InvokeError::Cancelled`];
    /// its upstream result, if it ever arrives, is dropped with the future.
    pub async fn invoke(
        &self,
        model: &str,
        prompt: &TurnPrompt,
        max_tokens: u32,
        deadline: std::time::Duration,
        cancel: &CancellationToken,
    ) -> Result<Completion, InvokeError> {
        let started = Instant::now();
        let call = self.provider.complete(model, prompt, max_tokens);

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(InvokeError::Cancelled),
            outcome = tokio::time::timeout(deadline, call) => match outcome {
                Err(_) => Err(InvokeError::failed(
                    FailureKind::Timeout,
                    model,
                    format!("deadline of {}ms elapsed", deadline.as_millis()),
                )),
                Ok(inner) => inner,
            },
        };

        let latency_ms = started.elapsed().as_millis() as u64;
        let result = result.map(|mut completion| {
            completion.latency_ms = latency_ms;
            completion
        });

        // Cancellation is not a call outcome; nothing useful to record.
        if !matches!(result, Err(InvokeError::Cancelled)) {
            self.observer.on_call(&self.record(model, &result, latency_ms));
        }

        result
    }

    fn record(
        &self,
        model: &str,
        result: &Result<Completion, InvokeError>,
        latency_ms: u64,
    ) -> CallRecord {
        let price = self.prices.get(model).copied().unwrap_or(0.0);
        match result {
            Ok(completion) => CallRecord {
                model: model.to_string(),
                success: true,
                failure: None,
                latency_ms,
                input_tokens: completion.input_tokens,
                output_tokens: completion.output_tokens,
                cost_estimate: price
                    * f64::from(completion.input_tokens + completion.output_tokens)
                    / 1000.0,
                timestamp: Utc::now(),
            },
            Err(err) => CallRecord {
                model: model.to_string(),
                success: false,
                failure: err.kind(),
                latency_ms,
                input_tokens: 0,
                output_tokens: 0,
                cost_estimate: 0.0,
                timestamp: Utc::now(),
            },
        }
    }
}
