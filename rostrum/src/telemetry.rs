//! Tracing setup and per-call metric records.
//!
//! Every model invocation emits one [`CallRecord`] to a [`MetricsObserver`].
//! The default observer logs via `tracing`; deployments swap in their own
//! transport by implementing the trait.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::FailureKind;

/// Initialise the global tracing subscriber.
///
/// Honors `RUST_LOG`; defaults to `info`.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// One metric record per model invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    /// Model the call was routed to.
    pub model: String,
    /// Whether the call produced a completion.
    pub success: bool,
    /// Failure classification when `success` is false.
    pub failure: Option<FailureKind>,
    /// Wall-clock latency of the call.
    pub latency_ms: u64,
    /// Prompt tokens reported by the provider (0 when unknown).
    pub input_tokens: u32,
    /// Completion tokens reported by the provider (0 when unknown).
    pub output_tokens: u32,
    /// Estimated cost in USD for this call.
    pub cost_estimate: f64,
    /// When the call finished.
    pub timestamp: DateTime<Utc>,
}

impl CallRecord {
    /// Total tokens moved by this call.
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Push sink for per-call metrics. Invoked outside any critical section.
pub trait MetricsObserver: Send + Sync {
    fn on_call(&self, record: &CallRecord);
}

/// Default observer: structured log lines.
#[derive(Debug, Default)]
pub struct TracingMetrics;

impl MetricsObserver for TracingMetrics {
    fn on_call(&self, record: &CallRecord) {
        if record.success {
            debug!(
                model = %record.model,
                latency_ms = record.latency_ms,
                tokens = record.total_tokens(),
                cost = record.cost_estimate,
                "model call ok"
            );
        } else {
            warn!(
                model = %record.model,
                latency_ms = record.latency_ms,
                failure = %record.failure.map(|k| k.to_string()).unwrap_or_default(),
                "model call failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_tokens() {
        let record = CallRecord {
            model: "m1".to_string(),
            success: true,
            failure: None,
            latency_ms: 120,
            input_tokens: 800,
            output_tokens: 200,
            cost_estimate: 0.003,
            timestamp: Utc::now(),
        };
        assert_eq!(record.total_tokens(), 1000);
    }

    #[test]
    fn test_record_json_roundtrip() {
        let record = CallRecord {
            model: "m1".to_string(),
            success: false,
            failure: Some(FailureKind::Timeout),
            latency_ms: 60_000,
            input_tokens: 0,
            output_tokens: 0,
            cost_estimate: 0.0,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&record).unwrap();
        let parsed: CallRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.failure, Some(FailureKind::Timeout));
        assert!(!parsed.success);
    }
}
