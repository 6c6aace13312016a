//! Resilient model invocation — retry policy layered under circuit breakers.
//!
//! ```text
//! call(session, model, prompt)
//!   ├─ breaker admit?      no → fail fast (Unavailable) → try fallback
//!   ├─ attempt 1..=max     retriable failure → consume retry budget,
//!   │                      jittered backoff, re-admit, try again
//!   ├─ retries exhausted   → force-open breaker → try fallback
//!   └─ propagate last classified failure
//! ```
//!
//! The fallback is a secondary provider for the same logical model identity;
//! it is consulted once, only after the primary path has ultimately failed
//! with a retriable kind.

pub mod breaker;
pub mod retry;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::{Completion, ModelClient, TurnPrompt};
use crate::error::{FailureKind, InvokeError};

pub use breaker::{Admission, BreakerConfig, BreakerTable, CircuitState};
pub use retry::{RetryLedger, RetryPolicy};

/// Model client with retry, breaker isolation, and provider fallback.
pub struct ResilientClient {
    primary: ModelClient,
    fallback: Option<ModelClient>,
    policy: RetryPolicy,
    ledger: Arc<RetryLedger>,
    breakers: Arc<BreakerTable>,
}

impl ResilientClient {
    pub fn new(
        primary: ModelClient,
        policy: RetryPolicy,
        ledger: Arc<RetryLedger>,
        breakers: Arc<BreakerTable>,
    ) -> Self {
        Self {
            primary,
            fallback: None,
            policy,
            ledger,
            breakers,
        }
    }

    /// Configure a secondary provider consulted after primary exhaustion.
    pub fn with_fallback(mut self, fallback: ModelClient) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Shared retry ledger (process-wide).
    pub fn ledger(&self) -> &Arc<RetryLedger> {
        &self.ledger
    }

    /// Shared breaker table (process-wide).
    pub fn breakers(&self) -> &Arc<BreakerTable> {
        &self.breakers
    }

    /// Perform one logical call with full resilience policy applied.
    pub async fn call(
        &self,
        session_id: &str,
        model: &str,
        prompt: &TurnPrompt,
        max_tokens: u32,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> Result<Completion, InvokeError> {
        let mut last_err: Option<InvokeError> = None;

        for attempt in 1..=self.policy.max_attempts {
            if cancel.is_cancelled() {
                return Err(InvokeError::Cancelled);
            }

            match self.breakers.admit(model) {
                Admission::Rejected => {
                    last_err = Some(InvokeError::failed(
                        FailureKind::Unavailable,
                        model,
                        "circuit open",
                    ));
                    break;
                }
                Admission::Allowed | Admission::Probe => {}
            }

            match self
                .primary
                .invoke(model, prompt, max_tokens, deadline, cancel)
                .await
            {
                Ok(completion) => {
                    self.breakers.on_success(model);
                    return Ok(completion);
                }
                Err(InvokeError::Cancelled) => {
                    // An abandoned call records no outcome; free any probe
                    // slot it was holding.
                    self.breakers.release_probe(model);
                    return Err(InvokeError::Cancelled);
                }
                Err(err) => {
                    let kind = err.kind().expect("classified failure");
                    self.breakers.on_failure(model, kind);

                    if !kind.is_retriable() {
                        last_err = Some(err);
                        break;
                    }
                    if attempt == self.policy.max_attempts {
                        self.breakers.on_exhaustion(model, kind);
                        warn!(model, %kind, attempt, "retries exhausted, breaker opened");
                        last_err = Some(err);
                        break;
                    }
                    if !self.ledger.try_consume(session_id) {
                        warn!(session_id, model, "session retry budget exhausted");
                        last_err = Some(err);
                        break;
                    }

                    let delay = self.policy.delay(attempt);
                    debug!(model, attempt, delay_ms = delay.as_millis() as u64, "backing off");
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(InvokeError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        let err = last_err.expect("loop records an error before breaking");

        // Fallback only makes sense for retriable kinds: a malformed request
        // or rejected credentials would fail the secondary identically.
        if err.is_retriable() {
            if let Some(fallback) = &self.fallback {
                debug!(model, "primary exhausted, invoking fallback provider");
                match fallback.invoke(model, prompt, max_tokens, deadline, cancel).await {
                    Ok(completion) => return Ok(completion),
                    Err(InvokeError::Cancelled) => return Err(InvokeError::Cancelled),
                    Err(fallback_err) => {
                        warn!(model, error = %fallback_err, "fallback provider also failed");
                    }
                }
            }
        }

        Err(err)
    }
}
