//! Failure taxonomy with retry classification.
//!
//! Every failure in the runtime is represented here. Callers query
//! `is_retriable()` / `family()` instead of string matching.
//!
//! ## Propagation policy
//!
//! | Kind             | Retriable | Breaker family |
//! |------------------|-----------|----------------|
//! | Transient        | yes       | availability   |
//! | RateLimited      | yes       | throttle       |
//! | Timeout          | yes       | availability   |
//! | Unavailable      | yes       | availability   |
//! | Auth             | no        | fatal          |
//! | InvalidRequest   | no        | fatal          |
//! | BudgetExhausted  | no        | fatal          |

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classified failure from a model invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Transient network or backend error — safe to retry.
    Transient,
    /// Provider rate limit — retry with backoff.
    RateLimited,
    /// Credentials rejected — never retried; fails the session.
    Auth,
    /// Malformed request — never retried.
    InvalidRequest,
    /// Provider-side spend cap reached — terminal.
    BudgetExhausted,
    /// Upstream reports itself down, or the circuit is open.
    Unavailable,
    /// Per-turn deadline elapsed.
    Timeout,
}

impl FailureKind {
    /// Whether the retry policy may re-attempt after this failure.
    pub fn is_retriable(self) -> bool {
        matches!(
            self,
            Self::Transient | Self::RateLimited | Self::Unavailable | Self::Timeout
        )
    }

    /// Whether this kind fails the whole session when it surfaces.
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::Auth | Self::BudgetExhausted)
    }

    /// Breaker accounting family for this kind.
    pub fn family(self) -> FailureFamily {
        match self {
            Self::Transient | Self::Unavailable | Self::Timeout => FailureFamily::Availability,
            Self::RateLimited => FailureFamily::Throttle,
            Self::Auth | Self::InvalidRequest | Self::BudgetExhausted => FailureFamily::Fatal,
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::Auth => write!(f, "auth"),
            Self::InvalidRequest => write!(f, "invalid_request"),
            Self::BudgetExhausted => write!(f, "budget_exhausted"),
            Self::Unavailable => write!(f, "unavailable"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// Breaker accounting family — breakers key on `(model, family)` so a
/// throttled model is tracked separately from a down one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureFamily {
    /// Transient faults, outages, deadline misses.
    Availability,
    /// Rate limiting.
    Throttle,
    /// Non-retriable request or account faults.
    Fatal,
}

impl std::fmt::Display for FailureFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Availability => write!(f, "availability"),
            Self::Throttle => write!(f, "throttle"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// Error from a single model invocation (after C1/C2 processing).
#[derive(Debug, Clone, Error)]
pub enum InvokeError {
    /// Classified upstream failure.
    #[error("{model}: {kind}: {message}")]
    Failed {
        kind: FailureKind,
        model: String,
        message: String,
    },
    /// The session's cancellation signal fired mid-call; the result, if it
    /// ever arrives, is discarded.
    #[error("invocation cancelled")]
    Cancelled,
}

impl InvokeError {
    /// Construct a classified failure.
    pub fn failed(kind: FailureKind, model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            kind,
            model: model.into(),
            message: message.into(),
        }
    }

    /// The failure kind, if this is a classified failure.
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            Self::Failed { kind, .. } => Some(*kind),
            Self::Cancelled => None,
        }
    }

    /// Whether the retry policy may re-attempt.
    pub fn is_retriable(&self) -> bool {
        self.kind().map(FailureKind::is_retriable).unwrap_or(false)
    }
}

/// Error surfaced at the session-lifecycle API boundary.
///
/// These reject the call without mutating any state.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Session configuration failed validation.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    /// No session with the given id.
    #[error("session not found: {0}")]
    NotFound(String),
    /// The operation is not valid for the session's current status.
    #[error("invalid state for {operation}: session is {status}")]
    InvalidState { operation: String, status: String },
    /// `start` was called on a session that already left `pending`.
    #[error("session already started: {0}")]
    AlreadyStarted(String),
    /// Analytics requested before the debate reached judgment.
    #[error("not ready: {0}")]
    NotReady(String),
}
