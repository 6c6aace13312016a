//! Rostrum — multi-model debate orchestration runtime.
//!
//! Drives a bounded, multi-phase argumentative exchange between several LLM
//! participants in assigned roles (two or more debaters plus a judge),
//! adjudicates outcomes, and produces structured analytics from the
//! transcript.
//!
//! # Architecture
//!
//! ```text
//! DebateService (api)
//!   └─ DebateRuntime (orchestrator) — one task per session, strictly serial
//!        ├─ ModelPool + RotationEngine (pool)     role → model binding
//!        ├─ ResilientClient (resilience)          retry + breakers + fallback
//!        │    └─ ModelClient (client)             deadline, cancel, metrics
//!        ├─ ArgumentAnalyzer (analyzer)           structure/evidence/fallacies
//!        ├─ AdaptiveRoundManager (rounds)         continue/extend/reduce/stop
//!        ├─ EventBus (events)                     ordered observer stream
//!        └─ run_analytics (analytics)             chains/consensus/judgment
//! ```
//!
//! Sessions are parallel across, serial within; the three process-wide
//! structures (pool stats, breaker table, retry ledger) sit behind short
//! critical sections.

pub mod analytics;
pub mod analyzer;
pub mod api;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod pool;
pub mod prompts;
pub mod resilience;
pub mod rounds;
pub mod session;
pub mod telemetry;

pub use analytics::{AnalysisKind, DebateAnalytics};
pub use analyzer::{ArgumentAnalyzer, ArgumentRecord, StrengthWeights};
pub use api::{AnalyticsArtifact, CreatedSession, DebateService, SessionRequest};
pub use client::{Completion, ModelClient, ModelProvider, OpenAiCompatProvider, TurnPrompt};
pub use config::DebateConfig;
pub use error::{ApiError, FailureFamily, FailureKind, InvokeError};
pub use events::{DebateEvent, EventBus, SequencedEvent, SessionProjection, SharedEventBus};
pub use pool::{CostTier, ModelPool, ModelSpec, RotationDecision, RotationStrategy};
pub use resilience::{BreakerConfig, BreakerTable, ResilientClient, RetryLedger, RetryPolicy};
pub use rounds::{AdaptiveRoundManager, RoundAction, RoundDecision};
pub use session::{DebatePhase, Role, Session, SessionStatus, Turn};
pub use telemetry::{init_tracing, CallRecord, MetricsObserver};
