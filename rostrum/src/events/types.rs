//! Observer event types.
//!
//! Events drive the push contract: subscribers receive a totally ordered
//! stream per session, each event stamped with a session-scoped sequence
//! number at publish time. Delivery is at-least-once within process
//! lifetime; subscribers key idempotence on `(session_id, seq)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pool::RotationDecision;
use crate::rounds::RoundDecision;
use crate::session::phase::DebatePhase;
use crate::session::{SessionStatus, Turn};

/// All observer events, unsequenced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DebateEvent {
    /// The session's runtime task has started.
    SessionStarted {
        session_id: String,
        topic: String,
        timestamp: DateTime<Utc>,
    },

    /// The session entered a new phase.
    PhaseEntered {
        session_id: String,
        phase: DebatePhase,
        timestamp: DateTime<Utc>,
    },

    /// A turn was committed to the transcript.
    TurnCompleted {
        session_id: String,
        turn: Turn,
        timestamp: DateTime<Utc>,
    },

    /// A round closed with the round manager's decision.
    RoundClosed {
        session_id: String,
        round_index: u32,
        decision: RoundDecision,
        timestamp: DateTime<Utc>,
    },

    /// A role's model binding changed.
    RotationApplied {
        session_id: String,
        decision: RotationDecision,
        timestamp: DateTime<Utc>,
    },

    /// The session reached a terminal state.
    SessionEnded {
        session_id: String,
        status: SessionStatus,
        reason: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

impl DebateEvent {
    pub fn session_id(&self) -> &str {
        match self {
            Self::SessionStarted { session_id, .. }
            | Self::PhaseEntered { session_id, .. }
            | Self::TurnCompleted { session_id, .. }
            | Self::RoundClosed { session_id, .. }
            | Self::RotationApplied { session_id, .. }
            | Self::SessionEnded { session_id, .. } => session_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SessionStarted { .. } => "session_started",
            Self::PhaseEntered { .. } => "phase_entered",
            Self::TurnCompleted { .. } => "turn_completed",
            Self::RoundClosed { .. } => "round_closed",
            Self::RotationApplied { .. } => "rotation_applied",
            Self::SessionEnded { .. } => "session_ended",
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::SessionStarted { timestamp, .. }
            | Self::PhaseEntered { timestamp, .. }
            | Self::TurnCompleted { timestamp, .. }
            | Self::RoundClosed { timestamp, .. }
            | Self::RotationApplied { timestamp, .. }
            | Self::SessionEnded { timestamp, .. } => *timestamp,
        }
    }
}

/// An event stamped with its session-scoped sequence number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequencedEvent {
    /// 0-based, strictly monotonic per session.
    pub seq: u64,
    pub event: DebateEvent,
}
