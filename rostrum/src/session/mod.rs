//! Session data model — sessions own rounds, rounds own turns.
//!
//! The orchestrator is the single writer; everything here validates rather
//! than decides. A turn is appended only when it is that role's turn in the
//! current round's expected lineup, computed once from the turn-order table
//! when the round opens.

pub mod phase;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analytics::DebateAnalytics;
use crate::analyzer::ArgumentRecord;
use crate::config::DebateConfig;
use crate::context::ContextSnapshot;
use crate::pool::RotationDecision;
use crate::rounds::RoundDecision;

pub use phase::{round_speakers, DebatePhase, Role};

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    /// Whether no further turn may ever be appended.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A single utterance by a role in a phase. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Session-wide 0-based monotonic index.
    pub index: usize,
    pub role: Role,
    /// Model bound to the role at the time of speaking.
    pub model: String,
    pub phase: DebatePhase,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub latency_ms: u64,
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// Quality scores from the argument analyzer.
    pub analysis: ArgumentRecord,
}

/// An ordered group of turns with its post-round artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    /// 1-based round index, unique across the session.
    pub index: u32,
    pub phase: DebatePhase,
    /// Speaker lineup this round must follow, in order.
    pub expected: Vec<Role>,
    pub turns: Vec<Turn>,
    pub snapshot: Option<ContextSnapshot>,
    pub decision: Option<RoundDecision>,
    pub started_at: DateTime<Utc>,
}

impl Round {
    /// Whether every expected speaker has spoken.
    pub fn is_complete(&self) -> bool {
        self.turns.len() >= self.expected.len()
    }

    /// Mean argument strength per debater in this round, declaration order.
    pub fn role_strengths(&self) -> Vec<(Role, f64)> {
        let mut sums: HashMap<Role, (f64, u32)> = HashMap::new();
        for turn in &self.turns {
            if turn.role.is_judge() {
                continue;
            }
            let entry = sums.entry(turn.role).or_insert((0.0, 0));
            entry.0 += turn.analysis.strength;
            entry.1 += 1;
        }
        let mut strengths: Vec<(Role, f64)> = sums
            .into_iter()
            .map(|(role, (sum, n))| (role, sum / f64::from(n.max(1))))
            .collect();
        strengths.sort_by_key(|(role, _)| *role);
        strengths
    }

    /// The debater who scored lowest this round (declaration order breaks
    /// ties). Used to pick the cross-examination asker.
    pub fn lowest_scoring_debater(&self) -> Option<u8> {
        self.role_strengths()
            .into_iter()
            .filter_map(|(role, strength)| role.debater_index().map(|i| (i, strength)))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(index, _)| index)
    }
}

/// Aggregated session statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStats {
    pub turns: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_estimate: f64,
    pub error_count: u32,
    pub duration_ms: u64,
}

/// A recorded phase transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: DebatePhase,
    pub to: DebatePhase,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Error for invalid phase transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition {from} → {to}: {reason}")]
pub struct TransitionError {
    pub from: DebatePhase,
    pub to: DebatePhase,
    pub reason: String,
}

/// Error from appending a turn.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TurnError {
    /// The session is terminal; nothing may be appended.
    #[error("session is terminal ({status})")]
    SessionTerminal { status: String },
    /// The turn's phase does not match the session's current phase.
    #[error("turn phase {turn} does not match session phase {session}")]
    PhaseMismatch { turn: String, session: String },
    /// No round is open, or the open round is already complete.
    #[error("no open round accepts turns")]
    NoOpenRound,
    /// Not this role's turn.
    #[error("out of order: expected {expected}, got {actual}")]
    OutOfOrder { expected: String, actual: String },
    /// Turn index is not the next monotonic index.
    #[error("non-monotonic turn index: expected {expected}, got {actual}")]
    BadIndex { expected: usize, actual: usize },
}

/// The root entity: one debate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    /// Immutable debate topic.
    pub topic: String,
    /// Optional opaque reference material.
    pub reference: Option<String>,
    pub debater_count: u8,
    /// Current role → model binding. Changes only at phase boundaries,
    /// except the emergency failover path.
    pub assignment: HashMap<Role, String>,
    pub status: SessionStatus,
    pub phase: DebatePhase,
    pub rounds: Vec<Round>,
    pub transitions: Vec<PhaseTransition>,
    pub rotation_history: Vec<RotationDecision>,
    pub stats: SessionStats,
    /// Present once post-debate analytics have run.
    pub analytics: Option<DebateAnalytics>,
    pub failure_reason: Option<String>,
    pub config: DebateConfig,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(
        topic: impl Into<String>,
        reference: Option<String>,
        debater_count: u8,
        assignment: HashMap<Role, String>,
        config: DebateConfig,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            topic: topic.into(),
            reference,
            debater_count,
            assignment,
            status: SessionStatus::Pending,
            phase: DebatePhase::Initialization,
            rounds: Vec::new(),
            transitions: Vec::new(),
            rotation_history: Vec::new(),
            stats: SessionStats::default(),
            analytics: None,
            failure_reason: None,
            config,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
        }
    }

    /// Transition to a new phase, recording the step.
    ///
    /// Entering a terminal phase also settles the status and end time.
    pub fn transition(&mut self, to: DebatePhase, reason: &str) -> Result<(), TransitionError> {
        if !self.phase.valid_transitions().contains(&to) {
            return Err(TransitionError {
                from: self.phase,
                to,
                reason: format!("allowed: {:?}", self.phase.valid_transitions()),
            });
        }
        self.transitions.push(PhaseTransition {
            from: self.phase,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        self.phase = to;
        match to {
            DebatePhase::Completed => self.settle(SessionStatus::Completed),
            DebatePhase::Failed => self.settle(SessionStatus::Failed),
            DebatePhase::Cancelled => self.settle(SessionStatus::Cancelled),
            _ => {}
        }
        Ok(())
    }

    fn settle(&mut self, status: SessionStatus) {
        self.status = status;
        self.ended_at = Some(Utc::now());
        if let (Some(started), Some(ended)) = (self.started_at, self.ended_at) {
            self.stats.duration_ms = (ended - started).num_milliseconds().max(0) as u64;
        }
    }

    /// Open a new round in `phase` with its expected speaker lineup.
    pub fn begin_round(&mut self, phase: DebatePhase, expected: Vec<Role>) -> u32 {
        let index = self.rounds.len() as u32 + 1;
        self.rounds.push(Round {
            index,
            phase,
            expected,
            turns: Vec::new(),
            snapshot: None,
            decision: None,
            started_at: Utc::now(),
        });
        index
    }

    /// The role expected to speak next in the open round.
    pub fn expected_next_role(&self) -> Option<Role> {
        let round = self.rounds.last()?;
        round.expected.get(round.turns.len()).copied()
    }

    /// Append a turn. This is the turn-order predicate's enforcement point;
    /// rejected appends leave the session unchanged.
    pub fn append_turn(&mut self, turn: Turn) -> Result<(), TurnError> {
        if self.status.is_terminal() {
            return Err(TurnError::SessionTerminal {
                status: self.status.to_string(),
            });
        }
        if turn.phase != self.phase {
            return Err(TurnError::PhaseMismatch {
                turn: turn.phase.to_string(),
                session: self.phase.to_string(),
            });
        }
        let expected_index = self.turn_count();
        let Some(expected_role) = self.expected_next_role() else {
            return Err(TurnError::NoOpenRound);
        };
        if turn.role != expected_role {
            return Err(TurnError::OutOfOrder {
                expected: expected_role.to_string(),
                actual: turn.role.to_string(),
            });
        }
        if turn.index != expected_index {
            return Err(TurnError::BadIndex {
                expected: expected_index,
                actual: turn.index,
            });
        }

        self.stats.turns += 1;
        self.stats.input_tokens += u64::from(turn.input_tokens);
        self.stats.output_tokens += u64::from(turn.output_tokens);
        let round = self.rounds.last_mut().expect("open round checked above");
        round.turns.push(turn);
        Ok(())
    }

    /// All turns in append order.
    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.rounds.iter().flat_map(|r| r.turns.iter())
    }

    pub fn turn_count(&self) -> usize {
        self.rounds.iter().map(|r| r.turns.len()).sum()
    }

    /// Ordered turns from index `from` (0 returns the full transcript).
    pub fn transcript_from(&self, from: usize) -> Vec<Turn> {
        self.turns().skip(from).cloned().collect()
    }

    /// The currently open round, if it still accepts turns.
    pub fn open_round(&self) -> Option<&Round> {
        self.rounds.last().filter(|r| !r.is_complete())
    }

    pub fn current_round_mut(&mut self) -> Option<&mut Round> {
        self.rounds.last_mut()
    }

    /// Rounds consumed from the middle-phase budget.
    pub fn middle_rounds_used(&self) -> u32 {
        self.rounds.iter().filter(|r| r.phase.is_middle()).count() as u32
    }

    /// Compact status line.
    pub fn status_line(&self) -> String {
        format!(
            "[{}] phase={} rounds={} turns={} | {}",
            self.status,
            self.phase,
            self.rounds.len(),
            self.turn_count(),
            self.topic
        )
    }
}
