//! Debate phases, participant roles, and per-phase turn order.
//!
//! # Phase flow
//!
//! ```text
//! Initialization → Opening → FirstRound → Rebuttal → CrossExamination
//!                                │            │            │
//!                                │            │            ├──→ Closing → Judgment → Completed
//!                                │            └────────────┴──→ Closing / Judgment (reduce / early termination)
//!                                └─────────────────────────────→ Closing / Judgment
//!
//! any non-terminal phase ──→ Failed | Cancelled
//! ```
//!
//! No phase is ever revisited; multiple rebuttal rounds all happen inside
//! the single `Rebuttal` phase.

use serde::{Deserialize, Serialize};

/// Phase of a debate session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebatePhase {
    /// Session created, assignment resolved, not yet speaking.
    Initialization,
    /// Each debater states their position once, declared order.
    Opening,
    /// First argued round, debaters in declared order.
    FirstRound,
    /// Alternating rebuttal rounds.
    Rebuttal,
    /// Question/answer pairs led by the trailing debater.
    CrossExamination,
    /// Each debater summarises once, declared order.
    Closing,
    /// Single turn by the judge.
    Judgment,
    /// Terminal: debate ran to verdict.
    Completed,
    /// Terminal: unrecoverable failure.
    Failed,
    /// Terminal: cancelled by request.
    Cancelled,
}

impl DebatePhase {
    /// Whether this is a terminal phase.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether rounds in this phase count against the round budget.
    pub fn is_middle(self) -> bool {
        matches!(self, Self::FirstRound | Self::Rebuttal | Self::CrossExamination)
    }

    /// Valid transitions from this phase.
    pub fn valid_transitions(self) -> &'static [DebatePhase] {
        match self {
            Self::Initialization => &[Self::Opening, Self::Failed, Self::Cancelled],
            Self::Opening => &[Self::FirstRound, Self::Failed, Self::Cancelled],
            Self::FirstRound => &[
                Self::Rebuttal,
                Self::CrossExamination,
                Self::Closing,
                Self::Judgment,
                Self::Failed,
                Self::Cancelled,
            ],
            Self::Rebuttal => &[
                Self::CrossExamination,
                Self::Closing,
                Self::Judgment,
                Self::Failed,
                Self::Cancelled,
            ],
            Self::CrossExamination => &[Self::Closing, Self::Judgment, Self::Failed, Self::Cancelled],
            Self::Closing => &[Self::Judgment, Self::Failed, Self::Cancelled],
            Self::Judgment => &[Self::Completed, Self::Failed, Self::Cancelled],
            Self::Completed | Self::Failed | Self::Cancelled => &[],
        }
    }

    /// Whether `target` is reachable from this phase (reflexively true).
    pub fn reaches(self, target: DebatePhase) -> bool {
        if self == target {
            return true;
        }
        let mut frontier = vec![self];
        let mut seen = vec![self];
        while let Some(phase) = frontier.pop() {
            for &next in phase.valid_transitions() {
                if next == target {
                    return true;
                }
                if !seen.contains(&next) {
                    seen.push(next);
                    frontier.push(next);
                }
            }
        }
        false
    }
}

impl std::fmt::Display for DebatePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initialization => write!(f, "initialization"),
            Self::Opening => write!(f, "opening"),
            Self::FirstRound => write!(f, "first_round"),
            Self::Rebuttal => write!(f, "rebuttal"),
            Self::CrossExamination => write!(f, "cross_examination"),
            Self::Closing => write!(f, "closing"),
            Self::Judgment => write!(f, "judgment"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Participant identity: a debater by declaration index, or the judge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Debater(u8),
    Judge,
}

impl Role {
    /// The declared debater lineup for a session of `count` debaters.
    pub fn debaters(count: u8) -> Vec<Role> {
        (0..count).map(Role::Debater).collect()
    }

    /// Debater declaration index, if this is a debater.
    pub fn debater_index(self) -> Option<u8> {
        match self {
            Self::Debater(index) => Some(index),
            Self::Judge => None,
        }
    }

    pub fn is_judge(self) -> bool {
        matches!(self, Self::Judge)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Judge => write!(f, "judge"),
            Self::Debater(index) if *index < 26 => {
                write!(f, "debater_{}", (b'a' + index) as char)
            }
            Self::Debater(index) => write!(f, "debater_{index}"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "judge" {
            return Ok(Self::Judge);
        }
        let suffix = s
            .strip_prefix("debater_")
            .ok_or_else(|| format!("unknown role: {s}"))?;
        if suffix.len() == 1 {
            let byte = suffix.as_bytes()[0];
            if byte.is_ascii_lowercase() {
                return Ok(Self::Debater(byte - b'a'));
            }
        }
        suffix
            .parse::<u8>()
            .map(Self::Debater)
            .map_err(|_| format!("unknown role: {s}"))
    }
}

// Roles serialize as their display string so they can key JSON maps.
impl Serialize for Role {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// The speaker sequence for one round of `phase`.
///
/// This table is the single source of truth for turn order; a round's
/// expected lineup is computed once when the round opens and appended turns
/// are validated against it.
///
/// `cross_asker` selects who leads cross-examination: the previous round's
/// lowest-scoring debater (declaration order breaking ties).
pub fn round_speakers(phase: DebatePhase, debater_count: u8, cross_asker: Option<u8>) -> Vec<Role> {
    match phase {
        DebatePhase::Opening
        | DebatePhase::FirstRound
        | DebatePhase::Rebuttal
        | DebatePhase::Closing => Role::debaters(debater_count),
        DebatePhase::CrossExamination => {
            let asker = cross_asker.unwrap_or(0).min(debater_count.saturating_sub(1));
            let mut order = Vec::new();
            for other in 0..debater_count {
                if other != asker {
                    order.push(Role::Debater(asker));
                    order.push(Role::Debater(other));
                }
            }
            order
        }
        DebatePhase::Judgment => vec![Role::Judge],
        _ => Vec::new(),
    }
}
