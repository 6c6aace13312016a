//! Event replay — rebuild observable session state from the event stream.
//!
//! A [`SessionProjection`] applied over any prefix of a session's ordered
//! events reconstructs the session as it stood at that point. Replay is
//! idempotent on `(session_id, seq)`: re-delivered events are ignored.

use serde::{Deserialize, Serialize};

use super::types::{DebateEvent, SequencedEvent};
use crate::pool::RotationDecision;
use crate::session::phase::DebatePhase;
use crate::session::{SessionStatus, Turn};

/// Observable session state rebuilt from events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionProjection {
    pub session_id: Option<String>,
    pub phase: Option<DebatePhase>,
    pub status: Option<SessionStatus>,
    pub turns: Vec<Turn>,
    pub rotations: Vec<RotationDecision>,
    pub rounds_closed: u32,
    pub end_reason: Option<String>,
    next_seq: u64,
}

impl SessionProjection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event. Out-of-date duplicates are ignored; gaps panic in
    /// debug builds only via the ordering assertion of callers that care.
    pub fn apply(&mut self, sequenced: &SequencedEvent) {
        if sequenced.seq < self.next_seq {
            return; // at-least-once delivery: duplicate
        }
        self.next_seq = sequenced.seq + 1;

        match &sequenced.event {
            DebateEvent::SessionStarted { session_id, .. } => {
                self.session_id = Some(session_id.clone());
                self.status = Some(SessionStatus::Running);
            }
            DebateEvent::PhaseEntered { phase, .. } => {
                self.phase = Some(*phase);
            }
            DebateEvent::TurnCompleted { turn, .. } => {
                self.turns.push(turn.clone());
            }
            DebateEvent::RoundClosed { .. } => {
                self.rounds_closed += 1;
            }
            DebateEvent::RotationApplied { decision, .. } => {
                self.rotations.push(decision.clone());
            }
            DebateEvent::SessionEnded { status, reason, .. } => {
                self.status = Some(*status);
                self.phase = Some(match status {
                    SessionStatus::Completed => DebatePhase::Completed,
                    SessionStatus::Cancelled => DebatePhase::Cancelled,
                    _ => DebatePhase::Failed,
                });
                self.end_reason = reason.clone();
            }
        }
    }

    /// Replay a full ordered stream.
    pub fn replay(events: &[SequencedEvent]) -> Self {
        let mut projection = Self::new();
        for event in events {
            projection.apply(event);
        }
        projection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_support::turn_at;
    use crate::session::phase::Role;
    use chrono::Utc;

    fn stream() -> Vec<SequencedEvent> {
        let events = vec![
            DebateEvent::SessionStarted {
                session_id: "s1".to_string(),
                topic: "t".to_string(),
                timestamp: Utc::now(),
            },
            DebateEvent::PhaseEntered {
                session_id: "s1".to_string(),
                phase: DebatePhase::Opening,
                timestamp: Utc::now(),
            },
            DebateEvent::TurnCompleted {
                session_id: "s1".to_string(),
                turn: turn_at(0, Role::Debater(0), "opening"),
                timestamp: Utc::now(),
            },
            DebateEvent::SessionEnded {
                session_id: "s1".to_string(),
                status: SessionStatus::Cancelled,
                reason: Some("cancel requested".to_string()),
                timestamp: Utc::now(),
            },
        ];
        events
            .into_iter()
            .enumerate()
            .map(|(i, event)| SequencedEvent {
                seq: i as u64,
                event,
            })
            .collect()
    }

    #[test]
    fn test_replay_reconstructs_state() {
        let projection = SessionProjection::replay(&stream());
        assert_eq!(projection.session_id.as_deref(), Some("s1"));
        assert_eq!(projection.status, Some(SessionStatus::Cancelled));
        assert_eq!(projection.phase, Some(DebatePhase::Cancelled));
        assert_eq!(projection.turns.len(), 1);
        assert_eq!(projection.end_reason.as_deref(), Some("cancel requested"));
    }

    #[test]
    fn test_prefix_replay() {
        let events = stream();
        let partial = SessionProjection::replay(&events[..2]);
        assert_eq!(partial.phase, Some(DebatePhase::Opening));
        assert_eq!(partial.status, Some(SessionStatus::Running));
        assert!(partial.turns.is_empty());
    }

    #[test]
    fn test_duplicates_are_idempotent() {
        let events = stream();
        let mut projection = SessionProjection::new();
        for event in &events {
            projection.apply(event);
            projection.apply(event); // redeliver
        }
        assert_eq!(projection.turns.len(), 1);
        assert_eq!(projection.rounds_closed, 0);
    }
}
