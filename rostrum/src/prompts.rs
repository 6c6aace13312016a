//! Prompt composition — per-(phase, role) system instructions plus the
//! assembled debate context.
//!
//! Wording here is structural: it tells the model which role it plays and
//! what this phase requires, nothing more.

use crate::client::TurnPrompt;
use crate::context::render_transcript;
use crate::session::phase::{DebatePhase, Role};
use crate::session::Turn;

/// System instruction for `role` speaking in `phase`.
pub fn system_instruction(phase: DebatePhase, role: Role) -> String {
    if role.is_judge() {
        return "You are the judge of a structured debate. Weigh every argument \
                on its merits: logical soundness, quality of evidence, and \
                responsiveness to opposing points. Deliver a verdict naming the \
                stronger debater, with your reasoning and a confidence level."
            .to_string();
    }

    let position = match role.debater_index() {
        Some(0) => "You argue FOR the motion.",
        Some(1) => "You argue AGAINST the motion.",
        _ => "You argue the distinct position assigned to your seat.",
    };

    let phase_brief = match phase {
        DebatePhase::Opening => {
            "Opening statement: lay out your position and your strongest \
             grounds. Do not rebut; the other side has not spoken yet."
        }
        DebatePhase::FirstRound => {
            "First argued round: develop your case with concrete evidence and \
             address the opposing opening directly."
        }
        DebatePhase::Rebuttal => {
            "Rebuttal: attack the weakest points of the opposing case and \
             reinforce your own where it was challenged."
        }
        DebatePhase::CrossExamination => {
            "Cross-examination: if asked a question, answer it directly before \
             anything else. If it is your question, ask one pointed question \
             that exposes a weakness."
        }
        DebatePhase::Closing => {
            "Closing statement: summarise why your case prevails. No new \
             arguments."
        }
        _ => "Contribute your turn for this phase.",
    };

    format!(
        "You are {role} in a structured debate. {position} {phase_brief} \
         Keep your turn focused and grounded; cite evidence where you have it."
    )
}

/// Compose the full prompt for one turn.
pub fn compose(
    phase: DebatePhase,
    role: Role,
    topic: &str,
    reference: Option<&str>,
    transcript: &[Turn],
    token_ceiling: usize,
) -> TurnPrompt {
    let mut user = format!("Motion under debate: {topic}\n");

    if let Some(reference) = reference {
        user.push_str("\nReference material:\n");
        user.push_str(reference);
        user.push('\n');
    }

    if transcript.is_empty() {
        user.push_str("\nNo turns have been taken yet.\n");
    } else {
        user.push_str("\nTranscript so far:\n");
        user.push_str(&render_transcript(transcript, token_ceiling));
        user.push('\n');
    }

    user.push_str(&format!("\nIt is now your turn as {role}."));

    TurnPrompt::new(system_instruction(phase, role), user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_support::turn_at;

    #[test]
    fn test_judge_instruction_is_phase_independent() {
        let instruction = system_instruction(DebatePhase::Judgment, Role::Judge);
        assert!(instruction.contains("judge"));
        assert!(instruction.contains("verdict"));
    }

    #[test]
    fn test_opening_forbids_rebuttal() {
        let instruction = system_instruction(DebatePhase::Opening, Role::Debater(0));
        assert!(instruction.contains("Do not rebut"));
        assert!(instruction.contains("FOR"));
    }

    #[test]
    fn test_sides_differ() {
        let a = system_instruction(DebatePhase::Rebuttal, Role::Debater(0));
        let b = system_instruction(DebatePhase::Rebuttal, Role::Debater(1));
        assert!(a.contains("FOR"));
        assert!(b.contains("AGAINST"));
    }

    #[test]
    fn test_compose_includes_topic_and_reference() {
        let prompt = compose(
            DebatePhase::Opening,
            Role::Debater(0),
            "Adopt AI customer support",
            Some("Q3 support cost report"),
            &[],
            1_000,
        );
        assert!(prompt.user.contains("Adopt AI customer support"));
        assert!(prompt.user.contains("Q3 support cost report"));
        assert!(prompt.user.contains("No turns have been taken"));
    }

    #[test]
    fn test_compose_includes_transcript() {
        let turns = vec![turn_at(0, Role::Debater(0), "The opening position on costs.")];
        let prompt = compose(
            DebatePhase::Rebuttal,
            Role::Debater(1),
            "topic",
            None,
            &turns,
            1_000,
        );
        assert!(prompt.user.contains("The opening position on costs."));
        assert!(prompt.user.contains("your turn as debater_b"));
    }
}
