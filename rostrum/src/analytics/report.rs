//! Final report — prose synthesis of the debate and its analyses.
//!
//! Always produced; missing sub-analyses are listed as omissions rather
//! than failing the report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::chains::ChainAnalysis;
use super::consensus::ConsensusReport;
use super::judgment::Judgment;
use crate::rounds::RoundAction;
use crate::session::Session;

/// The synthesised end-of-debate report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalReport {
    pub session_id: String,
    pub generated_at: DateTime<Utc>,
    pub summary: String,
    /// Sub-analyses that could not be produced, with reasons.
    pub omissions: Vec<String>,
}

/// Assemble the final report from whatever analyses succeeded.
pub fn build_report(
    session: &Session,
    chains: Option<&ChainAnalysis>,
    consensus: Option<&ConsensusReport>,
    judgment: Option<&Judgment>,
    omissions: Vec<String>,
) -> FinalReport {
    let mut summary = String::new();

    summary.push_str(&format!(
        "Debate on \"{}\" ran {} rounds and {} turns, ending {}.",
        session.topic,
        session.rounds.len(),
        session.turn_count(),
        session.status,
    ));

    let truncated = session
        .rounds
        .iter()
        .filter_map(|r| r.decision.as_ref())
        .any(|d| matches!(d.action, RoundAction::TerminateEarly | RoundAction::Reduce));
    if truncated {
        summary.push_str(
            " The exchange was truncated by the round manager before the full \
             phase plan played out.",
        );
    }

    if let Some(judgment) = judgment {
        match judgment.winner {
            Some(winner) => summary.push_str(&format!(
                " Verdict: {winner} prevails (confidence {:.2}, margin {:.2}).",
                judgment.confidence, judgment.margin
            )),
            None => summary.push_str(" Verdict: no winner could be named."),
        }
        if !judgment.biases.is_empty() {
            let names: Vec<String> = judgment.biases.iter().map(|b| b.bias.to_string()).collect();
            summary.push_str(&format!(
                " The verdict shows possible {} bias.",
                names.join(", ")
            ));
        }
    }

    if let Some(chains) = chains {
        if let Some(best) = chains.strongest.first() {
            summary.push_str(&format!(
                " The strongest argument thread spans turns {:?} (depth {}, cumulative strength {:.2}).",
                best.turns, best.depth, best.cumulative_strength
            ));
        }
    }

    if let Some(consensus) = consensus {
        summary.push_str(&format!(
            " {} common-ground items and {} typed disagreements were identified; polarisation {:.2}.",
            consensus.common_ground.len(),
            consensus.disagreements.len(),
            consensus.polarisation
        ));
    }

    if !omissions.is_empty() {
        summary.push_str(&format!(" Omitted analyses: {}.", omissions.join("; ")));
    }

    FinalReport {
        session_id: session.id.clone(),
        generated_at: Utc::now(),
        summary,
        omissions,
    }
}
