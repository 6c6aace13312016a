//! Multi-perspective judgment — dimension scores, bias detection, winner.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::session::phase::Role;
use crate::session::Turn;

/// Evaluation dimensions for the judge's verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgmentDimension {
    Logical,
    Rhetorical,
    Factual,
    Ethical,
    Practical,
    Emotional,
    Cultural,
    Legal,
}

impl JudgmentDimension {
    pub fn all() -> &'static [JudgmentDimension] {
        &[
            Self::Logical,
            Self::Rhetorical,
            Self::Factual,
            Self::Ethical,
            Self::Practical,
            Self::Emotional,
            Self::Cultural,
            Self::Legal,
        ]
    }

    fn cues(self) -> &'static [&'static str] {
        match self {
            Self::Logical => &["logic", "follows", "consistent", "premise", "conclusion"],
            Self::Rhetorical => &["persuasive", "compelling", "framed", "articulate"],
            Self::Factual => &["evidence", "data", "facts", "figures", "cited"],
            Self::Ethical => &["ethical", "fair", "moral", "integrity"],
            Self::Practical => &["practical", "feasible", "implementation", "cost"],
            Self::Emotional => &["emotional", "empathy", "feel", "tone"],
            Self::Cultural => &["cultural", "norms", "community", "public opinion"],
            Self::Legal => &["legal", "regulation", "liability", "compliance"],
        }
    }
}

impl std::fmt::Display for JudgmentDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Logical => write!(f, "logical"),
            Self::Rhetorical => write!(f, "rhetorical"),
            Self::Factual => write!(f, "factual"),
            Self::Ethical => write!(f, "ethical"),
            Self::Practical => write!(f, "practical"),
            Self::Emotional => write!(f, "emotional"),
            Self::Cultural => write!(f, "cultural"),
            Self::Legal => write!(f, "legal"),
        }
    }
}

/// Cognitive biases screened for in the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CognitiveBias {
    Anchoring,
    ConfirmationBias,
    AvailabilityHeuristic,
    HaloEffect,
    Bandwagon,
    AuthorityBias,
    RecencyBias,
    FramingEffect,
}

impl std::fmt::Display for CognitiveBias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anchoring => write!(f, "anchoring"),
            Self::ConfirmationBias => write!(f, "confirmation_bias"),
            Self::AvailabilityHeuristic => write!(f, "availability_heuristic"),
            Self::HaloEffect => write!(f, "halo_effect"),
            Self::Bandwagon => write!(f, "bandwagon"),
            Self::AuthorityBias => write!(f, "authority_bias"),
            Self::RecencyBias => write!(f, "recency_bias"),
            Self::FramingEffect => write!(f, "framing_effect"),
        }
    }
}

/// Score along one dimension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionScore {
    pub dimension: JudgmentDimension,
    pub score: f64,
}

/// One detected bias with its textual evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiasFinding {
    pub bias: CognitiveBias,
    pub evidence: String,
}

/// The cross-evaluated verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Judgment {
    pub winner: Option<Role>,
    pub confidence: f64,
    /// Strength gap between winner and runner-up.
    pub margin: f64,
    pub dimensions: Vec<DimensionScore>,
    pub biases: Vec<BiasFinding>,
}

/// Cross-evaluate the judge's turn against the transcript.
pub fn evaluate_judgment(turns: &[Turn], debater_count: u8) -> Result<Judgment, String> {
    let judge_turn = turns.iter().rev().find(|t| t.role.is_judge());

    // Aggregate mean strength per debater from the whole transcript.
    let mut sums: HashMap<Role, (f64, u32)> = HashMap::new();
    for turn in turns.iter().filter(|t| !t.role.is_judge()) {
        let entry = sums.entry(turn.role).or_insert((0.0, 0));
        entry.0 += turn.analysis.strength;
        entry.1 += 1;
    }
    if sums.is_empty() {
        return Err("no debater turns to judge".to_string());
    }
    let mut ranked: Vec<(Role, f64)> = sums
        .into_iter()
        .map(|(role, (sum, n))| (role, sum / f64::from(n.max(1))))
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    // Prefer an explicit verdict in the judge's text; fall back to the
    // aggregate ranking.
    let named = judge_turn.and_then(|turn| named_winner(&turn.content, debater_count));
    let winner = named.or(ranked.first().map(|(role, _)| *role));

    let margin = if ranked.len() >= 2 {
        (ranked[0].1 - ranked[1].1).abs()
    } else {
        ranked[0].1
    };
    let confidence = (0.5 + margin).clamp(0.0, 0.95);

    let dimensions = JudgmentDimension::all()
        .iter()
        .map(|dimension| {
            let score = judge_turn
                .map(|turn| dimension_score(&turn.content, *dimension))
                .unwrap_or(0.0);
            DimensionScore {
                dimension: *dimension,
                score,
            }
        })
        .collect();

    let biases = judge_turn
        .map(|turn| detect_biases(&turn.content))
        .unwrap_or_default();

    Ok(Judgment {
        winner,
        confidence,
        margin,
        dimensions,
        biases,
    })
}

/// Find an explicitly named winner in the verdict text.
fn named_winner(verdict: &str, debater_count: u8) -> Option<Role> {
    let lower = verdict.to_lowercase();
    for role in Role::debaters(debater_count) {
        let name = role.to_string();
        for cue in ["wins", "prevails", "is the stronger", "stronger case"] {
            if lower.contains(&format!("{name} {cue}")) {
                return Some(role);
            }
        }
        if lower.contains(&format!("winner: {name}")) || lower.contains(&format!("winner is {name}"))
        {
            return Some(role);
        }
    }
    None
}

fn dimension_score(verdict: &str, dimension: JudgmentDimension) -> f64 {
    let lower = verdict.to_lowercase();
    let hits = dimension
        .cues()
        .iter()
        .filter(|cue| lower.contains(*cue))
        .count();
    (0.3 + 0.2 * hits as f64).clamp(0.0, 1.0)
}

fn bias_cues() -> &'static [(CognitiveBias, &'static [&'static str])] {
    &[
        (CognitiveBias::Anchoring, &["first impression", "from the outset", "initial claim"]),
        (CognitiveBias::ConfirmationBias, &["as i expected", "confirms my", "always believed"]),
        (CognitiveBias::AvailabilityHeuristic, &["comes to mind", "well-known example"]),
        (CognitiveBias::HaloEffect, &["overall impressive", "clearly brilliant"]),
        (CognitiveBias::Bandwagon, &["everyone agrees", "most people think", "popular view"]),
        (CognitiveBias::AuthorityBias, &["renowned", "famous expert", "prestigious"]),
        (CognitiveBias::RecencyBias, &["the final round alone", "most recent exchange"]),
        (CognitiveBias::FramingEffect, &["the only way to see", "no other framing"]),
    ]
}

/// Screen the verdict text for cognitive biases.
pub fn detect_biases(verdict: &str) -> Vec<BiasFinding> {
    let lower = verdict.to_lowercase();
    bias_cues()
        .iter()
        .filter_map(|(bias, cues)| {
            cues.iter().find(|cue| lower.contains(*cue)).map(|cue| BiasFinding {
                bias: *bias,
                evidence: (*cue).to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_support::{plain_analysis, turn_at};
    use crate::session::DebatePhase;

    fn judge_turn(index: usize, content: &str) -> Turn {
        let mut turn = turn_at(index, Role::Judge, content);
        turn.phase = DebatePhase::Judgment;
        turn
    }

    fn debater_turn(index: usize, role: Role, strength: f64) -> Turn {
        let mut turn = turn_at(index, role, "argument content");
        turn.analysis = plain_analysis(strength);
        turn
    }

    #[test]
    fn test_named_winner_wins_over_aggregate() {
        let turns = vec![
            debater_turn(0, Role::Debater(0), 0.9),
            debater_turn(1, Role::Debater(1), 0.3),
            judge_turn(2, "Despite the scores, debater_b wins on responsiveness."),
        ];
        let judgment = evaluate_judgment(&turns, 2).unwrap();
        assert_eq!(judgment.winner, Some(Role::Debater(1)));
    }

    #[test]
    fn test_aggregate_fallback_winner() {
        let turns = vec![
            debater_turn(0, Role::Debater(0), 0.8),
            debater_turn(1, Role::Debater(1), 0.4),
            judge_turn(2, "A close and thoughtful debate overall."),
        ];
        let judgment = evaluate_judgment(&turns, 2).unwrap();
        assert_eq!(judgment.winner, Some(Role::Debater(0)));
        assert!((judgment.margin - 0.4).abs() < 1e-9);
        assert!(judgment.confidence > 0.5);
    }

    #[test]
    fn test_no_debaters_degrades() {
        let turns = vec![judge_turn(0, "verdict with nobody to judge")];
        assert!(evaluate_judgment(&turns, 2).is_err());
    }

    #[test]
    fn test_all_eight_dimensions_scored() {
        let turns = vec![
            debater_turn(0, Role::Debater(0), 0.5),
            debater_turn(1, Role::Debater(1), 0.5),
            judge_turn(2, "The logic was consistent and the evidence well cited."),
        ];
        let judgment = evaluate_judgment(&turns, 2).unwrap();
        assert_eq!(judgment.dimensions.len(), 8);
        let logical = judgment
            .dimensions
            .iter()
            .find(|d| d.dimension == JudgmentDimension::Logical)
            .unwrap();
        let legal = judgment
            .dimensions
            .iter()
            .find(|d| d.dimension == JudgmentDimension::Legal)
            .unwrap();
        assert!(logical.score > legal.score);
    }

    #[test]
    fn test_bias_detection() {
        let findings =
            detect_biases("Everyone agrees the renowned first speaker was right, as I expected.");
        let biases: Vec<CognitiveBias> = findings.iter().map(|f| f.bias).collect();
        assert!(biases.contains(&CognitiveBias::Bandwagon));
        assert!(biases.contains(&CognitiveBias::AuthorityBias));
        assert!(biases.contains(&CognitiveBias::ConfirmationBias));
    }

    #[test]
    fn test_clean_verdict_has_no_biases() {
        let findings = detect_biases("Weighing each argument on its evidence, the case holds.");
        assert!(findings.is_empty());
    }

    #[test]
    fn test_display() {
        assert_eq!(JudgmentDimension::Practical.to_string(), "practical");
        assert_eq!(CognitiveBias::FramingEffect.to_string(), "framing_effect");
    }
}
