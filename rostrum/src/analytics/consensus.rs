//! Consensus report — common ground, typed disagreements, resolutions,
//! polarisation.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::session::phase::Role;
use crate::session::Turn;

/// Typed disagreement taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisagreementKind {
    Factual,
    Definitional,
    Methodological,
    ValueBased,
    Interpretive,
    Normative,
    Empirical,
}

impl std::fmt::Display for DisagreementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Factual => write!(f, "factual"),
            Self::Definitional => write!(f, "definitional"),
            Self::Methodological => write!(f, "methodological"),
            Self::ValueBased => write!(f, "value_based"),
            Self::Interpretive => write!(f, "interpretive"),
            Self::Normative => write!(f, "normative"),
            Self::Empirical => write!(f, "empirical"),
        }
    }
}

/// Proposed resolution taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionKind {
    Compromise,
    Synthesis,
    Alternative,
    Sequential,
    Conditional,
    Hybrid,
}

impl std::fmt::Display for ResolutionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Compromise => write!(f, "compromise"),
            Self::Synthesis => write!(f, "synthesis"),
            Self::Alternative => write!(f, "alternative"),
            Self::Sequential => write!(f, "sequential"),
            Self::Conditional => write!(f, "conditional"),
            Self::Hybrid => write!(f, "hybrid"),
        }
    }
}

impl DisagreementKind {
    /// Default proposed resolution for this kind of disagreement.
    pub fn default_resolution(self) -> ResolutionKind {
        match self {
            Self::Factual | Self::Empirical => ResolutionKind::Alternative,
            Self::Definitional => ResolutionKind::Synthesis,
            Self::Methodological => ResolutionKind::Sequential,
            Self::ValueBased | Self::Normative => ResolutionKind::Compromise,
            Self::Interpretive => ResolutionKind::Conditional,
        }
    }
}

/// A point all debaters touched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommonGround {
    pub statement: String,
    pub roles: Vec<Role>,
}

/// A detected disagreement with a proposed resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Disagreement {
    pub kind: DisagreementKind,
    pub description: String,
    pub resolution: ResolutionKind,
}

/// The full consensus report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusReport {
    pub common_ground: Vec<CommonGround>,
    pub disagreements: Vec<Disagreement>,
    /// 0 = debaters share most of their frame, 1 = fully disjoint.
    pub polarisation: f64,
}

fn significant_terms(content: &str) -> HashSet<String> {
    content
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 5)
        .map(str::to_string)
        .collect()
}

fn disagreement_cues() -> &'static [(DisagreementKind, &'static [&'static str])] {
    &[
        (DisagreementKind::Factual, &["the facts", "actually", "incorrect", "untrue"]),
        (DisagreementKind::Definitional, &["definition", "what we mean by", "define"]),
        (
            DisagreementKind::Methodological,
            &["methodology", "how it was measured", "sample", "approach is flawed"],
        ),
        (DisagreementKind::ValueBased, &["what matters most", "priorit", "value"]),
        (DisagreementKind::Interpretive, &["interpret", "reading of", "what this means"]),
        (DisagreementKind::Normative, &["should", "ought", "obligation", "wrong to"]),
        (DisagreementKind::Empirical, &["the data", "evidence shows", "measured", "observed"]),
    ]
}

/// Build the consensus report from the debater turns.
pub fn build_consensus(turns: &[Turn]) -> Result<ConsensusReport, String> {
    let mut by_role: HashMap<Role, HashSet<String>> = HashMap::new();
    for turn in turns.iter().filter(|t| !t.role.is_judge()) {
        by_role
            .entry(turn.role)
            .or_default()
            .extend(significant_terms(&turn.content));
    }
    if by_role.len() < 2 {
        return Err("fewer than two debaters spoke".to_string());
    }

    let mut roles: Vec<Role> = by_role.keys().copied().collect();
    roles.sort();

    // Common ground: terms every debater used.
    let mut shared: Option<HashSet<String>> = None;
    for terms in by_role.values() {
        shared = Some(match shared {
            None => terms.clone(),
            Some(acc) => acc.intersection(terms).cloned().collect(),
        });
    }
    let mut shared: Vec<String> = shared.unwrap_or_default().into_iter().collect();
    shared.sort();
    let common_ground: Vec<CommonGround> = shared
        .into_iter()
        .take(5)
        .map(|term| CommonGround {
            statement: format!("both sides engage the question of \"{term}\""),
            roles: roles.clone(),
        })
        .collect();

    // Disagreements: cue phrases anywhere in the debater turns.
    let full_text: String = turns
        .iter()
        .filter(|t| !t.role.is_judge())
        .map(|t| t.content.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    let mut disagreements: Vec<Disagreement> = disagreement_cues()
        .iter()
        .filter(|(_, cues)| cues.iter().any(|cue| full_text.contains(cue)))
        .map(|(kind, _)| Disagreement {
            kind: *kind,
            description: format!("{kind} dispute surfaced in the exchange"),
            resolution: kind.default_resolution(),
        })
        .collect();
    // Many simultaneous axes call for a blended resolution.
    if disagreements.len() >= 3 {
        for disagreement in disagreements.iter_mut().skip(2) {
            disagreement.resolution = ResolutionKind::Hybrid;
        }
    }

    // Polarisation: one minus mean pairwise Jaccard overlap.
    let mut overlaps = Vec::new();
    for i in 0..roles.len() {
        for j in (i + 1)..roles.len() {
            let a = &by_role[&roles[i]];
            let b = &by_role[&roles[j]];
            let union = a.union(b).count();
            if union > 0 {
                overlaps.push(a.intersection(b).count() as f64 / union as f64);
            }
        }
    }
    let mean_overlap = if overlaps.is_empty() {
        0.0
    } else {
        overlaps.iter().sum::<f64>() / overlaps.len() as f64
    };

    Ok(ConsensusReport {
        common_ground,
        disagreements,
        polarisation: (1.0 - mean_overlap).clamp(0.0, 1.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_support::turn_at;

    #[test]
    fn test_single_speaker_degrades() {
        let turns = vec![turn_at(0, Role::Debater(0), "alone on stage")];
        assert!(build_consensus(&turns).is_err());
    }

    #[test]
    fn test_common_ground_needs_all_debaters() {
        let turns = vec![
            turn_at(0, Role::Debater(0), "Latency matters for customer happiness."),
            turn_at(1, Role::Debater(1), "Latency is a distraction from quality."),
        ];
        let report = build_consensus(&turns).unwrap();
        assert!(report
            .common_ground
            .iter()
            .any(|g| g.statement.contains("latency")));
    }

    #[test]
    fn test_disagreement_typing_and_resolution() {
        let turns = vec![
            turn_at(0, Role::Debater(0), "The data clearly supports adoption."),
            turn_at(
                1,
                Role::Debater(1),
                "We should not adopt; the definition of success is contested.",
            ),
        ];
        let report = build_consensus(&turns).unwrap();
        let kinds: Vec<DisagreementKind> = report.disagreements.iter().map(|d| d.kind).collect();
        assert!(kinds.contains(&DisagreementKind::Empirical));
        assert!(kinds.contains(&DisagreementKind::Normative));
        assert!(kinds.contains(&DisagreementKind::Definitional));

        let definitional = report
            .disagreements
            .iter()
            .find(|d| d.kind == DisagreementKind::Definitional)
            .unwrap();
        assert_eq!(definitional.resolution, ResolutionKind::Synthesis);

        // Three axes at once blend the tail into a hybrid resolution.
        assert!(report
            .disagreements
            .iter()
            .any(|d| d.resolution == ResolutionKind::Hybrid));
    }

    #[test]
    fn test_polarisation_bounds() {
        let aligned = vec![
            turn_at(0, Role::Debater(0), "automation quality throughput savings"),
            turn_at(1, Role::Debater(1), "automation quality throughput savings"),
        ];
        let disjoint = vec![
            turn_at(0, Role::Debater(0), "automation throughput savings economics"),
            turn_at(1, Role::Debater(1), "empathy morale retention culture"),
        ];
        let low = build_consensus(&aligned).unwrap().polarisation;
        let high = build_consensus(&disjoint).unwrap().polarisation;
        assert!(low < high);
        assert!((0.0..=1.0).contains(&low));
        assert!((0.0..=1.0).contains(&high));
    }

    #[test]
    fn test_display_taxonomies() {
        assert_eq!(DisagreementKind::ValueBased.to_string(), "value_based");
        assert_eq!(ResolutionKind::Hybrid.to_string(), "hybrid");
    }
}
