//! Argument analysis — structure, evidence, fallacies, composite strength.
//!
//! The heuristic pass is deterministic on the turn's content and the
//! session context. An optional model-assisted pass refines the component
//! scores; when that consultation fails the analyzer returns a *degraded*
//! record (confidence 0, unknown reasoning path) rather than blocking the
//! debate.

pub mod evidence;
pub mod fallacy;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::TurnPrompt;
use crate::error::ApiError;
use crate::resilience::ResilientClient;
use crate::session::phase::Role;
use crate::session::Turn;

pub use evidence::{detect_evidence, EvidenceItem, EvidenceKind};
pub use fallacy::{detect_fallacies, Fallacy, FallacyFinding, Severity};

/// Component weights for the composite strength score. Must sum to 1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StrengthWeights {
    pub structure: f64,
    pub evidence: f64,
    pub logic: f64,
}

impl Default for StrengthWeights {
    fn default() -> Self {
        Self {
            structure: 0.30,
            evidence: 0.40,
            logic: 0.30,
        }
    }
}

impl StrengthWeights {
    pub fn validate(&self) -> Result<(), ApiError> {
        let sum = self.structure + self.evidence + self.logic;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(ApiError::InvalidConfig(format!(
                "strength weights sum to {sum}, expected 1.0"
            )));
        }
        if self.structure < 0.0 || self.evidence < 0.0 || self.logic < 0.0 {
            return Err(ApiError::InvalidConfig(
                "strength weights must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

/// How the argument gets from premises to conclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningPath {
    Deductive,
    Inductive,
    Abductive,
    Analogical,
    Unknown,
}

impl std::fmt::Display for ReasoningPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deductive => write!(f, "deductive"),
            Self::Inductive => write!(f, "inductive"),
            Self::Abductive => write!(f, "abductive"),
            Self::Analogical => write!(f, "analogical"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Parsed argument skeleton.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgumentStructure {
    pub premises: Vec<String>,
    pub conclusion: Option<String>,
    pub path: ReasoningPath,
    /// Indices of earlier turns this turn refers to or rebuts.
    pub references: Vec<usize>,
}

/// Full analysis of one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgumentRecord {
    pub structure: ArgumentStructure,
    pub evidence: Vec<EvidenceItem>,
    pub fallacies: Vec<FallacyFinding>,
    pub structure_score: f64,
    pub evidence_score: f64,
    pub logic_score: f64,
    /// Composite in [0, 1]: weights · (structure, evidence, logic).
    pub strength: f64,
    /// Analyzer confidence in this record; 0 when degraded.
    pub confidence: f64,
    /// Set when the model-assisted pass failed.
    pub degraded: bool,
}

impl ArgumentRecord {
    /// Convert this record into its degraded form: scores are kept but the
    /// reasoning path is unknown and confidence drops to zero.
    pub fn into_degraded(mut self) -> Self {
        self.structure.path = ReasoningPath::Unknown;
        self.confidence = 0.0;
        self.degraded = true;
        self
    }
}

/// Significant lowercase terms of the topic, for relevance scoring.
pub fn topic_terms(topic: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    topic
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 4)
        .filter(|w| seen.insert(w.to_string()))
        .map(str::to_string)
        .collect()
}

/// Model-assisted scoring pass configuration.
pub struct AnalyzerAssist {
    pub client: Arc<ResilientClient>,
    /// Logical model identity for the analyzer role. Kept distinct from
    /// debater ids so breaker accounting never cross-trips a debater.
    pub model: String,
    pub deadline: Duration,
}

/// Component scores as returned by the assist model.
#[derive(Debug, Deserialize)]
struct AssistScores {
    structure: f64,
    evidence: f64,
    logic: f64,
    #[serde(default)]
    path: Option<String>,
}

/// The argument analyzer.
pub struct ArgumentAnalyzer {
    weights: StrengthWeights,
    assist: Option<AnalyzerAssist>,
}

impl ArgumentAnalyzer {
    pub fn new(weights: StrengthWeights) -> Result<Self, ApiError> {
        weights.validate()?;
        Ok(Self {
            weights,
            assist: None,
        })
    }

    /// Enable the model-assisted pass.
    pub fn with_assist(mut self, assist: AnalyzerAssist) -> Self {
        self.assist = Some(assist);
        self
    }

    /// Deterministic heuristic analysis of one turn.
    pub fn heuristic(
        &self,
        content: &str,
        topic: &str,
        speaker: Role,
        prior: &[Turn],
    ) -> ArgumentRecord {
        let terms = topic_terms(topic);
        let structure = parse_structure(content, speaker, prior);
        let evidence = detect_evidence(content, &terms);
        let fallacies = detect_fallacies(content);

        let structure_score = score_structure(&structure);
        let evidence_score = score_evidence(&evidence);
        let logic_score = score_logic(&structure, &fallacies);

        let strength = (self.weights.structure * structure_score
            + self.weights.evidence * evidence_score
            + self.weights.logic * logic_score)
            .clamp(0.0, 1.0);

        ArgumentRecord {
            structure,
            evidence,
            fallacies,
            structure_score,
            evidence_score,
            logic_score,
            strength,
            confidence: 0.6,
            degraded: false,
        }
    }

    /// Analyze one turn, consulting the assist model when configured.
    pub async fn analyze(
        &self,
        session_id: &str,
        content: &str,
        topic: &str,
        speaker: Role,
        prior: &[Turn],
        cancel: &CancellationToken,
    ) -> ArgumentRecord {
        let record = self.heuristic(content, topic, speaker, prior);
        let Some(assist) = &self.assist else {
            return record;
        };

        let prompt = TurnPrompt::new(
            "You score debate arguments. Reply with a single JSON object: \
             {\"structure\": 0..1, \"evidence\": 0..1, \"logic\": 0..1, \
             \"path\": \"deductive|inductive|abductive|analogical\"}",
            format!("Topic: {topic}\n\nArgument:\n{content}"),
        );

        let outcome = assist
            .client
            .call(session_id, &assist.model, &prompt, 256, assist.deadline, cancel)
            .await;

        match outcome.ok().and_then(|c| parse_assist_scores(&c.text)) {
            Some(scores) => self.blend(record, scores),
            None => {
                debug!(session_id, "analyzer assist failed, returning degraded record");
                record.into_degraded()
            }
        }
    }

    /// Average the heuristic and assist component scores.
    fn blend(&self, mut record: ArgumentRecord, scores: AssistScores) -> ArgumentRecord {
        record.structure_score =
            ((record.structure_score + scores.structure.clamp(0.0, 1.0)) / 2.0).clamp(0.0, 1.0);
        record.evidence_score = if record.evidence.is_empty() {
            // Invariant: empty evidence list pins the component to zero.
            0.0
        } else {
            ((record.evidence_score + scores.evidence.clamp(0.0, 1.0)) / 2.0).clamp(0.0, 1.0)
        };
        record.logic_score =
            ((record.logic_score + scores.logic.clamp(0.0, 1.0)) / 2.0).clamp(0.0, 1.0);

        if record.structure.path == ReasoningPath::Unknown {
            record.structure.path = match scores.path.as_deref() {
                Some("deductive") => ReasoningPath::Deductive,
                Some("inductive") => ReasoningPath::Inductive,
                Some("abductive") => ReasoningPath::Abductive,
                Some("analogical") => ReasoningPath::Analogical,
                _ => ReasoningPath::Unknown,
            };
        }

        record.strength = (self.weights.structure * record.structure_score
            + self.weights.evidence * record.evidence_score
            + self.weights.logic * record.logic_score)
            .clamp(0.0, 1.0);
        record.confidence = 0.9;
        record
    }
}

/// Extract the first JSON object from assist output.
fn parse_assist_scores(text: &str) -> Option<AssistScores> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

fn split_sentences(content: &str) -> Vec<&str> {
    content
        .split_terminator(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_structure(content: &str, speaker: Role, prior: &[Turn]) -> ArgumentStructure {
    let sentences = split_sentences(content);
    let lower = content.to_lowercase();

    let premise_cues = ["because", "since", "given that", "the evidence shows", "as shown"];
    let conclusion_cues = ["therefore", "thus", "in conclusion", "so we should", "it follows"];

    let premises: Vec<String> = sentences
        .iter()
        .filter(|s| {
            let l = s.to_lowercase();
            premise_cues.iter().any(|cue| l.contains(cue))
        })
        .map(|s| s.to_string())
        .collect();

    let conclusion = sentences
        .iter()
        .find(|s| {
            let l = s.to_lowercase();
            conclusion_cues.iter().any(|cue| l.contains(cue))
        })
        .or(sentences.last())
        .map(|s| s.to_string());

    let path = if ["necessarily", "must follow", "it follows", "by definition"]
        .iter()
        .any(|cue| lower.contains(cue))
    {
        ReasoningPath::Deductive
    } else if ["analogous", "just as", "much like", "similar to"]
        .iter()
        .any(|cue| lower.contains(cue))
    {
        ReasoningPath::Analogical
    } else if ["best explanation", "most plausible", "explains why"]
        .iter()
        .any(|cue| lower.contains(cue))
    {
        ReasoningPath::Abductive
    } else if ["likely", "probably", "suggests", "tends to", "in most cases"]
        .iter()
        .any(|cue| lower.contains(cue))
    {
        ReasoningPath::Inductive
    } else {
        ReasoningPath::Unknown
    };

    ArgumentStructure {
        premises,
        conclusion,
        path,
        references: detect_references(&lower, speaker, prior),
    }
}

/// Indices of prior turns this content refers to.
///
/// Explicit role mentions bind to that role's most recent prior turn;
/// opponent/previous-argument phrasing binds to the most recent prior turn
/// by a different debater.
fn detect_references(lower: &str, speaker: Role, prior: &[Turn]) -> Vec<usize> {
    let mut refs = BTreeSet::new();

    let mut seen_roles = BTreeSet::new();
    for turn in prior.iter().rev() {
        if !seen_roles.insert(turn.role) {
            continue;
        }
        if lower.contains(&turn.role.to_string()) {
            refs.insert(turn.index);
        }
    }

    let opponent_cues = ["my opponent", "the previous argument", "as argued", "they claim"];
    if opponent_cues.iter().any(|cue| lower.contains(cue)) {
        if let Some(turn) = prior
            .iter()
            .rev()
            .find(|t| t.role != speaker && !t.role.is_judge())
        {
            refs.insert(turn.index);
        }
    }

    refs.into_iter().collect()
}

fn score_structure(structure: &ArgumentStructure) -> f64 {
    let mut score: f64 = 0.0;
    if !structure.premises.is_empty() {
        score += 0.3 + 0.1 * (structure.premises.len().min(3) as f64 - 1.0) / 2.0;
    }
    if structure.conclusion.is_some() {
        score += 0.3;
    }
    if structure.path != ReasoningPath::Unknown {
        score += 0.2;
    }
    if !structure.references.is_empty() {
        score += 0.1;
    }
    score.clamp(0.0, 1.0)
}

fn score_evidence(evidence: &[EvidenceItem]) -> f64 {
    if evidence.is_empty() {
        return 0.0;
    }
    let mean_quality: f64 =
        evidence.iter().map(EvidenceItem::quality).sum::<f64>() / evidence.len() as f64;
    let variety = evidence
        .iter()
        .map(|e| e.kind)
        .collect::<BTreeSet<_>>()
        .len() as f64;
    (mean_quality * (0.7 + 0.1 * variety.min(3.0))).clamp(0.0, 1.0)
}

fn score_logic(structure: &ArgumentStructure, fallacies: &[FallacyFinding]) -> f64 {
    let base = match structure.path {
        ReasoningPath::Deductive => 0.9,
        ReasoningPath::Inductive | ReasoningPath::Abductive => 0.8,
        ReasoningPath::Analogical => 0.7,
        ReasoningPath::Unknown => 0.5,
    };
    let penalty: f64 = fallacies.iter().map(|f| f.severity.logic_penalty()).sum();
    (base - penalty).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_support::turn_at;

    fn analyzer() -> ArgumentAnalyzer {
        ArgumentAnalyzer::new(StrengthWeights::default()).unwrap()
    }

    const ARGUED: &str = "Because support costs fell 30% in the 2023 pilot, \
                          automation clearly pays for itself. Therefore we \
                          should adopt it across every queue.";

    #[test]
    fn test_weights_must_sum_to_one() {
        let bad = StrengthWeights {
            structure: 0.5,
            evidence: 0.5,
            logic: 0.5,
        };
        assert!(bad.validate().is_err());
        assert!(StrengthWeights::default().validate().is_ok());
    }

    #[test]
    fn test_strength_in_unit_range() {
        let record = analyzer().heuristic(ARGUED, "adopt AI support", Role::Debater(0), &[]);
        assert!((0.0..=1.0).contains(&record.strength));
        assert!(record.strength > 0.0);
        assert!(!record.degraded);
    }

    #[test]
    fn test_empty_evidence_zeroes_component() {
        let record = analyzer().heuristic(
            "I just feel this is wrong and we should stop",
            "topic",
            Role::Debater(0),
            &[],
        );
        assert!(record.evidence.is_empty());
        assert_eq!(record.evidence_score, 0.0);
    }

    #[test]
    fn test_structure_extraction() {
        let record = analyzer().heuristic(ARGUED, "automation", Role::Debater(0), &[]);
        assert!(!record.structure.premises.is_empty());
        assert!(record.structure.conclusion.is_some());
    }

    #[test]
    fn test_fallacies_lower_logic_score() {
        let clean = analyzer().heuristic(
            "Since the data suggests gains, this likely holds broadly. Therefore we proceed.",
            "topic",
            Role::Debater(0),
            &[],
        );
        let dirty = analyzer().heuristic(
            "Since the data suggests gains, this likely holds. My opponent is a liar. \
             Therefore we proceed.",
            "topic",
            Role::Debater(0),
            &[],
        );
        assert!(dirty.logic_score < clean.logic_score);
    }

    #[test]
    fn test_reference_to_named_role() {
        let prior = vec![
            turn_at(0, Role::Debater(0), "Costs are the core issue here."),
            turn_at(1, Role::Debater(1), "Quality matters more than cost."),
        ];
        let record = analyzer().heuristic(
            "Unlike debater_a suggests, quality cannot be ignored.",
            "topic",
            Role::Debater(1),
            &prior,
        );
        assert_eq!(record.structure.references, vec![0]);
    }

    #[test]
    fn test_opponent_phrase_references_latest_other_turn() {
        let prior = vec![
            turn_at(0, Role::Debater(0), "Costs dominate."),
            turn_at(1, Role::Debater(1), "Quality dominates."),
        ];
        let record = analyzer().heuristic(
            "My opponent overlooks the training burden entirely.",
            "topic",
            Role::Debater(0),
            &prior,
        );
        assert_eq!(record.structure.references, vec![1]);
    }

    #[test]
    fn test_degraded_record_shape() {
        let record = analyzer()
            .heuristic(ARGUED, "topic", Role::Debater(0), &[])
            .into_degraded();
        assert!(record.degraded);
        assert_eq!(record.confidence, 0.0);
        assert_eq!(record.structure.path, ReasoningPath::Unknown);
        assert!((0.0..=1.0).contains(&record.strength));
    }

    #[test]
    fn test_assist_scores_parsing() {
        let parsed = parse_assist_scores(
            "Here is my rating: {\"structure\": 0.8, \"evidence\": 0.6, \"logic\": 0.7, \
             \"path\": \"deductive\"} as requested.",
        )
        .unwrap();
        assert!((parsed.structure - 0.8).abs() < 1e-9);
        assert_eq!(parsed.path.as_deref(), Some("deductive"));

        assert!(parse_assist_scores("no json here").is_none());
        assert!(parse_assist_scores("{\"structure\": \"high\"}").is_none());
    }

    #[test]
    fn test_topic_terms() {
        let terms = topic_terms("Adopt AI customer support");
        assert!(terms.contains(&"customer".to_string()));
        assert!(terms.contains(&"support".to_string()));
        // Short words are dropped.
        assert!(!terms.iter().any(|t| t == "ai"));
    }
}
