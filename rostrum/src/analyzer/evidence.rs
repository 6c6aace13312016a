//! Evidence detection and typing.
//!
//! Marker-based sentence scan: each sentence is matched against per-kind
//! cue patterns and scored on credibility, relevance, sufficiency, and
//! recency. Deterministic on its input.

use std::sync::OnceLock;

use chrono::{Datelike, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Closed set of evidence kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    Statistical,
    ExpertOpinion,
    CaseStudy,
    Analogical,
    Historical,
    Documentary,
    Logical,
    Other,
}

impl EvidenceKind {
    /// Baseline credibility for this kind of evidence.
    pub fn base_credibility(self) -> f64 {
        match self {
            Self::Statistical => 0.80,
            Self::Documentary => 0.75,
            Self::ExpertOpinion => 0.70,
            Self::Historical => 0.65,
            Self::CaseStudy => 0.60,
            Self::Logical => 0.60,
            Self::Analogical => 0.50,
            Self::Other => 0.40,
        }
    }
}

impl std::fmt::Display for EvidenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Statistical => write!(f, "statistical"),
            Self::ExpertOpinion => write!(f, "expert_opinion"),
            Self::CaseStudy => write!(f, "case_study"),
            Self::Analogical => write!(f, "analogical"),
            Self::Historical => write!(f, "historical"),
            Self::Documentary => write!(f, "documentary"),
            Self::Logical => write!(f, "logical"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// One detected evidence item with its per-dimension scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub kind: EvidenceKind,
    /// The sentence the evidence was found in.
    pub excerpt: String,
    pub credibility: f64,
    pub relevance: f64,
    pub sufficiency: f64,
    pub recency: f64,
}

impl EvidenceItem {
    /// Mean of the four dimension scores.
    pub fn quality(&self) -> f64 {
        (self.credibility + self.relevance + self.sufficiency + self.recency) / 4.0
    }
}

fn cue_patterns() -> &'static [(EvidenceKind, Regex)] {
    static PATTERNS: OnceLock<Vec<(EvidenceKind, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            (
                EvidenceKind::Statistical,
                Regex::new(r"(?i)\d+(\.\d+)?\s*(%|percent)|survey|sample size|statistic")
                    .expect("static pattern"),
            ),
            (
                EvidenceKind::ExpertOpinion,
                Regex::new(r"(?i)according to|experts?\b|researchers|professor|dr\.")
                    .expect("static pattern"),
            ),
            (
                EvidenceKind::CaseStudy,
                Regex::new(r"(?i)case study|for (instance|example)|in one case|pilot program")
                    .expect("static pattern"),
            ),
            (
                EvidenceKind::Historical,
                Regex::new(r"(?i)\b(1[89]|20)\d{2}\b|historically|in the past|precedent")
                    .expect("static pattern"),
            ),
            (
                EvidenceKind::Documentary,
                Regex::new(r"(?i)report(ed|s)?\b|records show|published|documented|filing")
                    .expect("static pattern"),
            ),
            (
                EvidenceKind::Analogical,
                Regex::new(r"(?i)analogous|just as\b|similar to|much like").expect("static pattern"),
            ),
            (
                EvidenceKind::Logical,
                Regex::new(r"(?i)it follows|therefore|implies|by definition|necessarily")
                    .expect("static pattern"),
            ),
        ]
    })
}

fn split_sentences(content: &str) -> impl Iterator<Item = &str> {
    content
        .split_terminator(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn recency_score(sentence: &str) -> f64 {
    static YEAR: OnceLock<Regex> = OnceLock::new();
    let year_re = YEAR.get_or_init(|| Regex::new(r"\b(1[89]|20)\d{2}\b").expect("static pattern"));
    let current_year = Utc::now().year();
    let newest = year_re
        .find_iter(sentence)
        .filter_map(|m| m.as_str().parse::<i32>().ok())
        .max();
    match newest {
        // Dated evidence decays over roughly two decades.
        Some(year) => {
            let age = (current_year - year).max(0) as f64;
            (1.0 - age / 20.0).clamp(0.2, 1.0)
        }
        // Undated evidence is treated as current-but-unverified.
        None => 0.6,
    }
}

/// Scan `content` for typed evidence, one item per matched sentence/kind.
///
/// `topic_terms` feeds the relevance dimension: a sentence sharing more of
/// the topic's significant terms scores higher.
pub fn detect_evidence(content: &str, topic_terms: &[String]) -> Vec<EvidenceItem> {
    let mut items = Vec::new();
    let sentences: Vec<&str> = split_sentences(content).collect();

    for sentence in &sentences {
        let lower = sentence.to_lowercase();
        for (kind, pattern) in cue_patterns() {
            if !pattern.is_match(sentence) {
                continue;
            }
            let shared = topic_terms
                .iter()
                .filter(|term| lower.contains(term.as_str()))
                .count();
            let relevance = if topic_terms.is_empty() {
                0.6
            } else {
                (0.4 + 0.2 * shared as f64).clamp(0.0, 1.0)
            };
            items.push(EvidenceItem {
                kind: *kind,
                excerpt: (*sentence).to_string(),
                credibility: kind.base_credibility(),
                relevance,
                sufficiency: 0.0, // filled once the full count is known
                recency: recency_score(sentence),
            });
        }
    }

    // Sufficiency grows with corroboration of the same kind.
    let counts: std::collections::HashMap<EvidenceKind, usize> =
        items.iter().fold(Default::default(), |mut acc, item| {
            *acc.entry(item.kind).or_insert(0) += 1;
            acc
        });
    for item in &mut items {
        let n = counts.get(&item.kind).copied().unwrap_or(1) as f64;
        item.sufficiency = (0.4 + 0.2 * n).clamp(0.0, 1.0);
    }

    items
}
