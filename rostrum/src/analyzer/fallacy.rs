//! Fallacy detection over the closed eight-member taxonomy.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Closed set of detected fallacies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fallacy {
    AdHominem,
    StrawMan,
    FalseDichotomy,
    AppealToAuthority,
    AppealToEmotion,
    SlipperySlope,
    HastyGeneralisation,
    CircularReasoning,
}

impl Fallacy {
    /// Default severity when detected by pattern alone.
    pub fn default_severity(self) -> Severity {
        match self {
            Self::AdHominem => Severity::High,
            Self::StrawMan => Severity::Medium,
            Self::FalseDichotomy => Severity::Medium,
            Self::AppealToAuthority => Severity::Low,
            Self::AppealToEmotion => Severity::Medium,
            Self::SlipperySlope => Severity::Medium,
            Self::HastyGeneralisation => Severity::Medium,
            Self::CircularReasoning => Severity::High,
        }
    }

    /// Suggested correction offered alongside a finding.
    pub fn suggestion(self) -> &'static str {
        match self {
            Self::AdHominem => "address the argument rather than the arguer",
            Self::StrawMan => "restate the opposing position in its strongest form",
            Self::FalseDichotomy => "acknowledge options beyond the two presented",
            Self::AppealToAuthority => "cite the evidence behind the authority's view",
            Self::AppealToEmotion => "support the emotional claim with substantive grounds",
            Self::SlipperySlope => "justify each step of the claimed chain of consequences",
            Self::HastyGeneralisation => "qualify the claim or widen the sample",
            Self::CircularReasoning => "supply independent support for the conclusion",
        }
    }
}

impl std::fmt::Display for Fallacy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AdHominem => write!(f, "ad_hominem"),
            Self::StrawMan => write!(f, "straw_man"),
            Self::FalseDichotomy => write!(f, "false_dichotomy"),
            Self::AppealToAuthority => write!(f, "appeal_to_authority"),
            Self::AppealToEmotion => write!(f, "appeal_to_emotion"),
            Self::SlipperySlope => write!(f, "slippery_slope"),
            Self::HastyGeneralisation => write!(f, "hasty_generalisation"),
            Self::CircularReasoning => write!(f, "circular_reasoning"),
        }
    }
}

/// Severity of a detected fallacy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Penalty applied to the logic component per finding.
    pub fn logic_penalty(self) -> f64 {
        match self {
            Self::Low => 0.10,
            Self::Medium => 0.20,
            Self::High => 0.30,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// One detected fallacy with its location and correction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallacyFinding {
    pub fallacy: Fallacy,
    pub severity: Severity,
    pub excerpt: String,
    pub suggestion: String,
}

fn fallacy_patterns() -> &'static [(Fallacy, Regex)] {
    static PATTERNS: OnceLock<Vec<(Fallacy, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            (
                Fallacy::AdHominem,
                Regex::new(r"(?i)my opponent is (a |an )?(liar|fool|fraud|hypocrite|incompetent|dishonest|ignorant)")
                    .expect("static pattern"),
            ),
            (
                Fallacy::StrawMan,
                Regex::new(r"(?i)so (you|they)('re| are) (really )?saying|apparently (you|they) want")
                    .expect("static pattern"),
            ),
            (
                Fallacy::FalseDichotomy,
                Regex::new(r"(?i)either .{1,60} or\b|only two (choices|options)|no (middle ground|alternative)")
                    .expect("static pattern"),
            ),
            (
                Fallacy::AppealToAuthority,
                Regex::new(r"(?i)(must be|is) (true|right|correct) because .{0,40}(expert|authority|famous|renowned)")
                    .expect("static pattern"),
            ),
            (
                Fallacy::AppealToEmotion,
                Regex::new(r"(?i)think of the|terrifying|heartbreaking|outrageous|disgusting|imagine the suffering")
                    .expect("static pattern"),
            ),
            (
                Fallacy::SlipperySlope,
                Regex::new(r"(?i)(will )?inevitably lead to|before (you|we) know it|next thing|slippery slope|opens the floodgates")
                    .expect("static pattern"),
            ),
            (
                Fallacy::HastyGeneralisation,
                Regex::new(r"(?i)everyone knows|\ball .{1,30} are\b|nobody (ever )?|always fails|never works")
                    .expect("static pattern"),
            ),
            (
                Fallacy::CircularReasoning,
                Regex::new(r"(?i)true because it('s| is) true|proves itself|because that's what it is")
                    .expect("static pattern"),
            ),
        ]
    })
}

/// Detect fallacies in `content`, at most one finding per fallacy kind.
pub fn detect_fallacies(content: &str) -> Vec<FallacyFinding> {
    let mut findings = Vec::new();
    for (fallacy, pattern) in fallacy_patterns() {
        if let Some(found) = pattern.find(content) {
            let start = found.start().saturating_sub(20);
            let end = (found.end() + 40).min(content.len());
            // Snap to char boundaries for the excerpt window.
            let start = (0..=start).rev().find(|&i| content.is_char_boundary(i)).unwrap_or(0);
            let end = (end..=content.len())
                .find(|&i| content.is_char_boundary(i))
                .unwrap_or(content.len());
            findings.push(FallacyFinding {
                fallacy: *fallacy,
                severity: fallacy.default_severity(),
                excerpt: content[start..end].to_string(),
                suggestion: fallacy.suggestion().to_string(),
            });
        }
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ad_hominem() {
        let findings = detect_fallacies("My opponent is a liar and cannot be trusted.");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].fallacy, Fallacy::AdHominem);
        assert_eq!(findings[0].severity, Severity::High);
    }

    #[test]
    fn test_false_dichotomy() {
        let findings = detect_fallacies("Either we adopt this now or the company dies.");
        assert!(findings.iter().any(|f| f.fallacy == Fallacy::FalseDichotomy));
    }

    #[test]
    fn test_slippery_slope() {
        let findings =
            detect_fallacies("Allowing this will inevitably lead to total automation of every job.");
        assert!(findings.iter().any(|f| f.fallacy == Fallacy::SlipperySlope));
    }

    #[test]
    fn test_clean_text_yields_nothing() {
        let findings = detect_fallacies(
            "The trial data shows a measured 12% improvement with stable variance.",
        );
        assert!(findings.is_empty());
    }

    #[test]
    fn test_one_finding_per_kind() {
        let findings = detect_fallacies(
            "Either we act or we fail. Either we win or we lose. Either now or never.",
        );
        assert_eq!(
            findings
                .iter()
                .filter(|f| f.fallacy == Fallacy::FalseDichotomy)
                .count(),
            1
        );
    }

    #[test]
    fn test_finding_carries_suggestion() {
        let findings = detect_fallacies("Everyone knows this approach never works.");
        let finding = findings
            .iter()
            .find(|f| f.fallacy == Fallacy::HastyGeneralisation)
            .unwrap();
        assert!(!finding.suggestion.is_empty());
        assert!(!finding.excerpt.is_empty());
    }

    #[test]
    fn test_severity_penalties_ordered() {
        assert!(Severity::High.logic_penalty() > Severity::Medium.logic_penalty());
        assert!(Severity::Medium.logic_penalty() > Severity::Low.logic_penalty());
    }

    #[test]
    fn test_display() {
        assert_eq!(Fallacy::StrawMan.to_string(), "straw_man");
        assert_eq!(Fallacy::CircularReasoning.to_string(), "circular_reasoning");
        assert_eq!(Severity::Medium.to_string(), "medium");
    }
}
