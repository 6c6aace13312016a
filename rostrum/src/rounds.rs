//! Adaptive round management.
//!
//! After each middle-phase round the manager scores the exchange on four
//! sub-metrics and decides whether the debate continues, grows, shrinks, or
//! jumps straight to judgment. Time pressure wins over quality whenever the
//! two disagree.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::DebateConfig;
use crate::session::Round;

/// What to do after a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundAction {
    /// Proceed along the planned phase sequence.
    ContinueNormal,
    /// Add one round, capped at `max_rounds`.
    Extend,
    /// Skip remaining middle rounds; go to closing.
    Reduce,
    /// Skip to judgment directly.
    TerminateEarly,
}

impl std::fmt::Display for RoundAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ContinueNormal => write!(f, "continue_normal"),
            Self::Extend => write!(f, "extend"),
            Self::Reduce => write!(f, "reduce"),
            Self::TerminateEarly => write!(f, "terminate_early"),
        }
    }
}

/// The manager's post-round verdict with its inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundDecision {
    pub action: RoundAction,
    /// Combined score `0.4Q + 0.2E + 0.2N + 0.2(1−T)`.
    pub score: f64,
    pub quality: f64,
    pub engagement: f64,
    pub novelty: f64,
    pub time_pressure: f64,
    pub reason: String,
}

/// Score weights and action thresholds.
const QUALITY_WEIGHT: f64 = 0.4;
const ENGAGEMENT_WEIGHT: f64 = 0.2;
const NOVELTY_WEIGHT: f64 = 0.2;
const TIME_WEIGHT: f64 = 0.2;

const EXTEND_THRESHOLD: f64 = 0.75;
const REDUCE_THRESHOLD: f64 = 0.45;
const TIME_REDUCE_PRESSURE: f64 = 0.9;
const TIME_EXTEND_CEILING: f64 = 0.7;
const DEGENERATE_QUALITY: f64 = 0.4;
const DEGENERATE_NOVELTY: f64 = 0.1;

/// Post-round decision engine.
#[derive(Debug, Clone)]
pub struct AdaptiveRoundManager {
    min_rounds: u32,
    max_rounds: u32,
}

impl AdaptiveRoundManager {
    pub fn from_config(config: &DebateConfig) -> Self {
        Self {
            min_rounds: config.min_rounds,
            max_rounds: config.max_rounds,
        }
    }

    /// Evaluate a just-completed middle round.
    ///
    /// `previous_rounds` are all rounds before this one, oldest first;
    /// `planned_rounds` is the current middle-round plan.
    pub fn evaluate(
        &self,
        round: &Round,
        previous_rounds: &[Round],
        rounds_used: u32,
        planned_rounds: u32,
        elapsed: Duration,
        budget: Duration,
    ) -> RoundDecision {
        let quality = mean_strength(round);
        let engagement = engagement(round);
        let novelty = novelty(round, previous_rounds);
        let time_pressure = time_pressure(elapsed, budget);

        let score = (QUALITY_WEIGHT * quality
            + ENGAGEMENT_WEIGHT * engagement
            + NOVELTY_WEIGHT * novelty
            + TIME_WEIGHT * (1.0 - time_pressure))
            .clamp(0.0, 1.0);

        let decision = |action, reason: String| RoundDecision {
            action,
            score,
            quality,
            engagement,
            novelty,
            time_pressure,
            reason,
        };

        // Two consecutive degenerate rounds end the debate regardless of
        // the minimum-round floor.
        let degenerate_now = quality < DEGENERATE_QUALITY && novelty < DEGENERATE_NOVELTY;
        let degenerate_before = previous_rounds
            .iter()
            .rev()
            .find(|r| r.phase.is_middle())
            .and_then(|r| r.decision.as_ref())
            .map(|d| d.quality < DEGENERATE_QUALITY && d.novelty < DEGENERATE_NOVELTY)
            .unwrap_or(false);
        if degenerate_now && degenerate_before {
            return decision(
                RoundAction::TerminateEarly,
                format!("two degenerate rounds (quality {quality:.2}, novelty {novelty:.2})"),
            );
        }

        // Time wins over everything else.
        if time_pressure >= TIME_REDUCE_PRESSURE {
            return decision(
                RoundAction::Reduce,
                format!("time pressure {time_pressure:.2} exhausts the budget"),
            );
        }

        if rounds_used >= self.max_rounds {
            return decision(
                RoundAction::Reduce,
                format!("round cap {} reached", self.max_rounds),
            );
        }

        if score >= EXTEND_THRESHOLD && time_pressure < TIME_EXTEND_CEILING {
            if planned_rounds + 1 > self.max_rounds {
                // Clamped: the plan cannot grow past the cap.
                return decision(
                    RoundAction::ContinueNormal,
                    format!("extend clamped at max_rounds {}", self.max_rounds),
                );
            }
            return decision(
                RoundAction::Extend,
                format!("score {score:.2} justifies an extra round"),
            );
        }

        if score < REDUCE_THRESHOLD && rounds_used >= self.min_rounds {
            return decision(
                RoundAction::Reduce,
                format!("score {score:.2} below continuation threshold"),
            );
        }

        decision(RoundAction::ContinueNormal, format!("score {score:.2}"))
    }
}

fn mean_strength(round: &Round) -> f64 {
    if round.turns.is_empty() {
        return 0.0;
    }
    round.turns.iter().map(|t| t.analysis.strength).sum::<f64>() / round.turns.len() as f64
}

/// Fraction of expected turns produced, times interaction density.
fn engagement(round: &Round) -> f64 {
    if round.expected.is_empty() {
        return 0.0;
    }
    let completeness = round.turns.len() as f64 / round.expected.len() as f64;
    let referencing = round
        .turns
        .iter()
        .filter(|t| !t.analysis.structure.references.is_empty())
        .count() as f64;
    let density = if round.turns.is_empty() {
        0.0
    } else {
        0.5 + 0.5 * referencing / round.turns.len() as f64
    };
    (completeness * density).clamp(0.0, 1.0)
}

/// `1 − max cosine similarity` against every previous round, clipped.
fn novelty(round: &Round, previous_rounds: &[Round]) -> f64 {
    let current = round_text(round);
    let max_similarity = previous_rounds
        .iter()
        .map(|prev| cosine_similarity(&current, &round_text(prev)))
        .fold(0.0_f64, f64::max);
    (1.0 - max_similarity).clamp(0.0, 1.0)
}

fn time_pressure(elapsed: Duration, budget: Duration) -> f64 {
    if budget.is_zero() {
        return 1.0;
    }
    (elapsed.as_secs_f64() / budget.as_secs_f64()).clamp(0.0, 1.0)
}

fn round_text(round: &Round) -> String {
    round
        .turns
        .iter()
        .map(|t| t.content.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Bag-of-words cosine similarity over terms of three or more characters.
fn cosine_similarity(a: &str, b: &str) -> f64 {
    let count = |text: &str| {
        let mut counts = std::collections::HashMap::new();
        for word in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() >= 3)
        {
            *counts.entry(word.to_string()).or_insert(0u32) += 1;
        }
        counts
    };
    let left = count(a);
    let right = count(b);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    let dot: f64 = left
        .iter()
        .filter_map(|(word, &la)| right.get(word).map(|&ra| f64::from(la) * f64::from(ra)))
        .sum();
    let norm = |counts: &std::collections::HashMap<String, u32>| {
        counts
            .values()
            .map(|&c| f64::from(c) * f64::from(c))
            .sum::<f64>()
            .sqrt()
    };
    let denominator = norm(&left) * norm(&right);
    if denominator == 0.0 {
        0.0
    } else {
        dot / denominator
    }
}
