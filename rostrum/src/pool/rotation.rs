//! Rotation strategies and the decision engine.
//!
//! The engine only *proposes* rotations; the orchestrator applies them at
//! phase boundaries and records them in the session history. The emergency
//! failover path is the one exception and is labelled as such.

use serde::{Deserialize, Serialize};

use super::ModelPool;
use crate::resilience::BreakerTable;
use crate::session::phase::Role;

/// How models rotate across a session's roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationStrategy {
    /// Never rotate; only emergency failover applies.
    Fixed,
    /// Rotate among tier peers at fixed round boundaries.
    RoundRobin,
    /// Rotate when the incumbent's composite score trails the best
    /// candidate by a margin over enough observations.
    PerformanceBased,
    /// Performance-based plus per-role argument-strength trend.
    Adaptive,
    /// Rotate to equalise cumulative token spend.
    Balanced,
}

impl std::fmt::Display for RotationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fixed => write!(f, "fixed"),
            Self::RoundRobin => write!(f, "round_robin"),
            Self::PerformanceBased => write!(f, "performance_based"),
            Self::Adaptive => write!(f, "adaptive"),
            Self::Balanced => write!(f, "balanced"),
        }
    }
}

impl std::str::FromStr for RotationStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fixed" => Ok(Self::Fixed),
            "round_robin" => Ok(Self::RoundRobin),
            "performance_based" => Ok(Self::PerformanceBased),
            "adaptive" => Ok(Self::Adaptive),
            "balanced" => Ok(Self::Balanced),
            other => Err(format!("unknown rotation strategy: {other}")),
        }
    }
}

/// Why a rotation was proposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationReason {
    ScheduledRoundRobin,
    PerformanceLag,
    QualityDecline,
    SpendImbalance,
    /// Emergency swap after the incumbent's circuit opened.
    Failover,
}

impl std::fmt::Display for RotationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ScheduledRoundRobin => write!(f, "scheduled_round_robin"),
            Self::PerformanceLag => write!(f, "performance_lag"),
            Self::QualityDecline => write!(f, "quality_decline"),
            Self::SpendImbalance => write!(f, "spend_imbalance"),
            Self::Failover => write!(f, "failover"),
        }
    }
}

/// A proposed (or applied) rotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationDecision {
    pub role: Role,
    pub old_model: String,
    pub new_model: String,
    pub reason: RotationReason,
    pub confidence: f64,
    pub expected_improvement: f64,
}

/// Round boundaries between scheduled round-robin rotations.
const ROUND_ROBIN_PERIOD: u32 = 2;

/// Relative spend overshoot that triggers a balanced rotation.
const SPEND_IMBALANCE_FACTOR: f64 = 1.25;

/// The rotation decision engine.
#[derive(Debug, Clone)]
pub struct RotationEngine {
    pub strategy: RotationStrategy,
    /// Observations of the incumbent required before any rotation.
    pub min_calls: u32,
    /// Composite-score margin for performance-based rotation.
    pub performance_margin: f64,
}

impl RotationEngine {
    pub fn new(strategy: RotationStrategy, min_calls: u32) -> Self {
        Self {
            strategy,
            min_calls,
            performance_margin: 0.10,
        }
    }

    /// Evaluate whether `role`'s incumbent should rotate.
    ///
    /// `strength_trend` is the role's per-round mean argument strength,
    /// oldest first.
    pub fn evaluate(
        &self,
        role: Role,
        incumbent: &str,
        pool: &ModelPool,
        breakers: &BreakerTable,
        rounds_completed: u32,
        strength_trend: &[f64],
    ) -> Option<RotationDecision> {
        if self.strategy == RotationStrategy::Fixed {
            return None;
        }
        let stats = pool.stats_for(incumbent);
        if stats.calls < u64::from(self.min_calls) {
            return None;
        }

        match self.strategy {
            RotationStrategy::Fixed => None,
            RotationStrategy::RoundRobin => {
                if rounds_completed == 0 || rounds_completed % ROUND_ROBIN_PERIOD != 0 {
                    return None;
                }
                let next = next_tier_peer(pool, incumbent)?;
                Some(RotationDecision {
                    role,
                    old_model: incumbent.to_string(),
                    new_model: next,
                    reason: RotationReason::ScheduledRoundRobin,
                    confidence: 0.5,
                    expected_improvement: 0.0,
                })
            }
            RotationStrategy::PerformanceBased => {
                self.performance_decision(role, incumbent, pool, breakers)
            }
            RotationStrategy::Adaptive => {
                if let Some(decision) = self.performance_decision(role, incumbent, pool, breakers) {
                    return Some(decision);
                }
                if !declining(strength_trend, 2) {
                    return None;
                }
                let new_model = pool.healthy_replacement(incumbent, breakers)?;
                let gap = pool.stats_for(&new_model).composite_score()
                    - pool.stats_for(incumbent).composite_score();
                Some(RotationDecision {
                    role,
                    old_model: incumbent.to_string(),
                    new_model,
                    reason: RotationReason::QualityDecline,
                    confidence: 0.65,
                    expected_improvement: gap.max(0.0),
                })
            }
            RotationStrategy::Balanced => {
                let peers = tier_peer_ids(pool, incumbent);
                let my_spend = pool.stats_for(incumbent).tokens_spent;
                let (leanest, least) = peers
                    .iter()
                    .map(|id| (id, pool.stats_for(id).tokens_spent))
                    .min_by_key(|(_, spend)| *spend)?;
                if (my_spend as f64) <= (least as f64) * SPEND_IMBALANCE_FACTOR || my_spend == 0 {
                    return None;
                }
                Some(RotationDecision {
                    role,
                    old_model: incumbent.to_string(),
                    new_model: leanest.clone(),
                    reason: RotationReason::SpendImbalance,
                    confidence: 0.55,
                    expected_improvement: 0.0,
                })
            }
        }
    }

    /// Emergency failover for a role whose incumbent circuit is open.
    pub fn emergency_replacement(
        &self,
        role: Role,
        incumbent: &str,
        pool: &ModelPool,
        breakers: &BreakerTable,
    ) -> Option<RotationDecision> {
        let new_model = pool.healthy_replacement(incumbent, breakers)?;
        Some(RotationDecision {
            role,
            old_model: incumbent.to_string(),
            new_model,
            reason: RotationReason::Failover,
            confidence: 0.9,
            expected_improvement: 0.0,
        })
    }

    fn performance_decision(
        &self,
        role: Role,
        incumbent: &str,
        pool: &ModelPool,
        breakers: &BreakerTable,
    ) -> Option<RotationDecision> {
        let incumbent_score = pool.stats_for(incumbent).composite_score();
        let best = pool.healthy_replacement(incumbent, breakers)?;
        let best_score = pool.stats_for(&best).composite_score();
        let gap = best_score - incumbent_score;
        if gap < self.performance_margin {
            return None;
        }
        Some(RotationDecision {
            role,
            old_model: incumbent.to_string(),
            new_model: best,
            reason: RotationReason::PerformanceLag,
            confidence: (0.6 + gap).min(0.95),
            expected_improvement: gap,
        })
    }
}

/// Whether the trend ends with `deltas` consecutive declines.
fn declining(trend: &[f64], deltas: usize) -> bool {
    if trend.len() < deltas + 1 {
        return false;
    }
    trend
        .windows(2)
        .rev()
        .take(deltas)
        .all(|w| w[1] < w[0])
}

fn tier_peer_ids(pool: &ModelPool, incumbent: &str) -> Vec<String> {
    let Some(tier) = pool.spec(incumbent).map(|s| s.tier) else {
        return Vec::new();
    };
    pool.tier_peers(tier)
        .into_iter()
        .filter(|s| s.id != incumbent)
        .map(|s| s.id.clone())
        .collect()
}

/// The next tier peer after `incumbent` in declaration order, cyclic.
fn next_tier_peer(pool: &ModelPool, incumbent: &str) -> Option<String> {
    let tier = pool.spec(incumbent)?.tier;
    let peers = pool.tier_peers(tier);
    if peers.len() < 2 {
        return None;
    }
    let position = peers.iter().position(|s| s.id == incumbent)?;
    Some(peers[(position + 1) % peers.len()].id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{CostTier, ModelSpec};
    use crate::resilience::{BreakerConfig, BreakerTable};

    fn pool() -> ModelPool {
        ModelPool::new(vec![
            ModelSpec::new("alpha", CostTier::Standard),
            ModelSpec::new("bravo", CostTier::Standard),
            ModelSpec::new("charlie", CostTier::Standard),
        ])
        .unwrap()
    }

    fn breakers() -> BreakerTable {
        BreakerTable::new(BreakerConfig::default())
    }

    fn warm(pool: &ModelPool, model: &str, strength: f64) {
        for _ in 0..4 {
            pool.record_success(model, 500, 100);
            pool.record_strength(model, strength);
        }
    }

    #[test]
    fn test_fixed_never_rotates() {
        let pool = pool();
        warm(&pool, "alpha", 0.1);
        warm(&pool, "bravo", 0.9);
        let engine = RotationEngine::new(RotationStrategy::Fixed, 3);
        assert!(engine
            .evaluate(Role::Debater(0), "alpha", &pool, &breakers(), 4, &[])
            .is_none());
    }

    #[test]
    fn test_min_calls_precondition() {
        let pool = pool();
        // Incumbent has only 2 observations.
        pool.record_success("alpha", 500, 100);
        pool.record_success("alpha", 500, 100);
        warm(&pool, "bravo", 0.9);

        let engine = RotationEngine::new(RotationStrategy::PerformanceBased, 3);
        assert!(engine
            .evaluate(Role::Debater(0), "alpha", &pool, &breakers(), 4, &[])
            .is_none());
    }

    #[test]
    fn test_performance_rotation_on_margin() {
        let pool = pool();
        warm(&pool, "alpha", 0.2);
        warm(&pool, "bravo", 0.9);

        let engine = RotationEngine::new(RotationStrategy::PerformanceBased, 3);
        let decision = engine
            .evaluate(Role::Debater(0), "alpha", &pool, &breakers(), 4, &[])
            .unwrap();
        assert_eq!(decision.new_model, "bravo");
        assert_eq!(decision.reason, RotationReason::PerformanceLag);
        assert!(decision.expected_improvement >= 0.10);
        assert!(decision.confidence > 0.6);
    }

    #[test]
    fn test_performance_holds_inside_margin() {
        let pool = pool();
        warm(&pool, "alpha", 0.80);
        warm(&pool, "bravo", 0.84);

        let engine = RotationEngine::new(RotationStrategy::PerformanceBased, 3);
        assert!(engine
            .evaluate(Role::Debater(0), "alpha", &pool, &breakers(), 4, &[])
            .is_none());
    }

    #[test]
    fn test_round_robin_period() {
        let pool = pool();
        warm(&pool, "alpha", 0.5);
        let engine = RotationEngine::new(RotationStrategy::RoundRobin, 3);

        assert!(engine
            .evaluate(Role::Debater(0), "alpha", &pool, &breakers(), 1, &[])
            .is_none());
        let decision = engine
            .evaluate(Role::Debater(0), "alpha", &pool, &breakers(), 2, &[])
            .unwrap();
        assert_eq!(decision.new_model, "bravo");
        assert_eq!(decision.reason, RotationReason::ScheduledRoundRobin);
    }

    #[test]
    fn test_adaptive_quality_decline() {
        let pool = pool();
        // Scores comparable, so the performance arm stays quiet.
        warm(&pool, "alpha", 0.6);
        warm(&pool, "bravo", 0.6);

        let engine = RotationEngine::new(RotationStrategy::Adaptive, 3);
        // Two consecutive declining rounds trigger rotation.
        let decision = engine
            .evaluate(
                Role::Debater(0),
                "alpha",
                &pool,
                &breakers(),
                3,
                &[0.7, 0.5, 0.3],
            )
            .unwrap();
        assert_eq!(decision.reason, RotationReason::QualityDecline);

        // A recovering trend does not.
        assert!(engine
            .evaluate(
                Role::Debater(0),
                "alpha",
                &pool,
                &breakers(),
                3,
                &[0.7, 0.5, 0.6],
            )
            .is_none());
    }

    #[test]
    fn test_balanced_rotates_to_lean_spender() {
        let pool = pool();
        for _ in 0..4 {
            pool.record_success("alpha", 500, 1000);
        }
        warm(&pool, "bravo", 0.5); // 400 tokens

        let engine = RotationEngine::new(RotationStrategy::Balanced, 3);
        let decision = engine
            .evaluate(Role::Debater(0), "alpha", &pool, &breakers(), 3, &[])
            .unwrap();
        assert_eq!(decision.reason, RotationReason::SpendImbalance);
    }

    #[test]
    fn test_emergency_failover() {
        let pool = pool();
        let breakers = breakers();
        breakers.on_exhaustion("alpha", crate::error::FailureKind::Timeout);

        let engine = RotationEngine::new(RotationStrategy::Fixed, 3);
        let decision = engine
            .emergency_replacement(Role::Debater(1), "alpha", &pool, &breakers)
            .unwrap();
        assert_eq!(decision.reason, RotationReason::Failover);
        assert_ne!(decision.new_model, "alpha");
    }

    #[test]
    fn test_declining_helper() {
        assert!(declining(&[0.7, 0.5, 0.3], 2));
        assert!(!declining(&[0.5, 0.3], 2)); // too few samples
        assert!(!declining(&[0.3, 0.5, 0.4], 2)); // only one decline
    }

    #[test]
    fn test_strategy_parse_roundtrip() {
        for strategy in [
            RotationStrategy::Fixed,
            RotationStrategy::RoundRobin,
            RotationStrategy::PerformanceBased,
            RotationStrategy::Adaptive,
            RotationStrategy::Balanced,
        ] {
            let parsed: RotationStrategy = strategy.to_string().parse().unwrap();
            assert_eq!(parsed, strategy);
        }
        assert!("chaotic".parse::<RotationStrategy>().is_err());
    }
}
