//! Model pool — known models, per-model running stats, role assignment.
//!
//! Process-wide, shared read-mostly across sessions. Stat updates take a
//! short lock; no lock is held across a model call.

pub mod rotation;

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::resilience::BreakerTable;
use crate::session::phase::Role;

pub use rotation::{RotationDecision, RotationEngine, RotationReason, RotationStrategy};

/// Declared cost/latency tier of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostTier {
    Economy,
    Standard,
    Premium,
}

impl CostTier {
    /// Rough USD per 1k tokens, for session cost estimates.
    pub fn price_per_1k_tokens(self) -> f64 {
        match self {
            Self::Economy => 0.0005,
            Self::Standard => 0.002,
            Self::Premium => 0.010,
        }
    }
}

impl std::fmt::Display for CostTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Economy => write!(f, "economy"),
            Self::Standard => write!(f, "standard"),
            Self::Premium => write!(f, "premium"),
        }
    }
}

/// A known model with its declared properties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    pub id: String,
    pub tier: CostTier,
    pub capabilities: Vec<String>,
}

impl ModelSpec {
    pub fn new(id: impl Into<String>, tier: CostTier) -> Self {
        Self {
            id: id.into(),
            tier,
            capabilities: Vec::new(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.capabilities = capabilities;
        self
    }
}

/// Smoothing factor for the moving averages.
const EWMA_ALPHA: f64 = 0.3;

/// Accumulated per-model observations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelStats {
    pub calls: u64,
    pub successes: u64,
    pub failures: u64,
    pub latency_ewma_ms: f64,
    pub strength_ewma: f64,
    pub strength_samples: u32,
    pub tokens_spent: u64,
}

impl ModelStats {
    pub fn record_success(&mut self, latency_ms: u64, tokens: u32) {
        self.calls += 1;
        self.successes += 1;
        self.tokens_spent += u64::from(tokens);
        self.latency_ewma_ms = if self.successes == 1 {
            latency_ms as f64
        } else {
            EWMA_ALPHA * latency_ms as f64 + (1.0 - EWMA_ALPHA) * self.latency_ewma_ms
        };
    }

    pub fn record_failure(&mut self) {
        self.calls += 1;
        self.failures += 1;
    }

    pub fn record_strength(&mut self, strength: f64) {
        self.strength_ewma = if self.strength_samples == 0 {
            strength
        } else {
            EWMA_ALPHA * strength + (1.0 - EWMA_ALPHA) * self.strength_ewma
        };
        self.strength_samples += 1;
    }

    pub fn success_rate(&self) -> f64 {
        if self.calls == 0 {
            1.0
        } else {
            self.successes as f64 / self.calls as f64
        }
    }

    /// Composite fitness used by rotation: success rate, argument strength,
    /// and a latency factor that halves at 10 s.
    pub fn composite_score(&self) -> f64 {
        if self.calls == 0 && self.strength_samples == 0 {
            // Unobserved models score neutral so they stay candidates.
            return 0.5;
        }
        let latency_factor = 1.0 / (1.0 + self.latency_ewma_ms / 10_000.0);
        let strength = if self.strength_samples == 0 {
            0.5
        } else {
            self.strength_ewma
        };
        (0.4 * self.success_rate() + 0.4 * strength + 0.2 * latency_factor).clamp(0.0, 1.0)
    }
}

/// The process-wide pool.
pub struct ModelPool {
    specs: Vec<ModelSpec>,
    stats: Mutex<HashMap<String, ModelStats>>,
}

impl ModelPool {
    pub fn new(specs: Vec<ModelSpec>) -> Result<Self, ApiError> {
        if specs.is_empty() {
            return Err(ApiError::InvalidConfig("model pool is empty".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for spec in &specs {
            if !seen.insert(spec.id.clone()) {
                return Err(ApiError::InvalidConfig(format!(
                    "duplicate model id: {}",
                    spec.id
                )));
            }
        }
        Ok(Self {
            specs,
            stats: Mutex::new(HashMap::new()),
        })
    }

    pub fn specs(&self) -> &[ModelSpec] {
        &self.specs
    }

    pub fn spec(&self, id: &str) -> Option<&ModelSpec> {
        self.specs.iter().find(|s| s.id == id)
    }

    /// Initial role → model binding for a new session.
    ///
    /// Debaters take models round-robin in declaration order; the judge gets
    /// the highest-tier model (first declared among equals).
    pub fn initial_assignment(&self, debater_count: u8) -> HashMap<Role, String> {
        let mut assignment = HashMap::new();
        for (i, role) in Role::debaters(debater_count).into_iter().enumerate() {
            assignment.insert(role, self.specs[i % self.specs.len()].id.clone());
        }
        let judge_model = self
            .specs
            .iter()
            .max_by_key(|s| s.tier)
            .expect("pool is non-empty")
            .id
            .clone();
        assignment.insert(Role::Judge, judge_model);
        assignment
    }

    pub fn record_success(&self, model: &str, latency_ms: u64, tokens: u32) {
        self.stats
            .lock()
            .expect("pool stats poisoned")
            .entry(model.to_string())
            .or_default()
            .record_success(latency_ms, tokens);
    }

    pub fn record_failure(&self, model: &str) {
        self.stats
            .lock()
            .expect("pool stats poisoned")
            .entry(model.to_string())
            .or_default()
            .record_failure();
    }

    pub fn record_strength(&self, model: &str, strength: f64) {
        self.stats
            .lock()
            .expect("pool stats poisoned")
            .entry(model.to_string())
            .or_default()
            .record_strength(strength);
    }

    /// Snapshot of one model's stats.
    pub fn stats_for(&self, model: &str) -> ModelStats {
        self.stats
            .lock()
            .expect("pool stats poisoned")
            .get(model)
            .cloned()
            .unwrap_or_default()
    }

    /// Models sharing `tier`, in declaration order.
    pub fn tier_peers(&self, tier: CostTier) -> Vec<&ModelSpec> {
        self.specs.iter().filter(|s| s.tier == tier).collect()
    }

    /// Best healthy replacement for `current`: same tier preferred, breaker
    /// not open, highest composite score. Falls back to any healthy model.
    pub fn healthy_replacement(&self, current: &str, breakers: &BreakerTable) -> Option<String> {
        let tier = self.spec(current).map(|s| s.tier);
        let healthy = |spec: &&ModelSpec| spec.id != current && !breakers.is_open(&spec.id);

        let pick_best = |candidates: Vec<&ModelSpec>| {
            candidates
                .into_iter()
                .max_by(|a, b| {
                    let sa = self.stats_for(&a.id).composite_score();
                    let sb = self.stats_for(&b.id).composite_score();
                    sa.partial_cmp(&sb).unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|s| s.id.clone())
        };

        if let Some(tier) = tier {
            let same_tier: Vec<&ModelSpec> =
                self.tier_peers(tier).into_iter().filter(healthy).collect();
            if let Some(found) = pick_best(same_tier) {
                return Some(found);
            }
        }
        pick_best(self.specs.iter().filter(healthy).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::BreakerConfig;
    use crate::error::FailureKind;

    fn pool() -> ModelPool {
        ModelPool::new(vec![
            ModelSpec::new("alpha", CostTier::Standard),
            ModelSpec::new("bravo", CostTier::Standard),
            ModelSpec::new("charlie", CostTier::Premium),
        ])
        .unwrap()
    }

    #[test]
    fn test_empty_pool_rejected() {
        assert!(ModelPool::new(Vec::new()).is_err());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let specs = vec![
            ModelSpec::new("alpha", CostTier::Standard),
            ModelSpec::new("alpha", CostTier::Premium),
        ];
        assert!(ModelPool::new(specs).is_err());
    }

    #[test]
    fn test_initial_assignment_covers_all_roles() {
        let assignment = pool().initial_assignment(2);
        assert_eq!(assignment.len(), 3);
        assert_eq!(assignment[&Role::Debater(0)], "alpha");
        assert_eq!(assignment[&Role::Debater(1)], "bravo");
        // Judge gets the premium model.
        assert_eq!(assignment[&Role::Judge], "charlie");
    }

    #[test]
    fn test_assignment_wraps_when_debaters_outnumber_models() {
        let assignment = pool().initial_assignment(4);
        assert_eq!(assignment[&Role::Debater(3)], "alpha");
    }

    #[test]
    fn test_stats_accumulate() {
        let pool = pool();
        pool.record_success("alpha", 1000, 300);
        pool.record_success("alpha", 2000, 200);
        pool.record_failure("alpha");

        let stats = pool.stats_for("alpha");
        assert_eq!(stats.calls, 3);
        assert_eq!(stats.successes, 2);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.tokens_spent, 500);
        assert!(stats.latency_ewma_ms > 1000.0);
    }

    #[test]
    fn test_strength_ewma_moves_toward_recent() {
        let pool = pool();
        pool.record_strength("alpha", 0.9);
        pool.record_strength("alpha", 0.1);
        let stats = pool.stats_for("alpha");
        assert!(stats.strength_ewma < 0.9);
        assert!(stats.strength_ewma > 0.1);
    }

    #[test]
    fn test_unobserved_model_scores_neutral() {
        let stats = ModelStats::default();
        assert!((stats.composite_score() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_composite_rewards_success_and_strength() {
        let pool = pool();
        pool.record_success("alpha", 500, 100);
        pool.record_strength("alpha", 0.9);
        pool.record_failure("bravo");
        pool.record_failure("bravo");

        let good = pool.stats_for("alpha").composite_score();
        let bad = pool.stats_for("bravo").composite_score();
        assert!(good > bad);
    }

    #[test]
    fn test_replacement_prefers_same_tier() {
        let pool = pool();
        let breakers = BreakerTable::new(BreakerConfig::default());
        let replacement = pool.healthy_replacement("alpha", &breakers).unwrap();
        assert_eq!(replacement, "bravo");
    }

    #[test]
    fn test_replacement_skips_open_breakers() {
        let pool = pool();
        let breakers = BreakerTable::new(BreakerConfig::default());
        breakers.on_exhaustion("bravo", FailureKind::Timeout);

        let replacement = pool.healthy_replacement("alpha", &breakers).unwrap();
        // Same-tier peer is down; falls through to the premium model.
        assert_eq!(replacement, "charlie");
    }

    #[test]
    fn test_no_replacement_when_all_down() {
        let pool = pool();
        let breakers = BreakerTable::new(BreakerConfig::default());
        for model in ["alpha", "bravo", "charlie"] {
            breakers.on_exhaustion(model, FailureKind::Timeout);
        }
        assert!(pool.healthy_replacement("alpha", &breakers).is_none());
    }
}
