//! Runtime configuration surface.
//!
//! All numeric policy knobs live here with the documented defaults; the
//! semantics are fixed but every threshold is tunable per deployment.
//! A config can be loaded from a TOML file with any subset of keys set.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::analyzer::StrengthWeights;
use crate::error::ApiError;
use crate::pool::RotationStrategy;

/// Tunable policy for the debate runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebateConfig {
    /// Minimum middle-phase rounds before the round manager may shorten.
    pub min_rounds: u32,
    /// Hard cap on middle-phase rounds.
    pub max_rounds: u32,
    /// Per-turn model-call deadline in milliseconds.
    pub turn_deadline_ms: u64,
    /// Total wall-clock budget for a session in milliseconds.
    pub session_budget_ms: u64,
    /// Rotation strategy applied at phase boundaries.
    pub rotation_strategy: RotationStrategy,
    /// Observations of the incumbent model required before rotating it.
    pub min_calls_before_rotation: u32,
    /// Attempts per logical model call (first try + retries).
    pub retry_max_attempts: u32,
    /// Base backoff delay in milliseconds.
    pub retry_base_delay_ms: u64,
    /// Backoff cap in milliseconds.
    pub retry_cap_delay_ms: u64,
    /// Cumulative retry cap across all turns of one session.
    pub session_retry_budget: u32,
    /// Rolling observation window per breaker.
    pub breaker_window: usize,
    /// Failure rate at which a full window trips the breaker.
    pub breaker_trip_rate: f64,
    /// Minimum failures in the window required to trip.
    pub breaker_min_failures: u32,
    /// Initial open-state cooldown in milliseconds.
    pub breaker_cooldown_ms: u64,
    /// Cooldown ceiling after repeated re-opens, in milliseconds.
    pub breaker_cooldown_max_ms: u64,
    /// Component weights for the composite argument-strength score.
    pub strength_weights: StrengthWeights,
    /// Token ceiling before transcript context is compressed.
    pub transcript_token_ceiling: usize,
    /// Max completion tokens requested per turn.
    pub max_completion_tokens: u32,
}

impl Default for DebateConfig {
    fn default() -> Self {
        Self {
            min_rounds: 3,
            max_rounds: 10,
            turn_deadline_ms: 60_000,
            session_budget_ms: 1_800_000,
            rotation_strategy: RotationStrategy::Adaptive,
            min_calls_before_rotation: 3,
            retry_max_attempts: 4,
            retry_base_delay_ms: 500,
            retry_cap_delay_ms: 8_000,
            session_retry_budget: 20,
            breaker_window: 20,
            breaker_trip_rate: 0.5,
            breaker_min_failures: 5,
            breaker_cooldown_ms: 30_000,
            breaker_cooldown_max_ms: 300_000,
            strength_weights: StrengthWeights::default(),
            transcript_token_ceiling: 24_000,
            max_completion_tokens: 2048,
        }
    }
}

impl DebateConfig {
    /// Validate cross-field constraints.
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.min_rounds == 0 {
            return Err(ApiError::InvalidConfig("min_rounds must be >= 1".into()));
        }
        if self.max_rounds < self.min_rounds {
            return Err(ApiError::InvalidConfig(format!(
                "max_rounds ({}) < min_rounds ({})",
                self.max_rounds, self.min_rounds
            )));
        }
        if self.retry_max_attempts == 0 {
            return Err(ApiError::InvalidConfig(
                "retry_max_attempts must be >= 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.breaker_trip_rate) {
            return Err(ApiError::InvalidConfig(format!(
                "breaker_trip_rate {} outside [0, 1]",
                self.breaker_trip_rate
            )));
        }
        if self.breaker_window == 0 {
            return Err(ApiError::InvalidConfig("breaker_window must be >= 1".into()));
        }
        self.strength_weights.validate()?;
        Ok(())
    }

    /// Load from a TOML file; missing keys fall back to defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ApiError> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ApiError::InvalidConfig(format!("read config: {e}")))?;
        let config: Self =
            toml::from_str(&raw).map_err(|e| ApiError::InvalidConfig(format!("parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Per-turn deadline as a `Duration`.
    pub fn turn_deadline(&self) -> Duration {
        Duration::from_millis(self.turn_deadline_ms)
    }

    /// Session wall-clock budget as a `Duration`.
    pub fn session_budget(&self) -> Duration {
        Duration::from_millis(self.session_budget_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = DebateConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.min_rounds, 3);
        assert_eq!(config.max_rounds, 10);
        assert_eq!(config.retry_max_attempts, 4);
        assert_eq!(config.session_retry_budget, 20);
        assert_eq!(config.turn_deadline(), Duration::from_secs(60));
        assert_eq!(config.session_budget(), Duration::from_secs(1800));
    }

    #[test]
    fn test_rejects_inverted_round_bounds() {
        let config = DebateConfig {
            min_rounds: 5,
            max_rounds: 3,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_rounds"));
    }

    #[test]
    fn test_rejects_bad_trip_rate() {
        let config = DebateConfig {
            breaker_trip_rate: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_rounds = 6\nsession_retry_budget = 5").unwrap();

        let config = DebateConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.max_rounds, 6);
        assert_eq!(config.session_retry_budget, 5);
        assert_eq!(config.min_rounds, 3); // default
    }

    #[test]
    fn test_invalid_toml_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_rounds = \"lots\"").unwrap();
        assert!(DebateConfig::from_toml_file(file.path()).is_err());
    }

    #[test]
    fn test_config_json_roundtrip() {
        let config = DebateConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: DebateConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.max_rounds, config.max_rounds);
        assert_eq!(parsed.breaker_window, config.breaker_window);
    }
}
