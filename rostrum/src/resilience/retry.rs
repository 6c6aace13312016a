//! Exponential backoff with full jitter, and the per-session retry ledger.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use rand::Rng;

use crate::config::DebateConfig;

/// Backoff schedule for retriable failures.
///
/// Delay for retry `n` (1-indexed) is drawn uniformly from
/// `[0, min(cap, base * 2^(n-1))]`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts per logical call, including the first.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub cap_delay_ms: u64,
}

impl RetryPolicy {
    pub fn from_config(config: &DebateConfig) -> Self {
        Self {
            max_attempts: config.retry_max_attempts,
            base_delay_ms: config.retry_base_delay_ms,
            cap_delay_ms: config.retry_cap_delay_ms,
        }
    }

    /// Ceiling of the jitter window for retry `n` (1-indexed).
    pub fn ceiling_ms(&self, retry: u32) -> u64 {
        let exp = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(retry.saturating_sub(1)));
        exp.min(self.cap_delay_ms)
    }

    /// Jittered delay before retry `n`.
    pub fn delay(&self, retry: u32) -> Duration {
        let ceiling = self.ceiling_ms(retry);
        let ms = if ceiling == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=ceiling)
        };
        Duration::from_millis(ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 500,
            cap_delay_ms: 8_000,
        }
    }
}

/// Process-wide ledger of remaining retries per session.
///
/// Exhausting a session's budget escalates its next surfaced failure to
/// fatal; the ledger is consulted under a short lock and never held across
/// a call.
#[derive(Debug, Default)]
pub struct RetryLedger {
    remaining: Mutex<HashMap<String, u32>>,
}

impl RetryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session with its retry budget.
    pub fn register(&self, session_id: &str, budget: u32) {
        self.remaining
            .lock()
            .expect("retry ledger poisoned")
            .insert(session_id.to_string(), budget);
    }

    /// Consume one retry. Returns false when the budget is already spent
    /// (or the session was never registered).
    pub fn try_consume(&self, session_id: &str) -> bool {
        let mut remaining = self.remaining.lock().expect("retry ledger poisoned");
        match remaining.get_mut(session_id) {
            Some(count) if *count > 0 => {
                *count -= 1;
                true
            }
            _ => false,
        }
    }

    /// Remaining retries for a session.
    pub fn remaining(&self, session_id: &str) -> u32 {
        self.remaining
            .lock()
            .expect("retry ledger poisoned")
            .get(session_id)
            .copied()
            .unwrap_or(0)
    }

    /// Whether the session has no retries left.
    pub fn is_exhausted(&self, session_id: &str) -> bool {
        self.remaining(session_id) == 0
    }

    /// Drop a finished session's entry.
    pub fn release(&self, session_id: &str) {
        self.remaining
            .lock()
            .expect("retry ledger poisoned")
            .remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ceiling_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.ceiling_ms(1), 500);
        assert_eq!(policy.ceiling_ms(2), 1_000);
        assert_eq!(policy.ceiling_ms(3), 2_000);
        assert_eq!(policy.ceiling_ms(4), 4_000);
        assert_eq!(policy.ceiling_ms(5), 8_000);
        assert_eq!(policy.ceiling_ms(10), 8_000); // capped
    }

    #[test]
    fn test_delay_within_jitter_window() {
        let policy = RetryPolicy::default();
        for retry in 1..=6 {
            let delay = policy.delay(retry);
            assert!(delay.as_millis() as u64 <= policy.ceiling_ms(retry));
        }
    }

    #[test]
    fn test_ledger_consumes_down_to_zero() {
        let ledger = RetryLedger::new();
        ledger.register("s1", 2);

        assert!(ledger.try_consume("s1"));
        assert!(ledger.try_consume("s1"));
        assert!(!ledger.try_consume("s1"));
        assert!(ledger.is_exhausted("s1"));
    }

    #[test]
    fn test_ledger_zero_budget_never_allows() {
        let ledger = RetryLedger::new();
        ledger.register("s1", 0);
        assert!(!ledger.try_consume("s1"));
        assert!(ledger.is_exhausted("s1"));
    }

    #[test]
    fn test_ledger_sessions_independent() {
        let ledger = RetryLedger::new();
        ledger.register("s1", 1);
        ledger.register("s2", 1);

        assert!(ledger.try_consume("s1"));
        assert!(!ledger.try_consume("s1"));
        assert!(ledger.try_consume("s2"));
    }

    #[test]
    fn test_ledger_release() {
        let ledger = RetryLedger::new();
        ledger.register("s1", 5);
        ledger.release("s1");
        assert_eq!(ledger.remaining("s1"), 0);
        assert!(!ledger.try_consume("s1"));
    }

    #[test]
    fn test_unregistered_session_is_exhausted() {
        let ledger = RetryLedger::new();
        assert!(!ledger.try_consume("ghost"));
    }
}
