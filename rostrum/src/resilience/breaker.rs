//! Per-(model, failure-family) circuit breakers over a rolling window.
//!
//! A breaker trips when its window holds a full `window` of observations
//! with failure rate >= `trip_rate` and at least `min_failures` failures.
//! Open breakers fail fast for a cooldown, then admit exactly one probe;
//! a failed probe re-opens with a doubled cooldown up to the ceiling.
//! Retry exhaustion of a logical call force-opens the breaker so sibling
//! sessions see the outage without re-accumulating failures.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::DebateConfig;
use crate::error::{FailureFamily, FailureKind};

/// Observable state of one breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Healthy — calls allowed.
    Closed,
    /// Tripped — calls rejected until cooldown expires.
    Open,
    /// Cooldown expired — one probe call allowed.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Admission decision for a prospective call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Circuit closed — call freely.
    Allowed,
    /// Circuit half-open — this caller holds the single probe slot.
    Probe,
    /// Circuit open (or probe slot taken) — fail fast.
    Rejected,
}

/// Breaker tuning, lifted from the runtime config.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub window: usize,
    pub trip_rate: f64,
    pub min_failures: u32,
    pub cooldown: Duration,
    pub cooldown_max: Duration,
}

impl BreakerConfig {
    pub fn from_config(config: &DebateConfig) -> Self {
        Self {
            window: config.breaker_window,
            trip_rate: config.breaker_trip_rate,
            min_failures: config.breaker_min_failures,
            cooldown: Duration::from_millis(config.breaker_cooldown_ms),
            cooldown_max: Duration::from_millis(config.breaker_cooldown_max_ms),
        }
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            window: 20,
            trip_rate: 0.5,
            min_failures: 5,
            cooldown: Duration::from_secs(30),
            cooldown_max: Duration::from_secs(300),
        }
    }
}

/// A single breaker: rolling window plus open/half-open bookkeeping.
#[derive(Debug)]
struct Breaker {
    /// Recent outcomes, `true` = failure. Bounded to `config.window`.
    window: VecDeque<bool>,
    opened_at: Option<Instant>,
    cooldown: Duration,
    probe_in_flight: bool,
}

impl Breaker {
    fn new(config: &BreakerConfig) -> Self {
        Self {
            window: VecDeque::with_capacity(config.window),
            opened_at: None,
            cooldown: config.cooldown,
            probe_in_flight: false,
        }
    }

    fn push(&mut self, failed: bool, config: &BreakerConfig) {
        if self.window.len() == config.window {
            self.window.pop_front();
        }
        self.window.push_back(failed);
    }

    fn failure_count(&self) -> u32 {
        self.window.iter().filter(|&&f| f).count() as u32
    }

    fn should_trip(&self, config: &BreakerConfig) -> bool {
        if self.window.len() < config.window {
            return false;
        }
        let failures = self.failure_count();
        let rate = f64::from(failures) / self.window.len() as f64;
        rate >= config.trip_rate && failures >= config.min_failures
    }

    fn state(&self, now: Instant) -> CircuitState {
        match self.opened_at {
            None => CircuitState::Closed,
            Some(opened) => {
                if now.duration_since(opened) >= self.cooldown {
                    CircuitState::HalfOpen
                } else {
                    CircuitState::Open
                }
            }
        }
    }

    fn open(&mut self, now: Instant) {
        self.opened_at = Some(now);
        self.probe_in_flight = false;
    }

    fn reopen(&mut self, now: Instant, config: &BreakerConfig) {
        self.cooldown = (self.cooldown * 2).min(config.cooldown_max);
        self.open(now);
    }

    fn close(&mut self, config: &BreakerConfig) {
        self.opened_at = None;
        self.cooldown = config.cooldown;
        self.probe_in_flight = false;
        self.window.clear();
    }
}

/// Process-wide table of breakers, keyed by `(model, family)`.
///
/// All transitions happen under the table lock; no lock is held across a
/// model call.
pub struct BreakerTable {
    config: BreakerConfig,
    inner: Mutex<HashMap<(String, FailureFamily), Breaker>>,
}

impl BreakerTable {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Families that gate admission. `Fatal` failures are not availability
    /// signals, so they never open a circuit.
    const GATING: [FailureFamily; 2] = [FailureFamily::Availability, FailureFamily::Throttle];

    /// Decide whether a call to `model` may proceed.
    pub fn admit(&self, model: &str) -> Admission {
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("breaker table poisoned");

        // Reject before acquiring any probe slot, so a rejection cannot
        // strand a half-open sibling's probe.
        for family in Self::GATING {
            if let Some(breaker) = inner.get(&(model.to_string(), family)) {
                match breaker.state(now) {
                    CircuitState::Open => return Admission::Rejected,
                    CircuitState::HalfOpen if breaker.probe_in_flight => {
                        return Admission::Rejected
                    }
                    _ => {}
                }
            }
        }

        let mut probe = false;
        for family in Self::GATING {
            if let Some(breaker) = inner.get_mut(&(model.to_string(), family)) {
                if breaker.state(now) == CircuitState::HalfOpen {
                    breaker.probe_in_flight = true;
                    probe = true;
                }
            }
        }
        if probe {
            Admission::Probe
        } else {
            Admission::Allowed
        }
    }

    /// Whether any gating breaker for `model` currently rejects calls.
    pub fn is_open(&self, model: &str) -> bool {
        let now = Instant::now();
        let inner = self.inner.lock().expect("breaker table poisoned");
        Self::GATING.iter().any(|family| {
            inner
                .get(&(model.to_string(), *family))
                .map(|b| b.state(now) == CircuitState::Open)
                .unwrap_or(false)
        })
    }

    /// Observable state of one `(model, family)` breaker.
    pub fn state(&self, model: &str, family: FailureFamily) -> CircuitState {
        let now = Instant::now();
        let inner = self.inner.lock().expect("breaker table poisoned");
        inner
            .get(&(model.to_string(), family))
            .map(|b| b.state(now))
            .unwrap_or(CircuitState::Closed)
    }

    /// Record a successful call.
    pub fn on_success(&self, model: &str) {
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("breaker table poisoned");
        for family in Self::GATING {
            let breaker = inner
                .entry((model.to_string(), family))
                .or_insert_with(|| Breaker::new(&self.config));
            match breaker.state(now) {
                CircuitState::HalfOpen | CircuitState::Open => breaker.close(&self.config),
                CircuitState::Closed => {
                    breaker.push(false, &self.config);
                    // The trip condition is evaluated on every observation
                    // that completes the window, whichever way it went.
                    if breaker.should_trip(&self.config) {
                        breaker.open(now);
                    }
                }
            }
        }
    }

    /// Record a failed call.
    pub fn on_failure(&self, model: &str, kind: FailureKind) {
        let family = kind.family();
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("breaker table poisoned");

        // The call concluded: release any probe slot it held on the other
        // families, or they would reject forever.
        for gating in Self::GATING {
            if gating != family {
                if let Some(breaker) = inner.get_mut(&(model.to_string(), gating)) {
                    breaker.probe_in_flight = false;
                }
            }
        }

        if family == FailureFamily::Fatal {
            return;
        }
        let breaker = inner
            .entry((model.to_string(), family))
            .or_insert_with(|| Breaker::new(&self.config));
        match breaker.state(now) {
            CircuitState::HalfOpen => breaker.reopen(now, &self.config),
            CircuitState::Open => {}
            CircuitState::Closed => {
                breaker.push(true, &self.config);
                if breaker.should_trip(&self.config) {
                    breaker.open(now);
                }
            }
        }
    }

    /// Release probe slots for `model` without recording an outcome.
    /// Used when a probe call is abandoned by cancellation.
    pub fn release_probe(&self, model: &str) {
        let mut inner = self.inner.lock().expect("breaker table poisoned");
        for family in Self::GATING {
            if let Some(breaker) = inner.get_mut(&(model.to_string(), family)) {
                breaker.probe_in_flight = false;
            }
        }
    }

    /// Force the breaker open after a logical call exhausted its retries.
    pub fn on_exhaustion(&self, model: &str, kind: FailureKind) {
        let family = kind.family();
        if family == FailureFamily::Fatal {
            return;
        }
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("breaker table poisoned");
        let breaker = inner
            .entry((model.to_string(), family))
            .or_insert_with(|| Breaker::new(&self.config));
        breaker.open(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(window: usize, cooldown: Duration) -> BreakerTable {
        BreakerTable::new(BreakerConfig {
            window,
            trip_rate: 0.5,
            min_failures: 5,
            cooldown,
            cooldown_max: Duration::from_secs(300),
        })
    }

    const LONG: Duration = Duration::from_secs(9_999);

    #[test]
    fn test_starts_closed() {
        let table = table(20, LONG);
        assert_eq!(
            table.state("m1", FailureFamily::Availability),
            CircuitState::Closed
        );
        assert_eq!(table.admit("m1"), Admission::Allowed);
    }

    #[test]
    fn test_trips_only_with_full_window() {
        let table = table(20, LONG);
        // 10 failures, then successes. At 19 observations the rate is over
        // the trip threshold but the window is not full: stays closed.
        for _ in 0..10 {
            table.on_failure("m1", FailureKind::Transient);
        }
        for _ in 0..9 {
            table.on_success("m1");
        }
        assert_eq!(
            table.state("m1", FailureFamily::Availability),
            CircuitState::Closed
        );

        // The 20th observation fills the window at exactly rate 0.5 with
        // 10 >= 5 failures: trips.
        table.on_success("m1");
        assert_eq!(
            table.state("m1", FailureFamily::Availability),
            CircuitState::Open
        );
        assert_eq!(table.admit("m1"), Admission::Rejected);
    }

    #[test]
    fn test_min_failures_floor() {
        // Small window: 2 of 4 failures is 50% but below min_failures = 5.
        let table = table(4, LONG);
        table.on_failure("m1", FailureKind::Transient);
        table.on_failure("m1", FailureKind::Transient);
        table.on_success("m1");
        table.on_success("m1");
        assert_eq!(
            table.state("m1", FailureFamily::Availability),
            CircuitState::Closed
        );
    }

    #[test]
    fn test_families_tracked_separately() {
        let table = table(20, LONG);
        table.on_exhaustion("m1", FailureKind::RateLimited);
        assert_eq!(
            table.state("m1", FailureFamily::Throttle),
            CircuitState::Open
        );
        assert_eq!(
            table.state("m1", FailureFamily::Availability),
            CircuitState::Closed
        );
        // Throttle family still gates admission.
        assert_eq!(table.admit("m1"), Admission::Rejected);
    }

    #[test]
    fn test_fatal_failures_never_open() {
        let table = table(20, LONG);
        for _ in 0..50 {
            table.on_failure("m1", FailureKind::Auth);
        }
        assert_eq!(table.admit("m1"), Admission::Allowed);
    }

    #[test]
    fn test_exhaustion_force_opens() {
        let table = table(20, LONG);
        table.on_exhaustion("m1", FailureKind::Timeout);
        assert!(table.is_open("m1"));
        assert_eq!(table.admit("m1"), Admission::Rejected);
    }

    #[test]
    fn test_half_open_single_probe() {
        let table = table(20, Duration::ZERO);
        table.on_exhaustion("m1", FailureKind::Timeout);

        // Zero cooldown: immediately half-open, first caller gets the probe.
        assert_eq!(table.admit("m1"), Admission::Probe);
        // Second caller is rejected while the probe is in flight.
        assert_eq!(table.admit("m1"), Admission::Rejected);
    }

    #[test]
    fn test_probe_success_closes() {
        let table = table(20, Duration::ZERO);
        table.on_exhaustion("m1", FailureKind::Timeout);
        assert_eq!(table.admit("m1"), Admission::Probe);

        table.on_success("m1");
        assert_eq!(
            table.state("m1", FailureFamily::Availability),
            CircuitState::Closed
        );
        assert_eq!(table.admit("m1"), Admission::Allowed);
    }

    #[test]
    fn test_probe_failure_reopens_with_doubled_cooldown() {
        let table = table(20, Duration::from_millis(0));
        table.on_exhaustion("m1", FailureKind::Timeout);
        assert_eq!(table.admit("m1"), Admission::Probe);

        table.on_failure("m1", FailureKind::Timeout);
        // Cooldown doubled from zero stays zero, so half-open again;
        // the probe slot must have been released and re-acquirable.
        assert_eq!(table.admit("m1"), Admission::Probe);
    }

    #[test]
    fn test_cross_family_failure_releases_probe() {
        let table = table(20, Duration::ZERO);
        table.on_exhaustion("m1", FailureKind::Timeout);
        assert_eq!(table.admit("m1"), Admission::Probe);

        // The probe call failed, but with a throttle-family kind. The
        // availability probe slot must come back.
        table.on_failure("m1", FailureKind::RateLimited);
        assert_eq!(table.admit("m1"), Admission::Probe);
    }

    #[test]
    fn test_success_resets_window() {
        let table = BreakerTable::new(BreakerConfig {
            window: 4,
            trip_rate: 0.5,
            min_failures: 2,
            cooldown: Duration::ZERO,
            cooldown_max: Duration::from_secs(300),
        });
        for _ in 0..4 {
            table.on_failure("m1", FailureKind::Transient);
        }
        // Tripped; zero cooldown means the probe is immediately available
        // and a success closes the circuit, clearing the window.
        assert_eq!(table.admit("m1"), Admission::Probe);
        table.on_success("m1");
        for _ in 0..3 {
            table.on_failure("m1", FailureKind::Transient);
        }
        // A cleared window of size 4 cannot trip on 3 failures.
        assert_eq!(table.admit("m1"), Admission::Allowed);
    }
}
