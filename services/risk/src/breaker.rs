//! Circuit breaker for fault tolerance.
//!
//! Three states: CLOSED (normal) → OPEN (all admissions blocked) →
//! HALF_OPEN (next outcome decides). The hourly failure count is an exact
//! sliding window of timestamps pruned to the trailing 60 minutes on every
//! evaluation, not a bucketed histogram. Per-strategy failure counts are
//! tracked independently and can disable a single strategy without
//! tripping the global breaker.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use config::BreakerConfig;

/// Sliding window length for the hourly failure count.
const HOURLY_WINDOW: Duration = Duration::from_secs(3600);

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CircuitState {
    /// Normal operation, admissions pass through.
    Closed,
    /// Failing, all admissions are rejected.
    Open,
    /// Testing recovery, the next recorded outcome decides.
    HalfOpen,
}

/// Admission verdict for one strategy at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Permit {
    Allowed,
    /// The global breaker is open.
    GlobalOpen,
    /// Only this strategy is disabled.
    StrategyDisabled,
}

struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    /// Timestamps of recent failures, pruned to [`HOURLY_WINDOW`].
    hourly_failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    strategy_failures: HashMap<String, u32>,
    disabled_strategies: HashSet<String>,
}

impl BreakerInner {
    fn prune_hourly(&mut self, now: Instant) {
        while let Some(front) = self.hourly_failures.front() {
            if now.duration_since(*front) > HOURLY_WINDOW {
                self.hourly_failures.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Status snapshot for the process status query.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStatus {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub hourly_failures: usize,
    /// Seconds until OPEN may transition to HALF_OPEN; zero otherwise.
    pub cooldown_remaining_secs: f64,
    pub disabled_strategies: Vec<String>,
}

/// Process-wide (and per-strategy) fault-tolerance gate. Owned exclusively
/// by admission control; execution outcomes arrive through
/// [`CircuitBreaker::record_outcome`] exactly once each.
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                hourly_failures: VecDeque::new(),
                opened_at: None,
                strategy_failures: HashMap::new(),
                disabled_strategies: HashSet::new(),
            }),
        }
    }

    /// Whether an admission for `strategy` may proceed right now. An OPEN
    /// breaker whose cooldown has elapsed transitions to HALF_OPEN here.
    pub fn permit(&self, strategy: &str) -> Permit {
        let mut inner = self.inner.lock();

        if inner.state == CircuitState::Open {
            let elapsed = inner
                .opened_at
                .map(|t| t.elapsed())
                .unwrap_or(Duration::ZERO);
            if elapsed >= Duration::from_secs(self.config.cooldown_secs) {
                inner.state = CircuitState::HalfOpen;
                info!("circuit breaker cooldown elapsed, transitioning to half-open");
            } else {
                return Permit::GlobalOpen;
            }
        }

        if inner.disabled_strategies.contains(strategy) {
            return Permit::StrategyDisabled;
        }
        Permit::Allowed
    }

    /// Record one execution outcome. Success in HALF_OPEN closes the
    /// breaker and resets the consecutive count; failure re-opens it and
    /// restarts the cooldown. A failure while already OPEN does not touch
    /// the cooldown timer.
    pub fn record_outcome(&self, strategy: &str, success: bool) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.prune_hourly(now);

        if success {
            inner.consecutive_failures = 0;
            inner.strategy_failures.remove(strategy);
            if inner.state == CircuitState::HalfOpen {
                inner.state = CircuitState::Closed;
                inner.opened_at = None;
                info!("circuit breaker closed after successful half-open probe");
            }
            return;
        }

        inner.consecutive_failures += 1;
        inner.hourly_failures.push_back(now);

        let strategy_count = {
            let count = inner
                .strategy_failures
                .entry(strategy.to_string())
                .and_modify(|c| *c += 1)
                .or_insert(1);
            *count
        };
        if strategy_count >= self.config.strategy_disable_threshold
            && inner.disabled_strategies.insert(strategy.to_string())
        {
            warn!(strategy, count = strategy_count, "strategy disabled after repeated failures");
        }

        match inner.state {
            CircuitState::Closed => {
                let hourly = inner.hourly_failures.len() as u32;
                if inner.consecutive_failures >= self.config.max_consecutive_failures
                    || hourly >= self.config.max_hourly_failures
                {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(now);
                    warn!(
                        consecutive = inner.consecutive_failures,
                        hourly, "circuit breaker OPENED"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(now);
                warn!("circuit breaker re-opened from half-open");
            }
            CircuitState::Open => {
                // Already open: the cooldown keeps its original deadline.
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn status(&self) -> BreakerStatus {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        inner.prune_hourly(now);

        let cooldown_remaining = match (inner.state, inner.opened_at) {
            (CircuitState::Open, Some(opened)) => {
                let cooldown = Duration::from_secs(self.config.cooldown_secs);
                cooldown.saturating_sub(now.duration_since(opened)).as_secs_f64()
            }
            _ => 0.0,
        };

        let mut disabled: Vec<String> = inner.disabled_strategies.iter().cloned().collect();
        disabled.sort();

        BreakerStatus {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            hourly_failures: inner.hourly_failures.len(),
            cooldown_remaining_secs: cooldown_remaining,
            disabled_strategies: disabled,
        }
    }

    /// Manual intervention: back to CLOSED with all counters cleared and
    /// every strategy re-enabled.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.hourly_failures.clear();
        inner.opened_at = None;
        inner.strategy_failures.clear();
        inner.disabled_strategies.clear();
        info!("circuit breaker manually reset to closed");
    }

    /// Re-enable a single disabled strategy without touching global state.
    pub fn enable_strategy(&self, strategy: &str) {
        let mut inner = self.inner.lock();
        inner.disabled_strategies.remove(strategy);
        inner.strategy_failures.remove(strategy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(cooldown_secs: u64) -> BreakerConfig {
        BreakerConfig {
            max_consecutive_failures: 5,
            max_hourly_failures: 20,
            cooldown_secs,
            strategy_disable_threshold: 100,
        }
    }

    #[test]
    fn five_consecutive_failures_open_the_breaker() {
        let breaker = CircuitBreaker::new(config(300));
        for _ in 0..4 {
            breaker.record_outcome("arb", false);
            assert_eq!(breaker.state(), CircuitState::Closed);
        }
        breaker.record_outcome("arb", false);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.permit("arb"), Permit::GlobalOpen);
    }

    #[test]
    fn half_open_success_closes_and_resets() {
        let breaker = CircuitBreaker::new(config(0));
        for _ in 0..5 {
            breaker.record_outcome("arb", false);
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        // Zero cooldown: the next permit check moves to half-open.
        assert_eq!(breaker.permit("arb"), Permit::Allowed);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_outcome("arb", true);
        let status = breaker.status();
        assert_eq!(status.state, CircuitState::Closed);
        assert_eq!(status.consecutive_failures, 0);
    }

    #[test]
    fn half_open_failure_reopens() {
        let breaker = CircuitBreaker::new(config(0));
        for _ in 0..5 {
            breaker.record_outcome("arb", false);
        }
        assert_eq!(breaker.permit("arb"), Permit::Allowed); // half-open
        breaker.record_outcome("arb", false);
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn failure_while_open_does_not_extend_cooldown() {
        let breaker = CircuitBreaker::new(config(300));
        for _ in 0..5 {
            breaker.record_outcome("arb", false);
        }
        let before = breaker.status().cooldown_remaining_secs;
        breaker.record_outcome("arb", false);
        let after = breaker.status().cooldown_remaining_secs;
        assert!(
            after <= before,
            "cooldown must not restart on failures while open"
        );
    }

    #[test]
    fn strategy_disabling_is_independent() {
        let breaker = CircuitBreaker::new(BreakerConfig {
            strategy_disable_threshold: 3,
            ..config(300)
        });
        for _ in 0..3 {
            breaker.record_outcome("sandwich", false);
        }
        // Three failures: strategy disabled, global breaker still closed.
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.permit("sandwich"), Permit::StrategyDisabled);
        assert_eq!(breaker.permit("arb"), Permit::Allowed);

        breaker.enable_strategy("sandwich");
        assert_eq!(breaker.permit("sandwich"), Permit::Allowed);
    }

    #[test]
    fn manual_reset_clears_everything() {
        let breaker = CircuitBreaker::new(config(300));
        for _ in 0..6 {
            breaker.record_outcome("arb", false);
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        breaker.reset();
        let status = breaker.status();
        assert_eq!(status.state, CircuitState::Closed);
        assert_eq!(status.consecutive_failures, 0);
        assert_eq!(status.hourly_failures, 0);
        assert!(status.disabled_strategies.is_empty());
    }
}
