//! Circuit breaker guarding outbound API calls.
//!
//! When calls fail repeatedly the circuit opens and further calls fail fast
//! until a cool-down elapses. Then a single trial call is let through: its
//! success closes the circuit, its failure reopens it.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Consecutive failures before the circuit opens.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Time the circuit stays open before allowing a trial call.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

/// Observable state of a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation.
    Closed,
    /// Failing fast.
    Open,
    /// Cool-down elapsed; one trial call may pass.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed { failures: u32 },
    Open { opened_at: Instant },
    HalfOpen { trial_started: Option<Instant> },
}

/// Shared, thread-safe circuit breaker.
///
/// All transitions happen under one lock, so concurrent failure and success
/// reports are applied in a single order and none are lost.
#[derive(Debug)]
pub struct CircuitBreaker {
    phase: Mutex<Phase>,
    threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    /// Create a breaker that opens after `threshold` consecutive failures.
    ///
    /// A threshold of zero is treated as one.
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            phase: Mutex::new(Phase::Closed { failures: 0 }),
            threshold: threshold.max(1),
            cooldown,
        }
    }

    /// Whether a new call must be rejected.
    ///
    /// Once the cool-down has elapsed this moves the circuit to half-open and
    /// admits the caller as the trial; every other caller is rejected until
    /// the trial reports back. A trial that never reports success or failure
    /// loses its slot after another cool-down.
    pub fn is_open(&self) -> bool {
        let mut phase = self.phase.lock();
        match *phase {
            Phase::Closed { .. } => false,
            Phase::Open { opened_at } => {
                if opened_at.elapsed() < self.cooldown {
                    return true;
                }
                *phase = Phase::HalfOpen {
                    trial_started: Some(Instant::now()),
                };
                tracing::info!("circuit half-open, allowing trial call");
                false
            }
            Phase::HalfOpen {
                trial_started: Some(started),
            } if started.elapsed() < self.cooldown => true,
            Phase::HalfOpen { .. } => {
                *phase = Phase::HalfOpen {
                    trial_started: Some(Instant::now()),
                };
                false
            }
        }
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        let mut phase = self.phase.lock();
        match *phase {
            Phase::Closed { .. } => *phase = Phase::Closed { failures: 0 },
            Phase::HalfOpen { .. } => {
                *phase = Phase::Closed { failures: 0 };
                tracing::info!("circuit closed after successful trial call");
            }
            // A straggler admitted before the circuit opened.
            Phase::Open { .. } => {}
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        let mut phase = self.phase.lock();
        match *phase {
            Phase::Closed { failures } => {
                let failures = failures + 1;
                if failures >= self.threshold {
                    *phase = Phase::Open {
                        opened_at: Instant::now(),
                    };
                    tracing::warn!(failures, "circuit opened after repeated failures");
                } else {
                    *phase = Phase::Closed { failures };
                }
            }
            Phase::HalfOpen { .. } => {
                *phase = Phase::Open {
                    opened_at: Instant::now(),
                };
                tracing::warn!("circuit reopened after failed trial call");
            }
            Phase::Open { .. } => {}
        }
    }

    /// Current state, without performing any transition.
    pub fn state(&self) -> CircuitState {
        match *self.phase.lock() {
            Phase::Closed { .. } => CircuitState::Closed,
            Phase::Open { opened_at } if opened_at.elapsed() < self.cooldown => CircuitState::Open,
            Phase::Open { .. } | Phase::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    /// Consecutive failures recorded while closed.
    pub fn failure_count(&self) -> u32 {
        match *self.phase.lock() {
            Phase::Closed { failures } => failures,
            _ => self.threshold,
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_COOLDOWN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_circuit_starts_closed() {
        let cb = CircuitBreaker::default();
        assert!(!cb.is_open());
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_opens_after_exactly_threshold_failures() {
        let cb = CircuitBreaker::new(5, Duration::from_secs(30));

        for _ in 0..4 {
            cb.record_failure();
        }
        assert!(!cb.is_open());

        cb.record_failure();
        assert!(cb.is_open());
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_success_resets_failures() {
        let cb = CircuitBreaker::new(3, Duration::from_secs(30));

        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        assert_eq!(cb.failure_count(), 0);

        cb.record_failure();
        cb.record_failure();
        assert!(!cb.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_allows_single_trial() {
        let cb = CircuitBreaker::new(1, Duration::from_secs(30));
        cb.record_failure();

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(cb.is_open());

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(!cb.is_open(), "trial call should be admitted");
        assert!(cb.is_open(), "second caller must wait for the trial");
    }

    #[tokio::test(start_paused = true)]
    async fn test_trial_success_closes() {
        let cb = CircuitBreaker::new(1, Duration::from_secs(30));
        cb.record_failure();
        tokio::time::advance(Duration::from_secs(30)).await;

        assert!(!cb.is_open());
        cb.record_success();

        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(!cb.is_open());
        assert!(!cb.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_trial_failure_reopens_and_restarts_cooldown() {
        let cb = CircuitBreaker::new(1, Duration::from_secs(30));
        cb.record_failure();
        tokio::time::advance(Duration::from_secs(30)).await;

        assert!(!cb.is_open());
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(cb.is_open());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!cb.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_trial_forfeits_slot() {
        let cb = CircuitBreaker::new(1, Duration::from_secs(30));
        cb.record_failure();
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(!cb.is_open());

        // The trial never reports back.
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(!cb.is_open());
        assert!(cb.is_open());
    }

    #[test]
    fn test_concurrent_failures_are_not_lost() {
        let cb = Arc::new(CircuitBreaker::new(10_000, Duration::from_secs(30)));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cb = Arc::clone(&cb);
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        cb.record_failure();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cb.failure_count(), 2_000);
        assert!(!cb.is_open());
    }

    #[test]
    fn test_zero_threshold_treated_as_one() {
        let cb = CircuitBreaker::new(0, Duration::from_secs(30));
        cb.record_failure();
        assert!(cb.is_open());
    }
}
