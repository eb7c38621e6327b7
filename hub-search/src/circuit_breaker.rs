//! Per-provider circuit breaker.
//!
//! Tracks consecutive failures for one provider and temporarily stops
//! calling it once they reach a threshold. After a cooldown, the breaker
//! enters a half-open state where the next result decides whether to
//! restore or re-trip the circuit.
//!
//! # State Machine
//!
//! ```text
//! ┌────────┐  N failures   ┌────────┐  cooldown   ┌──────────┐
//! │ Closed ├──────────────►│  Open  ├────────────►│ HalfOpen │
//! └───▲────┘               └────────┘             └────┬─────┘
//!     │                         ▲                      │
//!     │  success                │  failure              │
//!     └─────────────────────────┴──────────────────────┘
//! ```
//!
//! Admission ([`CircuitBreaker::can_execute`]) and result recording
//! ([`CircuitBreaker::record_success`], [`CircuitBreaker::record_failure`])
//! take the lock separately and the lock is never held across the wrapped
//! call. A call admitted in one state may therefore be recorded against a
//! state that has changed in the meantime.

use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{Result, SearchError};

/// Circuit breaker state for a single provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Provider is healthy; all requests are allowed through.
    Closed,
    /// Provider has failed too many times; requests are rejected until cooldown expires.
    Open,
    /// Cooldown has elapsed; requests are let through to probe recovery.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for circuit breaker behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Number of failures in the closed state before tripping to Open.
    pub failure_threshold: u32,
    /// How long to stay Open after the last failure before probing.
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_at: Option<Instant>,
}

/// Point-in-time view of a breaker, for health reporting and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    /// Successful probes since entering HalfOpen.
    pub success_count: u32,
    pub last_failure_at: Option<Instant>,
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

/// Failure/success state machine guarding calls to one flaky upstream.
///
/// Created once per provider at startup and mutated only through
/// [`CircuitBreaker::execute`] (or its two halves).
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a closed breaker for the provider called `name`.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure_at: None,
            }),
        }
    }

    /// Name of the guarded provider.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `operation` if the circuit admits it and record its outcome.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::CircuitOpen`] without invoking `operation`
    /// while the circuit is open, otherwise whatever `operation` returns.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !self.can_execute() {
            return Err(SearchError::CircuitOpen(self.name.clone()));
        }

        let result = operation().await;
        match result {
            Ok(_) => self.record_success(),
            Err(_) => self.record_failure(),
        }
        result
    }

    /// Decide whether a call may proceed.
    ///
    /// - [`CircuitState::Closed`] and [`CircuitState::HalfOpen`]: always `true`
    /// - [`CircuitState::Open`]: `true` only once more than `cooldown` has passed
    ///   since the last failure, which moves the breaker to HalfOpen
    pub fn can_execute(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let cooled_down = inner
                    .last_failure_at
                    .is_none_or(|at| at.elapsed() > self.config.cooldown);
                if cooled_down {
                    inner.state = CircuitState::HalfOpen;
                    inner.success_count = 0;
                    tracing::info!(provider = %self.name, "circuit half-open, probing provider");
                }
                cooled_down
            }
        }
    }

    /// Record a successful call.
    ///
    /// Closes a half-open circuit and resets the failure count; in the
    /// closed state only the failure count is reset.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.success_count = inner.success_count.saturating_add(1);
                inner.state = CircuitState::Closed;
                inner.failure_count = 0;
                tracing::info!(provider = %self.name, "circuit closed, provider recovered");
            }
            CircuitState::Closed => inner.failure_count = 0,
            // Admitted before the circuit tripped; nothing to restore.
            CircuitState::Open => {}
        }
    }

    /// Record a failed call.
    ///
    /// Any failure re-opens a half-open circuit; in the closed state the
    /// circuit opens once the failure count reaches the threshold.
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure_at = Some(Instant::now());

        let trips = match inner.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => inner.failure_count >= self.config.failure_threshold,
            CircuitState::Open => false,
        };
        if trips {
            inner.state = CircuitState::Open;
            tracing::warn!(
                provider = %self.name,
                failures = inner.failure_count,
                cooldown_secs = self.config.cooldown.as_secs(),
                "circuit opened"
            );
        }
    }

    /// Current circuit state.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Full breaker state, copied under the lock.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            last_failure_at: inner.last_failure_at,
            failure_threshold: self.config.failure_threshold,
            cooldown: self.config.cooldown,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn make_breaker(threshold: u32, cooldown: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            "videos",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                cooldown,
            },
        )
    }

    /// Wait long enough for a zero cooldown to be strictly exceeded.
    fn pass_zero_cooldown() {
        std::thread::sleep(Duration::from_millis(2));
    }

    #[test]
    fn initial_state_is_closed() {
        let breaker = make_breaker(3, Duration::from_secs(60));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.can_execute());
    }

    #[test]
    fn stays_closed_below_threshold() {
        let breaker = make_breaker(3, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.snapshot().failure_count, 2);
    }

    #[test]
    fn trips_to_open_at_threshold() {
        let breaker = make_breaker(3, Duration::from_secs(60));
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn open_blocks_attempts_during_cooldown() {
        let breaker = make_breaker(3, Duration::from_secs(600));
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert!(!breaker.can_execute());
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn open_transitions_to_half_open_after_cooldown() {
        let breaker = make_breaker(3, Duration::ZERO);
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        pass_zero_cooldown();
        assert!(breaker.can_execute());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert_eq!(breaker.snapshot().success_count, 0);
    }

    #[test]
    fn half_open_success_restores_closed() {
        let breaker = make_breaker(3, Duration::ZERO);
        for _ in 0..3 {
            breaker.record_failure();
        }
        pass_zero_cooldown();
        assert!(breaker.can_execute());
        breaker.record_success();

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.failure_count, 0);
        assert_eq!(snapshot.success_count, 1);
    }

    #[test]
    fn half_open_failure_retrips() {
        let breaker = make_breaker(1, Duration::ZERO);
        breaker.record_failure();
        pass_zero_cooldown();
        assert!(breaker.can_execute());
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn success_resets_consecutive_failures() {
        let breaker = make_breaker(5, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.failure_count, 0);
        assert_eq!(snapshot.state, CircuitState::Closed);
    }

    #[test]
    fn rapid_success_failure_alternation_never_trips() {
        let breaker = make_breaker(3, Duration::from_secs(60));
        for _ in 0..10 {
            breaker.record_failure();
            breaker.record_success();
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn stale_success_does_not_close_open_circuit() {
        let breaker = make_breaker(1, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn execute_rejects_without_invoking_operation() {
        let breaker = make_breaker(2, Duration::from_secs(600));
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let result: Result<()> = breaker
                .execute(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(SearchError::Provider("boom".into()))
                })
                .await;
            assert!(matches!(result, Err(SearchError::Provider(_))));
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let result: Result<()> = breaker
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(SearchError::CircuitOpen(ref name)) if name == "videos"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn execute_probe_after_cooldown_closes_circuit() {
        let breaker = make_breaker(1, Duration::ZERO);
        let _: Result<()> = breaker
            .execute(|| async { Err(SearchError::Timeout("slow".into())) })
            .await;
        assert_eq!(breaker.state(), CircuitState::Open);

        pass_zero_cooldown();
        let value = breaker.execute(|| async { Ok(42) }).await;
        assert_eq!(value.ok(), Some(42));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.snapshot().failure_count, 0);
    }

    #[test]
    fn concurrent_failures_are_all_counted() {
        let breaker = Arc::new(make_breaker(1000, Duration::from_secs(60)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let b = Arc::clone(&breaker);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        b.record_failure();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread join");
        }
        assert_eq!(breaker.snapshot().failure_count, 400);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn default_config_values() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.cooldown, Duration::from_secs(30));
    }

    #[test]
    fn circuit_state_display() {
        assert_eq!(CircuitState::Closed.to_string(), "closed");
        assert_eq!(CircuitState::Open.to_string(), "open");
        assert_eq!(CircuitState::HalfOpen.to_string(), "half-open");
    }
}
