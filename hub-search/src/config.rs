//! Aggregation engine configuration with sensible defaults.
//!
//! [`AggregatorConfig`] controls provider timeouts, circuit breaking, the
//! overall search deadline, caching and the background persistence queue.

use std::time::Duration;

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::error::SearchError;

/// Configuration for an [`AggregationService`](crate::AggregationService).
///
/// Use [`Default::default()`] for sensible defaults, or construct with
/// field overrides for custom behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorConfig {
    /// Bound on each individual provider call.
    pub provider_timeout: Duration,
    /// Bound on the whole fan-out. Providers still running when it passes
    /// are dropped from the response and fall back to the store.
    pub search_deadline: Duration,
    /// Circuit breaker settings applied to every provider.
    pub breaker: CircuitBreakerConfig,
    /// How long a result page stays cached. Zero disables caching writes.
    pub cache_ttl: Duration,
    /// Capacity of the background persistence queue.
    pub persist_queue_size: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            provider_timeout: Duration::from_secs(5),
            search_deadline: Duration::from_secs(10),
            breaker: CircuitBreakerConfig::default(),
            cache_ttl: Duration::from_secs(300),
            persist_queue_size: 256,
        }
    }
}

impl AggregatorConfig {
    /// Validates this configuration, returning an error if any field is invalid.
    ///
    /// Checks:
    /// - `provider_timeout` must be non-zero
    /// - `search_deadline` must be at least `provider_timeout`
    /// - `breaker.failure_threshold` must be greater than 0
    /// - `persist_queue_size` must be greater than 0
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.provider_timeout.is_zero() {
            return Err(SearchError::Config(
                "provider_timeout must be greater than 0".into(),
            ));
        }
        if self.search_deadline < self.provider_timeout {
            return Err(SearchError::Config(
                "search_deadline must be at least provider_timeout".into(),
            ));
        }
        if self.breaker.failure_threshold == 0 {
            return Err(SearchError::Config(
                "breaker failure_threshold must be greater than 0".into(),
            ));
        }
        if self.persist_queue_size == 0 {
            return Err(SearchError::Config(
                "persist_queue_size must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
