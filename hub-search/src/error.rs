//! Error types for the hub-search crate.
//!
//! All errors carry stable string messages suitable for logs and for
//! mapping onto API error codes. Provider URLs and payloads never appear
//! in these messages.

/// Errors that can occur inside the aggregation engine.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SearchError {
    /// The provider's circuit breaker is open; the call was never made.
    #[error("circuit breaker is open for provider {0}")]
    CircuitOpen(String),

    /// A provider call failed (network, status code or payload decoding).
    #[error("provider error: {0}")]
    Provider(String),

    /// A provider call or the overall fan-out exceeded its time budget.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Reading from or writing to the persistent store failed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The result cache failed for a reason other than a miss.
    #[error("cache error: {0}")]
    Cache(String),

    /// Malformed request parameters, rejected before the pipeline runs.
    #[error("validation error: {0}")]
    Validation(String),

    /// Invalid engine configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Unexpected failure inside the pipeline.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SearchError {
    /// Whether this error isolates a single provider and should trigger the
    /// store fallback rather than failing the request.
    pub fn is_provider_failure(&self) -> bool {
        matches!(
            self,
            Self::CircuitOpen(_) | Self::Provider(_) | Self::Timeout(_)
        )
    }
}

/// Convenience type alias for hub-search results.
pub type Result<T> = std::result::Result<T, SearchError>;
