//! Error types for the content-hub service.

use hub_search::SearchError;

/// Top-level error type for service startup and wiring.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// Configuration could not be read, parsed or validated.
    #[error("config error: {0}")]
    Config(String),

    /// The content store could not be opened or queried.
    #[error("store error: {0}")]
    Store(String),

    /// A configured provider could not be constructed.
    #[error("provider error: {0}")]
    Provider(String),

    /// The HTTP server failed to bind or serve.
    #[error("server error: {0}")]
    Server(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error surfaced by the aggregation engine.
    #[error(transparent)]
    Search(#[from] SearchError),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, HubError>;
