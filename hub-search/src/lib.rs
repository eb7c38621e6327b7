//! # hub-search
//!
//! Aggregation engine for content-hub.
//!
//! This crate merges content from several independent providers into one
//! ranked, filtered and paginated result set. It owns the concurrency and
//! failure-isolation policy; the wire formats of individual providers, the
//! durable store and the HTTP surface live in the service crate and plug in
//! through [`ProviderAdapter`], [`ContentStore`] and [`ResultCache`].
//!
//! ## Design
//!
//! - Each provider sits behind its own [`CircuitBreaker`]
//! - Providers are queried concurrently with a per-call timeout
//! - A failed provider degrades to previously stored content
//! - Fresh records are persisted by a background worker, never on the
//!   response path
//! - Finished pages are cached with a TTL
//!
//! ## Security
//!
//! - Search queries are logged only at debug level
//! - Raw provider payloads are never serialised into responses

pub mod adapter;
pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod manager;
pub mod orchestrator;
pub mod store;
pub mod types;

pub use adapter::{GuardedProvider, PaginatedAdapter, ProviderAdapter};
pub use cache::{cache_key, MemoryCache, ResultCache};
pub use circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use config::AggregatorConfig;
pub use error::{Result, SearchError};
pub use manager::ProviderManager;
pub use orchestrator::scoring::{calculate_score, calculate_score_at, ScoreBreakdown};
pub use orchestrator::service::AggregationService;
pub use store::{ContentStore, InMemoryStore};
pub use types::{
    ContentKind, ContentRecord, PaginationInfo, ProviderContent, ProviderOutcome, ProviderPage,
    SearchParams, SearchResult, SortMode,
};
