//! Provider adapter contract and the circuit-breaker wrapper around it.
//!
//! Each content provider (a JSON video feed, an XML article feed, ...)
//! implements [`ProviderAdapter`] to expose a uniform search interface over
//! its own wire format. Adapters that can page server-side additionally
//! implement [`PaginatedAdapter`] and advertise it via
//! [`ProviderAdapter::as_paginated`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use crate::error::{Result, SearchError};
use crate::types::{ProviderContent, ProviderPage};

/// A pluggable content provider.
///
/// Implementors fetch from one upstream and normalise its payload into
/// [`ProviderContent`]. All implementations must be `Send + Sync` so the
/// manager can query them concurrently.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Name used for logging, fallback lookups and health reports.
    fn name(&self) -> &str;

    /// Search the provider, returning items in provider order.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Provider`] if the request fails or the payload
    /// cannot be decoded.
    async fn search(&self, query: &str) -> Result<Vec<ProviderContent>>;

    /// Check that the provider is reachable.
    async fn health_check(&self) -> Result<()>;

    /// The paginated capability, if this provider has one.
    fn as_paginated(&self) -> Option<&dyn PaginatedAdapter> {
        None
    }
}

/// Optional capability: search returning a single page.
#[async_trait]
pub trait PaginatedAdapter: Send + Sync {
    /// Search and return page `page` (1-based) of `per_page` items.
    async fn search_with_pagination(
        &self,
        query: &str,
        page: u32,
        per_page: u32,
    ) -> Result<ProviderPage>;
}

/// A provider adapter guarded by its own [`CircuitBreaker`].
pub struct GuardedProvider {
    adapter: Arc<dyn ProviderAdapter>,
    breaker: CircuitBreaker,
}

impl GuardedProvider {
    /// Wrap `adapter` in a fresh closed breaker named after the adapter.
    pub fn new(adapter: Arc<dyn ProviderAdapter>, config: CircuitBreakerConfig) -> Self {
        let breaker = CircuitBreaker::new(adapter.name(), config);
        Self { adapter, breaker }
    }

    pub fn name(&self) -> &str {
        self.adapter.name()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn supports_pagination(&self) -> bool {
        self.adapter.as_paginated().is_some()
    }

    /// Plain search through the breaker, bounded by `timeout`.
    ///
    /// A timeout is recorded as a breaker failure.
    pub async fn search(&self, query: &str, timeout: Duration) -> Result<Vec<ProviderContent>> {
        self.breaker
            .execute(|| bounded(self.name(), timeout, self.adapter.search(query)))
            .await
    }

    /// Fetch one page through the breaker, bounded by `timeout`.
    ///
    /// Uses the adapter's paginated capability when present; otherwise runs
    /// a plain search and slices the requested page out locally.
    pub async fn search_page(
        &self,
        query: &str,
        page: u32,
        per_page: u32,
        timeout: Duration,
    ) -> Result<Vec<ProviderContent>> {
        let call = async {
            match self.adapter.as_paginated() {
                Some(paginated) => paginated
                    .search_with_pagination(query, page, per_page)
                    .await
                    .map(|page| page.items),
                None => {
                    let all = self.adapter.search(query).await?;
                    Ok(ProviderPage::from_full(all, page, per_page).items)
                }
            }
        };
        self.breaker
            .execute(|| bounded(self.name(), timeout, call))
            .await
    }

    /// Health check; an open circuit reports unhealthy without calling out.
    pub async fn health_check(&self) -> Result<()> {
        if self.breaker.state() == CircuitState::Open {
            return Err(SearchError::CircuitOpen(self.name().to_owned()));
        }
        self.adapter.health_check().await
    }
}

async fn bounded<T, F>(name: &str, timeout: Duration, call: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(SearchError::Timeout(format!(
            "{name} did not respond within {}ms",
            timeout.as_millis()
        ))),
    }
}
