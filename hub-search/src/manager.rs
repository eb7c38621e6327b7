//! Provider registry and concurrent fan-out.
//!
//! The manager owns every [`GuardedProvider`] and queries them in parallel,
//! one tokio task per provider. Each call is bounded by the per-provider
//! timeout; the caller may additionally cut the whole fan-out short through a
//! [`CancellationToken`], in which case the outcomes gathered so far are
//! returned and the remaining tasks are aborted.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::adapter::GuardedProvider;
use crate::circuit_breaker::CircuitState;
use crate::error::SearchError;
use crate::types::ProviderOutcome;

/// Registry of guarded providers plus the fan-out over them.
pub struct ProviderManager {
    providers: Vec<Arc<GuardedProvider>>,
    timeout: Duration,
}

impl ProviderManager {
    /// Empty manager whose calls are each bounded by `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            providers: Vec::new(),
            timeout,
        }
    }

    /// Append a provider. Names are not de-duplicated.
    pub fn register(&mut self, provider: GuardedProvider) {
        tracing::info!(provider = provider.name(), "registered provider");
        self.providers.push(Arc::new(provider));
    }

    pub fn providers(&self) -> &[Arc<GuardedProvider>] {
        &self.providers
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Current breaker state of every provider, in registration order.
    pub fn breaker_states(&self) -> Vec<(String, CircuitState)> {
        self.providers
            .iter()
            .map(|p| (p.name().to_owned(), p.breaker().state()))
            .collect()
    }

    /// Fetch one page from every provider concurrently.
    ///
    /// Returns one outcome per provider that finished before `cancel` fired,
    /// in completion order.
    pub async fn search_all_with_pagination(
        &self,
        query: &str,
        page: u32,
        per_page: u32,
        cancel: &CancellationToken,
    ) -> Vec<ProviderOutcome> {
        let mut tasks = JoinSet::new();
        for provider in &self.providers {
            let provider = Arc::clone(provider);
            let query = query.to_owned();
            let timeout = self.timeout;
            tasks.spawn(async move {
                let started = Instant::now();
                let result = provider.search_page(&query, page, per_page, timeout).await;
                ProviderOutcome {
                    provider: provider.name().to_owned(),
                    result,
                    elapsed: started.elapsed(),
                }
            });
        }
        self.collect(tasks, cancel).await
    }

    /// Run a plain, unpaginated search on every provider concurrently.
    pub async fn search_all(&self, query: &str, cancel: &CancellationToken) -> Vec<ProviderOutcome> {
        let mut tasks = JoinSet::new();
        for provider in &self.providers {
            let provider = Arc::clone(provider);
            let query = query.to_owned();
            let timeout = self.timeout;
            tasks.spawn(async move {
                let started = Instant::now();
                let result = provider.search(&query, timeout).await;
                ProviderOutcome {
                    provider: provider.name().to_owned(),
                    result,
                    elapsed: started.elapsed(),
                }
            });
        }
        self.collect(tasks, cancel).await
    }

    async fn collect(
        &self,
        mut tasks: JoinSet<ProviderOutcome>,
        cancel: &CancellationToken,
    ) -> Vec<ProviderOutcome> {
        let mut outcomes = Vec::with_capacity(self.providers.len());
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::warn!(
                        received = outcomes.len(),
                        expected = self.providers.len(),
                        "provider fan-out cancelled, returning partial results"
                    );
                    break;
                }
                joined = tasks.join_next() => match joined {
                    Some(Ok(outcome)) => {
                        match &outcome.result {
                            Ok(items) => tracing::debug!(
                                provider = %outcome.provider,
                                count = items.len(),
                                elapsed_ms = outcome.elapsed.as_millis() as u64,
                                "provider returned"
                            ),
                            Err(e) => tracing::warn!(
                                provider = %outcome.provider,
                                error = %e,
                                "provider search failed"
                            ),
                        }
                        outcomes.push(outcome);
                    }
                    Some(Err(e)) => tracing::error!(error = %e, "provider task did not complete"),
                    None => break,
                },
            }
        }
        // Dropping the set aborts anything still in flight.
        drop(tasks);
        outcomes
    }

    /// Health of every provider, checked one after another.
    pub async fn health_check_all(&self) -> BTreeMap<String, Result<(), SearchError>> {
        let mut report = BTreeMap::new();
        for provider in &self.providers {
            let result = provider.health_check().await;
            if let Err(e) = &result {
                tracing::warn!(provider = provider.name(), error = %e, "provider unhealthy");
            }
            report.insert(provider.name().to_owned(), result);
        }
        report
    }
}
