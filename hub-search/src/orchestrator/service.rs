//! The aggregation pipeline.
//!
//! ```text
//! cache lookup ─hit─► return
//!      │ miss
//!      ▼
//! fan-out (per-provider timeout, overall deadline, caller cancellation)
//!      │
//!      ├─ provider ok     ─► normalise + score ─► persistence queue
//!      └─ provider failed ─► store fallback
//!      ▼
//! filter ─► sort ─► paginate ─► cache store ─► return
//! ```

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::{cache_key, ResultCache};
use crate::config::AggregatorConfig;
use crate::error::Result;
use crate::manager::ProviderManager;
use crate::orchestrator::filter::{apply_filters, sort_records};
use crate::orchestrator::paginate::paginate;
use crate::orchestrator::persist::PersistQueue;
use crate::orchestrator::scoring::calculate_score;
use crate::store::ContentStore;
use crate::types::{ContentRecord, ProviderContent, ProviderOutcome, SearchParams, SearchResult};

/// Runs searches across every registered provider.
pub struct AggregationService {
    manager: ProviderManager,
    store: Arc<dyn ContentStore>,
    cache: Arc<dyn ResultCache>,
    persist: PersistQueue,
    persist_worker: JoinHandle<()>,
    config: AggregatorConfig,
}

impl AggregationService {
    /// Build the service and spawn its persistence worker.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`](crate::SearchError::Config) if `config`
    /// is invalid.
    pub fn new(
        manager: ProviderManager,
        store: Arc<dyn ContentStore>,
        cache: Arc<dyn ResultCache>,
        config: AggregatorConfig,
    ) -> Result<Self> {
        config.validate()?;
        let (persist, persist_worker) = PersistQueue::spawn(Arc::clone(&store), config.persist_queue_size);
        Ok(Self {
            manager,
            store,
            cache,
            persist,
            persist_worker,
            config,
        })
    }

    pub fn manager(&self) -> &ProviderManager {
        &self.manager
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Search every provider and return one ranked page.
    ///
    /// Provider failures degrade to stored content and cache failures are
    /// logged; neither fails the call.
    pub async fn search(&self, params: SearchParams) -> Result<SearchResult> {
        self.search_with_cancel(params, &CancellationToken::new()).await
    }

    /// Like [`search`](Self::search), but stops waiting on providers once
    /// `cancel` fires and ranks whatever arrived by then.
    pub async fn search_with_cancel(
        &self,
        params: SearchParams,
        cancel: &CancellationToken,
    ) -> Result<SearchResult> {
        let params = params.normalized();
        let key = cache_key(&params);

        match self.cache.get(&key).await {
            Ok(Some(hit)) => {
                tracing::debug!(cache_key = %key, "cache hit");
                return Ok(hit);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(cache_key = %key, error = %e, "cache read failed, treating as miss"),
        }

        tracing::debug!(
            query = %params.query,
            page = params.page,
            per_page = params.per_page,
            "fetching from providers"
        );

        // Every provider contributes enough items to fill the requested
        // page of the merged ranking.
        let window = params.page.saturating_mul(params.per_page);
        let outcomes = self.fan_out(&params.query, window, cancel).await;

        let mut merged = Vec::new();
        for (provider, outcome) in self.in_registration_order(outcomes) {
            match outcome.map(|o| o.result) {
                Some(Ok(items)) => {
                    let records = normalize(&provider, items);
                    self.persist.enqueue(&provider, records.clone());
                    merged.extend(records);
                }
                Some(Err(e)) => {
                    tracing::warn!(provider = %provider, error = %e, "provider failed, falling back to store");
                    merged.extend(self.fallback(&provider, &params.query, window).await);
                }
                None if cancel.is_cancelled() => {
                    tracing::debug!(provider = %provider, "search cancelled before provider answered");
                }
                None => {
                    tracing::warn!(provider = %provider, "provider missed the search deadline, falling back to store");
                    merged.extend(self.fallback(&provider, &params.query, window).await);
                }
            }
        }

        let filtered = apply_filters(merged, &params.content_kinds, &params.tags);
        let sorted = sort_records(filtered, params.sort);
        let result = paginate(sorted, params.page, params.per_page);

        if let Err(e) = self.cache.set(&key, &result, self.config.cache_ttl).await {
            tracing::warn!(cache_key = %key, error = %e, "failed to cache result");
        }

        Ok(result)
    }

    /// Fan out under the overall deadline. Outcomes gathered before the
    /// deadline or caller cancellation are kept.
    async fn fan_out(&self, query: &str, window: u32, cancel: &CancellationToken) -> Vec<ProviderOutcome> {
        let fan_out_cancel = cancel.child_token();
        let fan_out = self
            .manager
            .search_all_with_pagination(query, 1, window, &fan_out_cancel);
        tokio::pin!(fan_out);

        tokio::select! {
            outcomes = &mut fan_out => outcomes,
            () = tokio::time::sleep(self.config.search_deadline) => {
                fan_out_cancel.cancel();
                fan_out.await
            }
        }
    }

    /// Pair every registered provider with its outcome, if one arrived.
    fn in_registration_order(
        &self,
        mut outcomes: Vec<ProviderOutcome>,
    ) -> Vec<(String, Option<ProviderOutcome>)> {
        self.manager
            .providers()
            .iter()
            .map(|provider| {
                let name = provider.name().to_owned();
                let outcome = outcomes
                    .iter()
                    .position(|o| o.provider == name)
                    .map(|i| outcomes.remove(i));
                (name, outcome)
            })
            .collect()
    }

    async fn fallback(&self, provider: &str, query: &str, window: u32) -> Vec<ContentRecord> {
        match self.store.search_by_provider(provider, query, 1, window).await {
            Ok(records) => {
                tracing::info!(provider, count = records.len(), "served from store");
                records
            }
            Err(e) => {
                tracing::error!(provider, error = %e, "store fallback failed");
                Vec::new()
            }
        }
    }

    /// Stop accepting persistence jobs and wait for the backlog to drain.
    pub async fn shutdown(self) {
        let Self {
            persist, persist_worker, ..
        } = self;
        drop(persist);
        if let Err(e) = persist_worker.await {
            tracing::error!(error = %e, "persistence worker panicked");
        }
    }
}

/// Turn provider items into scored records, skipping invalid ones.
fn normalize(provider: &str, items: Vec<ProviderContent>) -> Vec<ContentRecord> {
    items
        .into_iter()
        .filter_map(|content| match content.validate() {
            Ok(()) => {
                let mut record = ContentRecord::from_provider(content, provider, 0.0);
                record.score = calculate_score(&record);
                Some(record)
            }
            Err(e) => {
                tracing::warn!(
                    provider,
                    external_id = %content.external_id,
                    error = %e,
                    "skipping invalid provider item"
                );
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{GuardedProvider, ProviderAdapter};
    use crate::cache::MemoryCache;
    use crate::circuit_breaker::CircuitBreakerConfig;
    use crate::error::SearchError;
    use crate::store::InMemoryStore;
    use crate::types::{ContentKind, SortMode};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use uuid::Uuid;

    struct FixedAdapter {
        name: &'static str,
        items: Vec<ProviderContent>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ProviderAdapter for FixedAdapter {
        fn name(&self) -> &str {
            self.name
        }

        async fn search(&self, _query: &str) -> Result<Vec<ProviderContent>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.items.clone())
        }

        async fn health_check(&self) -> Result<()> {
            Ok(())
        }
    }

    fn video(id: &str, views: u64) -> ProviderContent {
        let mut c = ProviderContent::new(id, format!("Video {id}"), ContentKind::Video, Utc::now());
        c.views = views;
        c
    }

    fn service(items: Vec<ProviderContent>, calls: Arc<AtomicUsize>) -> AggregationService {
        let mut manager = ProviderManager::new(Duration::from_secs(1));
        manager.register(GuardedProvider::new(
            Arc::new(FixedAdapter {
                name: "videos",
                items,
                calls,
            }),
            CircuitBreakerConfig::default(),
        ));
        AggregationService::new(
            manager,
            Arc::new(InMemoryStore::new()),
            Arc::new(MemoryCache::new(16)),
            AggregatorConfig::default(),
        )
        .expect("service")
    }

    #[tokio::test]
    async fn results_are_scored_and_ranked() {
        let calls = Arc::new(AtomicUsize::new(0));
        let service = service(vec![video("low", 10), video("high", 90_000)], calls);

        let result = service.search(SearchParams::new("video")).await.expect("search");
        assert_eq!(result.total, 2);
        assert_eq!(result.items[0].external_id, "high");
        assert!(result.items[0].score > result.items[1].score);
        assert!(result.items.iter().all(|r| r.provider == "videos"));
    }

    #[tokio::test]
    async fn invalid_items_are_skipped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let service = service(vec![video("ok", 1), video("", 1)], calls);
        let result = service.search(SearchParams::new("q")).await.expect("search");
        assert_eq!(result.total, 1);
    }

    #[tokio::test]
    async fn second_identical_search_is_served_from_cache() {
        let calls = Arc::new(AtomicUsize::new(0));
        let service = service(vec![video("a", 1)], calls.clone());

        let first = service.search(SearchParams::new("q")).await.expect("search");
        let second = service.search(SearchParams::new("q")).await.expect("search");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);

        service
            .search(SearchParams::new("q").with_sort(SortMode::Popularity))
            .await
            .expect("search");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fresh_records_are_persisted_in_background() {
        let calls = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(InMemoryStore::new());
        let mut manager = ProviderManager::new(Duration::from_secs(1));
        manager.register(GuardedProvider::new(
            Arc::new(FixedAdapter {
                name: "videos",
                items: vec![video("a", 1), video("b", 2)],
                calls,
            }),
            CircuitBreakerConfig::default(),
        ));
        let service = AggregationService::new(
            manager,
            store.clone(),
            Arc::new(MemoryCache::new(16)),
            AggregatorConfig::default(),
        )
        .expect("service");

        service.search(SearchParams::new("q")).await.expect("search");
        service.shutdown().await;
        assert_eq!(store.len(), 2);
    }

    struct BrokenCache;

    #[async_trait]
    impl ResultCache for BrokenCache {
        async fn get(&self, _key: &str) -> Result<Option<SearchResult>> {
            Err(SearchError::Cache("connection refused".into()))
        }

        async fn set(&self, _key: &str, _value: &SearchResult, _ttl: Duration) -> Result<()> {
            Err(SearchError::Cache("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn cache_failures_are_absorbed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut manager = ProviderManager::new(Duration::from_secs(1));
        manager.register(GuardedProvider::new(
            Arc::new(FixedAdapter {
                name: "videos",
                items: vec![video("a", 1)],
                calls,
            }),
            CircuitBreakerConfig::default(),
        ));
        let service = AggregationService::new(
            manager,
            Arc::new(InMemoryStore::new()),
            Arc::new(BrokenCache),
            AggregatorConfig::default(),
        )
        .expect("service");

        let result = service.search(SearchParams::new("q")).await.expect("search");
        assert_eq!(result.total, 1);
    }

    struct BrokenStore;

    #[async_trait]
    impl ContentStore for BrokenStore {
        async fn search(&self, _params: &SearchParams) -> Result<(Vec<ContentRecord>, u64)> {
            Err(SearchError::Persistence("db down".into()))
        }

        async fn search_by_provider(&self, _: &str, _: &str, _: u32, _: u32) -> Result<Vec<ContentRecord>> {
            Err(SearchError::Persistence("db down".into()))
        }

        async fn upsert(&self, _record: &ContentRecord) -> Result<()> {
            Err(SearchError::Persistence("db down".into()))
        }

        async fn get_by_id(&self, _id: Uuid) -> Result<Option<ContentRecord>> {
            Err(SearchError::Persistence("db down".into()))
        }
    }

    struct DownAdapter;

    #[async_trait]
    impl ProviderAdapter for DownAdapter {
        fn name(&self) -> &str {
            "down"
        }

        async fn search(&self, _query: &str) -> Result<Vec<ProviderContent>> {
            Err(SearchError::Provider("502".into()))
        }

        async fn health_check(&self) -> Result<()> {
            Err(SearchError::Provider("502".into()))
        }
    }

    #[tokio::test]
    async fn failed_fallback_contributes_nothing() {
        let mut manager = ProviderManager::new(Duration::from_secs(1));
        manager.register(GuardedProvider::new(Arc::new(DownAdapter), CircuitBreakerConfig::default()));
        let service = AggregationService::new(
            manager,
            Arc::new(BrokenStore),
            Arc::new(MemoryCache::new(16)),
            AggregatorConfig::default(),
        )
        .expect("service");

        let result = service.search(SearchParams::new("q")).await.expect("search");
        assert_eq!(result.total, 0);
        assert_eq!(result.total_pages, 0);
        assert!(result.items.is_empty());
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let config = AggregatorConfig {
            persist_queue_size: 0,
            ..Default::default()
        };
        let err = AggregationService::new(
            ProviderManager::new(Duration::from_secs(1)),
            Arc::new(InMemoryStore::new()),
            Arc::new(MemoryCache::new(1)),
            config,
        )
        .err()
        .expect("config error");
        assert!(matches!(err, SearchError::Config(_)));
    }
}
