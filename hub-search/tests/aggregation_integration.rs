//! Integration tests for the aggregation pipeline.
//!
//! These tests wire real managers, breakers, caches and stores around
//! in-process adapters (no network calls) and exercise the full
//! fan-out → fallback → filter → sort → paginate → cache path.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as Age, Utc};
use hub_search::{
    AggregationService, AggregatorConfig, CircuitBreakerConfig, CircuitState, ContentKind,
    ContentRecord, ContentStore, GuardedProvider, InMemoryStore, MemoryCache, ProviderAdapter,
    ProviderContent, ProviderManager, Result, SearchError, SearchParams, SortMode,
};
use tokio_util::sync::CancellationToken;

struct MockAdapter {
    name: &'static str,
    items: Vec<ProviderContent>,
    fail: bool,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl MockAdapter {
    fn returning(name: &'static str, items: Vec<ProviderContent>) -> Self {
        Self {
            name,
            items,
            fail: false,
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn failing(name: &'static str) -> Self {
        Self {
            fail: true,
            ..Self::returning(name, Vec::new())
        }
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn name(&self) -> &str {
        self.name
    }

    async fn search(&self, _query: &str) -> Result<Vec<ProviderContent>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(SearchError::Provider(format!("{} returned status 500", self.name)));
        }
        Ok(self.items.clone())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

fn video(id: &str, views: u64, likes: u64) -> ProviderContent {
    let mut c = ProviderContent::new(id, format!("Video {id}"), ContentKind::Video, Utc::now() - Age::days(2));
    c.views = views;
    c.likes = likes;
    c
}

fn text(id: &str, reading_time: u64, reactions: u64, tags: &[&str]) -> ProviderContent {
    let mut c = ProviderContent::new(id, format!("Article {id}"), ContentKind::Text, Utc::now() - Age::days(40));
    c.reading_time = reading_time;
    c.reactions = reactions;
    c.tags = tags.iter().map(|t| (*t).to_owned()).collect();
    c
}

fn stored(provider: &str, id: &str, score: f64) -> ContentRecord {
    let content = ProviderContent::new(id, format!("Stored {id}"), ContentKind::Video, Utc::now());
    ContentRecord::from_provider(content, provider, score)
}

fn build(
    adapters: Vec<MockAdapter>,
    store: Arc<InMemoryStore>,
    config: AggregatorConfig,
) -> AggregationService {
    let mut manager = ProviderManager::new(config.provider_timeout);
    for adapter in adapters {
        manager.register(GuardedProvider::new(Arc::new(adapter), config.breaker.clone()));
    }
    AggregationService::new(manager, store, Arc::new(MemoryCache::new(100)), config).unwrap()
}

#[tokio::test]
async fn failed_provider_falls_back_to_store() {
    let store = Arc::new(InMemoryStore::new());
    store.upsert(&stored("b", "b1", 4.0)).await.unwrap();
    store.upsert(&stored("b", "b2", 2.0)).await.unwrap();
    // Different provider, must not leak into b's fallback.
    store.upsert(&stored("c", "c1", 9.0)).await.unwrap();

    let a = MockAdapter::returning("a", vec![video("a1", 1_000, 10), video("a2", 5_000, 50), video("a3", 100, 1)]);
    let service = build(vec![a, MockAdapter::failing("b")], store, AggregatorConfig::default());

    let result = service.search(SearchParams::new("")).await.unwrap();
    assert_eq!(result.total, 5);
    assert_eq!(result.items.len(), 5);
    assert_eq!(result.total_pages, 1);

    let from_b: Vec<&ContentRecord> = result.items.iter().filter(|r| r.provider == "b").collect();
    assert_eq!(from_b.len(), 2);
    // Stored records keep their stored score.
    assert!(from_b.iter().any(|r| r.external_id == "b1" && (r.score - 4.0).abs() < f64::EPSILON));

    let scores: Vec<f64> = result.items.iter().map(|r| r.score).collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]), "{scores:?}");
}

#[tokio::test]
async fn paginates_the_merged_ranking() {
    let items: Vec<ProviderContent> = (0..45).map(|i| video(&format!("v{i:02}"), i * 100, 0)).collect();
    let service = build(
        vec![MockAdapter::returning("videos", items)],
        Arc::new(InMemoryStore::new()),
        AggregatorConfig::default(),
    );

    let first = service
        .search(SearchParams::new("").with_page(1, 20))
        .await
        .unwrap();
    assert_eq!(first.items.len(), 20);
    assert_eq!(first.page, 1);

    let third = service
        .search(SearchParams::new("").with_page(3, 20))
        .await
        .unwrap();
    assert_eq!(third.total, 45);
    assert_eq!(third.total_pages, 3);
    assert_eq!(third.items.len(), 5);
    assert_eq!(third.items[4].external_id, "v00");

    let fourth = service
        .search(SearchParams::new("").with_page(4, 20))
        .await
        .unwrap();
    assert!(fourth.items.is_empty());
    assert_eq!(fourth.total, 45);
}

#[tokio::test]
async fn kind_and_tag_filters_apply_across_providers() {
    let videos = MockAdapter::returning("videos", vec![video("v1", 900_000, 9_000), video("v2", 10, 1)]);
    let articles = MockAdapter::returning(
        "articles",
        vec![text("t1", 5, 10, &["Rust"]), text("t2", 3, 1, &["go"])],
    );
    let service = build(vec![videos, articles], Arc::new(InMemoryStore::new()), AggregatorConfig::default());

    let only_video = service
        .search(SearchParams::new("").with_kinds([ContentKind::Video]))
        .await
        .unwrap();
    assert_eq!(only_video.total, 2);
    assert!(only_video.items.iter().all(|r| r.kind == ContentKind::Video));

    let rust = service
        .search(SearchParams::new("").with_tags(["rust"]))
        .await
        .unwrap();
    assert_eq!(rust.total, 1);
    assert_eq!(rust.items[0].external_id, "t1");
}

#[tokio::test]
async fn popularity_sort_orders_same_kind_by_metric() {
    // v_low has the better score (fresh likes ratio) but fewer views.
    let mut v_low = video("v_low", 100, 100);
    v_low.published_at = Utc::now();
    let v_high = video("v_high", 200, 0);
    let service = build(
        vec![MockAdapter::returning("videos", vec![v_low, v_high])],
        Arc::new(InMemoryStore::new()),
        AggregatorConfig::default(),
    );

    let by_score = service.search(SearchParams::new("")).await.unwrap();
    assert_eq!(by_score.items[0].external_id, "v_low");

    let by_views = service
        .search(SearchParams::new("").with_sort(SortMode::Popularity))
        .await
        .unwrap();
    assert_eq!(by_views.items[0].external_id, "v_high");
}

#[tokio::test]
async fn repeated_search_hits_cache() {
    let adapter = MockAdapter::returning("videos", vec![video("v1", 1, 1)]);
    let calls = Arc::clone(&adapter.calls);
    let service = build(vec![adapter], Arc::new(InMemoryStore::new()), AggregatorConfig::default());

    let params = SearchParams::new("rust").with_tags(["async"]);
    service.search(params.clone()).await.unwrap();
    service.search(params.clone()).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    service.search(params.with_page(2, 20)).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn open_circuit_skips_provider_and_serves_store() {
    let store = Arc::new(InMemoryStore::new());
    store.upsert(&stored("flaky", "f1", 1.0)).await.unwrap();

    let adapter = MockAdapter::failing("flaky");
    let calls = Arc::clone(&adapter.calls);
    let config = AggregatorConfig {
        breaker: CircuitBreakerConfig {
            failure_threshold: 2,
            cooldown: Duration::from_secs(600),
        },
        ..Default::default()
    };
    let service = build(vec![adapter], store, config);

    for query in ["one", "two", "three", "four"] {
        let result = service.search(SearchParams::new(query)).await.unwrap();
        // Fallback matches titles, and "Stored f1" contains none of these.
        assert_eq!(result.total, 0);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        service.manager().breaker_states(),
        vec![("flaky".to_owned(), CircuitState::Open)]
    );

    let fallback = service.search(SearchParams::new("stored")).await.unwrap();
    assert_eq!(fallback.total, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn cancellation_returns_partial_results() {
    let store = Arc::new(InMemoryStore::new());
    store.upsert(&stored("slow", "s1", 1.0)).await.unwrap();

    let fast = MockAdapter::returning("fast", vec![video("f1", 10, 1), video("f2", 20, 1)]);
    let mut slow = MockAdapter::returning("slow", vec![video("s9", 10, 1)]);
    slow.delay = Duration::from_secs(8);
    let config = AggregatorConfig {
        provider_timeout: Duration::from_secs(9),
        search_deadline: Duration::from_secs(9),
        ..Default::default()
    };
    let service = build(vec![fast, slow], store, config);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let result = service
        .search_with_cancel(SearchParams::new(""), &cancel)
        .await
        .unwrap();
    assert_eq!(result.total, 2);
    assert!(result.items.iter().all(|r| r.provider == "fast"));
}

#[tokio::test(start_paused = true)]
async fn timed_out_provider_falls_back_to_store() {
    let store = Arc::new(InMemoryStore::new());
    store.upsert(&stored("slow", "s1", 1.0)).await.unwrap();

    let mut slow = MockAdapter::returning("slow", vec![video("s9", 10, 1)]);
    slow.delay = Duration::from_secs(60);
    let config = AggregatorConfig {
        provider_timeout: Duration::from_secs(1),
        search_deadline: Duration::from_secs(2),
        ..Default::default()
    };
    let service = build(vec![slow], store, config);

    let result = service.search(SearchParams::new("")).await.unwrap();
    assert_eq!(result.total, 1);
    assert_eq!(result.items[0].external_id, "s1");
}

#[tokio::test]
async fn fresh_results_are_persisted_after_shutdown() {
    let store = Arc::new(InMemoryStore::new());
    let service = build(
        vec![MockAdapter::returning("videos", vec![video("v1", 1, 1), video("v2", 2, 1)])],
        Arc::clone(&store),
        AggregatorConfig::default(),
    );

    service.search(SearchParams::new("")).await.unwrap();
    service.shutdown().await;

    assert_eq!(store.len(), 2);
    let (items, total) = store.search(&SearchParams::new("video")).await.unwrap();
    assert_eq!(total, 2);
    assert!(items.iter().all(|r| r.provider == "videos"));
}
