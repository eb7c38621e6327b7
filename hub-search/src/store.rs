//! Persistent store contract.
//!
//! The aggregation service writes every successfully fetched record here in
//! the background and reads from it when a provider is unavailable. The
//! SQLite implementation lives in the service crate; [`InMemoryStore`] is a
//! lock-protected vector used for embedding and tests.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::Result;
use crate::types::{page_window, ContentRecord, SearchParams, SortMode};

/// Durable storage for normalised records.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Filtered, sorted and paginated search over everything stored.
    ///
    /// Returns the requested page and the total number of matches.
    async fn search(&self, params: &SearchParams) -> Result<(Vec<ContentRecord>, u64)>;

    /// Page `page` of the records from one provider whose title matches `query`.
    async fn search_by_provider(
        &self,
        provider: &str,
        query: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<ContentRecord>>;

    /// Insert or update by `(external_id, provider)`.
    ///
    /// An existing row keeps its id and `created_at`; everything else is
    /// overwritten.
    async fn upsert(&self, record: &ContentRecord) -> Result<()>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<ContentRecord>>;

    /// Cheap liveness probe for readiness checks.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

fn title_matches(record: &ContentRecord, query: &str) -> bool {
    query.is_empty() || record.title.to_lowercase().contains(&query.to_lowercase())
}

/// Vector-backed [`ContentStore`].
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: Mutex<Vec<ContentRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ContentRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ContentStore for InMemoryStore {
    async fn search(&self, params: &SearchParams) -> Result<(Vec<ContentRecord>, u64)> {
        let params = params.clone().normalized();
        let wanted_tags: Vec<String> = params.tags.iter().map(|t| t.to_lowercase()).collect();
        let mut matches: Vec<ContentRecord> = self
            .lock()
            .iter()
            .filter(|r| title_matches(r, &params.query))
            .filter(|r| params.content_kinds.is_empty() || params.content_kinds.contains(&r.kind))
            .filter(|r| wanted_tags.is_empty() || r.has_any_tag(&wanted_tags))
            .cloned()
            .collect();

        match params.sort {
            SortMode::Relevance => matches.sort_by(|a, b| b.score.total_cmp(&a.score)),
            SortMode::Popularity => {
                matches.sort_by_key(|r| std::cmp::Reverse(r.views.saturating_add(r.reactions)))
            }
        }

        let total = matches.len() as u64;
        let window = page_window(matches.len(), params.page, params.per_page);
        Ok((matches.drain(window).collect(), total))
    }

    async fn search_by_provider(
        &self,
        provider: &str,
        query: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<ContentRecord>> {
        let mut matches: Vec<ContentRecord> = self
            .lock()
            .iter()
            .filter(|r| r.provider == provider && title_matches(r, query))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        let window = page_window(matches.len(), page, per_page);
        Ok(matches.drain(window).collect())
    }

    async fn upsert(&self, record: &ContentRecord) -> Result<()> {
        let mut records = self.lock();
        match records
            .iter_mut()
            .find(|r| r.external_id == record.external_id && r.provider == record.provider)
        {
            Some(existing) => {
                let id = existing.id;
                let created_at = existing.created_at;
                *existing = record.clone();
                existing.id = id;
                existing.created_at = created_at;
                existing.updated_at = Utc::now();
            }
            None => records.push(record.clone()),
        }
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<ContentRecord>> {
        Ok(self.lock().iter().find(|r| r.id == id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentKind, ProviderContent};

    fn record(provider: &str, id: &str, title: &str, score: f64) -> ContentRecord {
        let content = ProviderContent::new(id, title, ContentKind::Video, Utc::now());
        ContentRecord::from_provider(content, provider, score)
    }

    #[tokio::test]
    async fn upsert_is_idempotent_on_provider_and_external_id() {
        let store = InMemoryStore::new();
        let first = record("videos", "v1", "Rust basics", 1.0);
        store.upsert(&first).await.expect("insert");

        let mut second = record("videos", "v1", "Rust basics, revised", 2.0);
        second.views = 99;
        store.upsert(&second).await.expect("update");

        assert_eq!(store.len(), 1);
        let stored = store.get_by_id(first.id).await.expect("get").expect("row");
        assert_eq!(stored.title, "Rust basics, revised");
        assert_eq!(stored.views, 99);
        assert_eq!(stored.created_at, first.created_at);

        store
            .upsert(&record("articles", "v1", "Same id, other provider", 1.0))
            .await
            .expect("insert");
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn search_by_provider_filters_and_pages() {
        let store = InMemoryStore::new();
        for i in 0..5 {
            store
                .upsert(&record("videos", &format!("v{i}"), &format!("Rust {i}"), f64::from(i)))
                .await
                .expect("insert");
        }
        store
            .upsert(&record("videos", "other", "Go intro", 100.0))
            .await
            .expect("insert");
        store
            .upsert(&record("articles", "a1", "Rust article", 50.0))
            .await
            .expect("insert");

        let page = store
            .search_by_provider("videos", "RUST", 1, 2)
            .await
            .expect("search");
        let ids: Vec<&str> = page.iter().map(|r| r.external_id.as_str()).collect();
        assert_eq!(ids, vec!["v4", "v3"]);

        let beyond = store
            .search_by_provider("videos", "rust", 9, 2)
            .await
            .expect("search");
        assert!(beyond.is_empty());
    }

    #[tokio::test]
    async fn search_reports_total_before_pagination() {
        let store = InMemoryStore::new();
        for i in 0..7 {
            store
                .upsert(&record("videos", &format!("v{i}"), "Rust", f64::from(i)))
                .await
                .expect("insert");
        }
        let params = SearchParams::new("rust").with_page(2, 5);
        let (items, total) = store.search(&params).await.expect("search");
        assert_eq!(total, 7);
        assert_eq!(items.len(), 2);
    }
}
