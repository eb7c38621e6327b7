//! JSON video-style feed.
//!
//! Wire shape:
//!
//! ```json
//! {"contents": [{"id": "v1", "title": "...", "type": "video",
//!   "metrics": {"views": 10, "likes": 2, "duration": "12:30"},
//!   "published_at": "2024-03-15T10:00:00Z", "tags": ["rust"]}]}
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hub_search::{PaginatedAdapter, ProviderAdapter, ProviderContent, ProviderPage, Result, SearchError};
use serde::{Deserialize, Serialize};

use super::{HttpFetcher, map_kind, title_matches};

pub(crate) const ACCEPT_JSON: &str = "application/json";

#[derive(Debug, Deserialize)]
struct JsonFeed {
    #[serde(default)]
    contents: Vec<JsonItem>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
struct JsonItem {
    id: String,
    title: String,
    #[serde(rename = "type")]
    kind: String,
    metrics: JsonMetrics,
    published_at: String,
    tags: Vec<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
struct JsonMetrics {
    views: u64,
    likes: u64,
    #[serde(skip_serializing_if = "String::is_empty")]
    duration: String,
}

/// Decode a JSON feed, keeping items whose title contains `needle`
/// (lowercase; empty keeps everything).
///
/// Items with an unknown content type are skipped. An unparseable
/// `published_at` is replaced by the current time.
pub(crate) fn parse_json_feed(provider: &str, body: &[u8], needle: &str) -> Result<Vec<ProviderContent>> {
    let feed: JsonFeed = serde_json::from_slice(body)
        .map_err(|e| SearchError::Provider(format!("{provider} returned malformed JSON: {e}")))?;

    let mut items = Vec::with_capacity(feed.contents.len());
    for item in feed.contents {
        if !title_matches(&item.title, needle) {
            continue;
        }
        let Some(kind) = map_kind(&item.kind) else {
            tracing::warn!(provider, external_id = %item.id, kind = %item.kind, "skipping item with unknown content type");
            continue;
        };
        let published_at = DateTime::parse_from_rfc3339(&item.published_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| {
                tracing::debug!(provider, external_id = %item.id, "unparseable published_at, using now");
                Utc::now()
            });
        let raw_data = serde_json::to_vec(&item).unwrap_or_default();

        let mut content = ProviderContent::new(item.id, item.title, kind, published_at);
        content.views = item.metrics.views;
        content.likes = item.metrics.likes;
        content.tags = item.tags;
        content.raw_data = raw_data;
        items.push(content);
    }
    Ok(items)
}

/// Provider serving a whole JSON feed; search and pagination happen locally.
pub struct JsonFeedProvider {
    name: String,
    fetcher: HttpFetcher,
}

impl JsonFeedProvider {
    pub fn new(name: &str, url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            name: name.to_owned(),
            fetcher: HttpFetcher::new(name, url, timeout)?,
        })
    }

    async fn fetch_matching(&self, query: &str) -> Result<Vec<ProviderContent>> {
        let body = self.fetcher.get(ACCEPT_JSON, None).await?;
        parse_json_feed(&self.name, &body, &query.to_lowercase())
    }
}

#[async_trait]
impl ProviderAdapter for JsonFeedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, query: &str) -> Result<Vec<ProviderContent>> {
        self.fetch_matching(query).await
    }

    async fn health_check(&self) -> Result<()> {
        self.fetcher.health().await
    }

    fn as_paginated(&self) -> Option<&dyn PaginatedAdapter> {
        Some(self)
    }
}

#[async_trait]
impl PaginatedAdapter for JsonFeedProvider {
    async fn search_with_pagination(&self, query: &str, page: u32, per_page: u32) -> Result<ProviderPage> {
        let items = self.fetch_matching(query).await?;
        Ok(ProviderPage::from_full(items, page, per_page))
    }
}
