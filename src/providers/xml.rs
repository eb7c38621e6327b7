//! XML text-style feed, decoded with `quick-xml`'s serde support.
//!
//! Wire shape:
//!
//! ```xml
//! <feed>
//!   <items>
//!     <item>
//!       <id>a1</id>
//!       <headline>...</headline>
//!       <type>article</type>
//!       <stats><reading_time>8</reading_time><reactions>45</reactions></stats>
//!       <publication_date>2024-03-15</publication_date>
//!       <categories><category>rust</category></categories>
//!     </item>
//!   </items>
//! </feed>
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use hub_search::{
    ContentKind, PaginatedAdapter, ProviderAdapter, ProviderContent, ProviderPage, Result, SearchError,
};
use serde::{Deserialize, Serialize};

use super::{HttpFetcher, map_kind, title_matches};

pub(crate) const ACCEPT_XML: &str = "application/xml";

#[derive(Debug, Default, Deserialize)]
struct XmlFeed {
    #[serde(default)]
    items: XmlItems,
}

#[derive(Debug, Default, Deserialize)]
struct XmlItems {
    #[serde(default, rename = "item")]
    item: Vec<XmlItem>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
struct XmlItem {
    id: String,
    headline: String,
    #[serde(rename = "type")]
    kind: String,
    stats: XmlStats,
    publication_date: String,
    categories: XmlCategories,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
struct XmlStats {
    views: u64,
    likes: u64,
    reading_time: u64,
    reactions: u64,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
struct XmlCategories {
    #[serde(rename = "category")]
    category: Vec<String>,
}

/// Decode an XML feed, keeping items whose headline contains `needle`
/// (lowercase; empty keeps everything).
///
/// Video items take views and likes, text items take reading time and
/// reactions. Dates are `YYYY-MM-DD` at midnight UTC; an unparseable date is
/// replaced by the current time.
pub(crate) fn parse_xml_feed(provider: &str, body: &[u8], needle: &str) -> Result<Vec<ProviderContent>> {
    let feed: XmlFeed = quick_xml::de::from_reader(body)
        .map_err(|e| SearchError::Provider(format!("{provider} returned malformed XML: {e}")))?;

    let mut items = Vec::with_capacity(feed.items.item.len());
    for item in feed.items.item {
        if !title_matches(&item.headline, needle) {
            continue;
        }
        let Some(kind) = map_kind(&item.kind) else {
            tracing::warn!(provider, external_id = %item.id, kind = %item.kind, "skipping item with unknown content type");
            continue;
        };
        let published_at = NaiveDate::parse_from_str(item.publication_date.trim(), "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
            .unwrap_or_else(|| {
                tracing::debug!(provider, external_id = %item.id, "unparseable publication_date, using now");
                Utc::now()
            });
        let raw_data = serde_json::to_vec(&item).unwrap_or_default();

        let mut content = ProviderContent::new(item.id, item.headline, kind, published_at);
        match kind {
            ContentKind::Video => {
                content.views = item.stats.views;
                content.likes = item.stats.likes;
            }
            ContentKind::Text => {
                content.reading_time = item.stats.reading_time;
                content.reactions = item.stats.reactions;
            }
        }
        content.tags = item.categories.category;
        content.raw_data = raw_data;
        items.push(content);
    }
    Ok(items)
}

/// Provider serving a whole XML feed; search and pagination happen locally.
pub struct XmlFeedProvider {
    name: String,
    fetcher: HttpFetcher,
}

impl XmlFeedProvider {
    pub fn new(name: &str, url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            name: name.to_owned(),
            fetcher: HttpFetcher::new(name, url, timeout)?,
        })
    }

    async fn fetch_matching(&self, query: &str) -> Result<Vec<ProviderContent>> {
        let body = self.fetcher.get(ACCEPT_XML, None).await?;
        parse_xml_feed(&self.name, &body, &query.to_lowercase())
    }
}

#[async_trait]
impl ProviderAdapter for XmlFeedProvider {
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
impl PaginatedAdapter for XmlFeedProvider {
    async fn search_with_pagination(&self, query: &str, page: u32, per_page: u32) -> Result<ProviderPage> {
        let items = self.fetch_matching(query).await?;
        Ok(ProviderPage::from_full(items, page, per_page))
    }
}
