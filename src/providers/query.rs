//! Providers that search upstream: the query is sent as `?q=` and the
//! response is taken as-is, without local filtering or pagination.

use std::time::Duration;

use async_trait::async_trait;
use hub_search::{ProviderAdapter, ProviderContent, Result};

use super::HttpFetcher;
use super::json::{ACCEPT_JSON, parse_json_feed};
use super::xml::{ACCEPT_XML, parse_xml_feed};

/// Wire format of a query-capable feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    Json,
    Xml,
}

impl FeedFormat {
    fn accept(self) -> &'static str {
        match self {
            Self::Json => ACCEPT_JSON,
            Self::Xml => ACCEPT_XML,
        }
    }
}

pub struct QueryFeedProvider {
    name: String,
    format: FeedFormat,
    fetcher: HttpFetcher,
}

impl QueryFeedProvider {
    pub fn new(name: &str, url: &str, format: FeedFormat, timeout: Duration) -> Result<Self> {
        Ok(Self {
            name: name.to_owned(),
            format,
            fetcher: HttpFetcher::new(name, url, timeout)?,
        })
    }

    pub fn format(&self) -> FeedFormat {
        self.format
    }
}

#[async_trait]
impl ProviderAdapter for QueryFeedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, query: &str) -> Result<Vec<ProviderContent>> {
        tracing::debug!(provider = %self.name, query, "querying provider");
        let body = self.fetcher.get(self.format.accept(), Some(query)).await?;
        match self.format {
            FeedFormat::Json => parse_json_feed(&self.name, &body, ""),
            FeedFormat::Xml => parse_xml_feed(&self.name, &body, ""),
        }
    }

    async fn health_check(&self) -> Result<()> {
        self.fetcher.health().await
    }
}
