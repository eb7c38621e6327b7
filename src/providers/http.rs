//! Shared HTTP plumbing for feed providers.

use std::time::Duration;

use hub_search::{Result, SearchError};
use reqwest::StatusCode;
use reqwest::header::ACCEPT;

const USER_AGENT: &str = concat!("content-hub/", env!("CARGO_PKG_VERSION"));

/// A `reqwest` client bound to one provider URL.
///
/// Error messages name the provider but never the URL.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    provider: String,
    url: String,
}

impl HttpFetcher {
    /// Build a fetcher whose requests are bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if the client cannot be constructed.
    pub fn new(provider: &str, url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| SearchError::Config(format!("failed to build HTTP client for {provider}: {e}")))?;
        Ok(Self {
            client,
            provider: provider.to_owned(),
            url: url.trim_end_matches('/').to_owned(),
        })
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// GET the provider URL, optionally with `?q=query`, and return the body.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Provider`] on transport failure or any status
    /// other than 200.
    pub async fn get(&self, accept: &str, query: Option<&str>) -> Result<Vec<u8>> {
        let mut request = self.client.get(&self.url).header(ACCEPT, accept);
        if let Some(q) = query {
            request = request.query(&[("q", q)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SearchError::Provider(format!("{} request failed: {}", self.provider, e.without_url())))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(SearchError::Provider(format!(
                "{} returned status {}",
                self.provider,
                status.as_u16()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SearchError::Provider(format!("{} response read failed: {}", self.provider, e.without_url())))?;
        tracing::trace!(provider = %self.provider, bytes = body.len(), "provider response received");
        Ok(body.to_vec())
    }

    /// HEAD the provider URL. Reachable with a status below 500 is healthy.
    pub async fn health(&self) -> Result<()> {
        let response = self
            .client
            .head(&self.url)
            .send()
            .await
            .map_err(|e| SearchError::Provider(format!("{} health check failed: {}", self.provider, e.without_url())))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(SearchError::Provider(format!(
                "{} is unhealthy: status {}",
                self.provider,
                status.as_u16()
            )));
        }
        Ok(())
    }
}
