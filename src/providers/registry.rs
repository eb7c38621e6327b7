//! Format → constructor registry for provider adapters.
//!
//! The registry is built once at startup and handed to whoever wires the
//! [`ProviderManager`](hub_search::ProviderManager); there is no global
//! registration.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use hub_search::{ProviderAdapter, Result, SearchError};

use super::{FeedFormat, JsonFeedProvider, QueryFeedProvider, XmlFeedProvider};
use crate::config::ProviderSource;

/// Builds an adapter for one configured provider.
pub type ProviderConstructor =
    Arc<dyn Fn(&ProviderSource, Duration) -> Result<Arc<dyn ProviderAdapter>> + Send + Sync>;

/// Immutable lookup from format name to constructor.
#[derive(Clone)]
pub struct ProviderRegistry {
    constructors: BTreeMap<String, ProviderConstructor>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("formats", &self.formats())
            .finish()
    }
}

impl ProviderRegistry {
    pub fn builder() -> ProviderRegistryBuilder {
        ProviderRegistryBuilder::default()
    }

    /// Registry with the built-in `json`, `xml`, `http_json` and `http_xml` formats.
    pub fn with_default_formats() -> Self {
        Self::builder()
            .register("json", json_feed)
            .register("xml", xml_feed)
            .register("http_json", |source: &ProviderSource, timeout| {
                query_feed(source, FeedFormat::Json, timeout)
            })
            .register("http_xml", |source: &ProviderSource, timeout| {
                query_feed(source, FeedFormat::Xml, timeout)
            })
            .build()
    }

    /// Registered format names, sorted.
    pub fn formats(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    /// Construct the adapter for `source`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if the format is not registered, or
    /// whatever the constructor itself fails with.
    pub fn create(&self, source: &ProviderSource, timeout: Duration) -> Result<Arc<dyn ProviderAdapter>> {
        let constructor = self.constructors.get(&source.format).ok_or_else(|| {
            SearchError::Config(format!(
                "unknown provider format '{}' for provider {}",
                source.format, source.name
            ))
        })?;
        constructor(source, timeout)
    }
}

fn json_feed(source: &ProviderSource, timeout: Duration) -> Result<Arc<dyn ProviderAdapter>> {
    Ok(Arc::new(JsonFeedProvider::new(&source.name, &source.url, timeout)?))
}

fn xml_feed(source: &ProviderSource, timeout: Duration) -> Result<Arc<dyn ProviderAdapter>> {
    Ok(Arc::new(XmlFeedProvider::new(&source.name, &source.url, timeout)?))
}

fn query_feed(source: &ProviderSource, format: FeedFormat, timeout: Duration) -> Result<Arc<dyn ProviderAdapter>> {
    Ok(Arc::new(QueryFeedProvider::new(&source.name, &source.url, format, timeout)?))
}

#[derive(Default)]
pub struct ProviderRegistryBuilder {
    constructors: BTreeMap<String, ProviderConstructor>,
}

impl ProviderRegistryBuilder {
    /// Register `constructor` under `format`, replacing any earlier entry.
    pub fn register<F>(mut self, format: &str, constructor: F) -> Self
    where
        F: Fn(&ProviderSource, Duration) -> Result<Arc<dyn ProviderAdapter>> + Send + Sync + 'static,
    {
        self.constructors.insert(format.to_owned(), Arc::new(constructor));
        self
    }

    pub fn build(self) -> ProviderRegistry {
        ProviderRegistry {
            constructors: self.constructors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hub_search::ProviderContent;

    fn source(name: &str, format: &str) -> ProviderSource {
        ProviderSource {
            name: name.into(),
            url: "http://127.0.0.1:9/feed".into(),
            format: format.into(),
        }
    }

    #[test]
    fn default_formats_are_registered() {
        let registry = ProviderRegistry::with_default_formats();
        assert_eq!(registry.formats(), vec!["http_json", "http_xml", "json", "xml"]);
    }

    #[test]
    fn create_builds_adapter_named_after_source() {
        let registry = ProviderRegistry::with_default_formats();
        let adapter = registry
            .create(&source("videos", "json"), Duration::from_secs(1))
            .expect("create");
        assert_eq!(adapter.name(), "videos");
        assert!(adapter.as_paginated().is_some());

        let query = registry
            .create(&source("search", "http_xml"), Duration::from_secs(1))
            .expect("create");
        assert!(query.as_paginated().is_none());
    }

    #[test]
    fn unknown_format_is_a_config_error() {
        let registry = ProviderRegistry::with_default_formats();
        let err = registry
            .create(&source("videos", "yaml"), Duration::from_secs(1))
            .err()
            .expect("unknown format");
        assert!(matches!(err, SearchError::Config(_)));
        assert!(err.to_string().contains("yaml"));
    }

    struct Fixed(String);

    #[async_trait]
    impl ProviderAdapter for Fixed {
        fn name(&self) -> &str {
            &self.0
        }

        async fn search(&self, _query: &str) -> Result<Vec<ProviderContent>> {
            Ok(Vec::new())
        }

        async fn health_check(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn custom_formats_can_be_registered() {
        let registry = ProviderRegistry::builder()
            .register("fixed", |source: &ProviderSource, _| {
                let adapter: Arc<dyn ProviderAdapter> = Arc::new(Fixed(source.name.clone()));
                Ok(adapter)
            })
            .build();
        assert_eq!(registry.formats(), vec!["fixed"]);
        let adapter = registry
            .create(&source("custom", "fixed"), Duration::from_secs(1))
            .expect("create");
        assert_eq!(adapter.name(), "custom");
        assert!(registry.create(&source("x", "json"), Duration::from_secs(1)).is_err());
    }
}
