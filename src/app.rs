//! Wiring from configuration to a running service.

use std::future::Future;
use std::sync::Arc;

use hub_search::{AggregationService, ContentStore, GuardedProvider, MemoryCache, ProviderManager};

use crate::api::ApiServer;
use crate::config::HubConfig;
use crate::error::{HubError, Result};
use crate::providers::ProviderRegistry;
use crate::store::SqliteContentStore;

/// A fully wired content hub, ready to serve.
pub struct App {
    config: HubConfig,
    service: Arc<AggregationService>,
}

impl App {
    /// Validate `config`, open the store and build every configured provider.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration, an unopenable store or a provider
    /// with an unknown format.
    pub fn build(config: HubConfig, registry: &ProviderRegistry) -> Result<Self> {
        config.validate()?;
        let aggregator = config.aggregator_config();

        let store = SqliteContentStore::open(&config.store.path).map_err(|e| HubError::Store(e.to_string()))?;
        let store: Arc<dyn ContentStore> = Arc::new(store);

        let mut manager = ProviderManager::new(aggregator.provider_timeout);
        for source in &config.providers {
            let adapter = registry
                .create(source, aggregator.provider_timeout)
                .map_err(|e| HubError::Provider(e.to_string()))?;
            manager.register(GuardedProvider::new(adapter, aggregator.breaker.clone()));
        }
        if manager.is_empty() {
            tracing::warn!("no providers configured, searches will only return stored content");
        }

        let cache = Arc::new(MemoryCache::new(config.cache.max_entries));
        let service = AggregationService::new(manager, store, cache, aggregator)?;

        tracing::info!(
            app = %config.app.name,
            env = %config.app.env,
            providers = config.providers.len(),
            "content hub assembled"
        );
        Ok(Self {
            config,
            service: Arc::new(service),
        })
    }

    pub fn service(&self) -> &Arc<AggregationService> {
        &self.service
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests and
    /// the persistence queue.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Server`] if the listener cannot bind.
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut server = ApiServer::start(Arc::clone(&self.service), &self.config.bind_addr()).await?;
        shutdown.await;

        tracing::info!("shutting down");
        server.shutdown();
        server.stopped().await;
        drop(server);

        match Arc::try_unwrap(self.service) {
            Ok(service) => service.shutdown().await,
            Err(_) => tracing::warn!("service still referenced, pending writes may be lost"),
        }
        Ok(())
    }
}
