//! Service configuration.
//!
//! Loaded from a TOML file, then overridden from the environment. Every
//! section has defaults, so an empty file (or no file) yields a runnable
//! service with no providers.
//!
//! ```toml
//! [server]
//! port = 8080
//!
//! [provider]
//! timeout_secs = 5
//!
//! [[providers]]
//! name = "videos"
//! url = "https://videos.example.com/feed.json"
//! format = "json"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use hub_search::{AggregatorConfig, CircuitBreakerConfig};
use serde::{Deserialize, Serialize};

use crate::error::{HubError, Result};

/// Top-level configuration for the content hub.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub app: AppConfig,
    /// HTTP listener settings.
    pub server: ServerConfig,
    /// SQLite content store settings.
    pub store: StoreConfig,
    /// Result cache settings.
    pub cache: CacheConfig,
    /// Timeouts and circuit breaking shared by every provider.
    pub provider: ProviderConfig,
    /// Upstream content providers, queried in this order.
    pub providers: Vec<ProviderSource>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub name: String,
    /// Deployment environment, e.g. `development` or `production`.
    pub env: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "content-hub".to_owned(),
            env: "development".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file. `:memory:` keeps everything in process.
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("content-hub.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// How long a result page stays cached. 0 disables caching.
    pub ttl_secs: u64,
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            max_entries: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Per-provider request timeout.
    pub timeout_secs: u64,
    /// Consecutive failures before a provider's circuit opens.
    pub circuit_breaker_threshold: u32,
    /// How long an open circuit waits before probing again.
    pub circuit_breaker_timeout_secs: u64,
    /// Bound on a whole search fan-out.
    pub search_deadline_secs: u64,
    /// Capacity of the background persistence queue.
    pub persist_queue_size: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 5,
            circuit_breaker_threshold: 5,
            circuit_breaker_timeout_secs: 30,
            search_deadline_secs: 10,
            persist_queue_size: 256,
        }
    }
}

/// One upstream content provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSource {
    pub name: String,
    pub url: String,
    /// Adapter format, e.g. `json`, `xml`, `http_json` or `http_xml`.
    pub format: String,
}

impl HubConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| HubError::Config(e.to_string()))
    }

    /// Read `path` if given, apply environment overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded or the result is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    ///
    /// Recognised variables: `APP_ENV`, `SERVER_HOST`, `SERVER_PORT`,
    /// `STORE_PATH`, `PROVIDER_TIMEOUT`, `CIRCUIT_BREAKER_THRESHOLD`,
    /// `CIRCUIT_BREAKER_TIMEOUT` and `CACHE_TTL`. Durations are whole
    /// seconds. Unparseable numbers are ignored with a warning.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("APP_ENV") {
            self.app.env = v;
        }
        if let Some(v) = var("SERVER_HOST") {
            self.server.host = v;
        }
        if let Some(v) = var("STORE_PATH") {
            self.store.path = PathBuf::from(v);
        }
        if let Some(v) = parsed(&var, "SERVER_PORT") {
            self.server.port = v;
        }
        if let Some(v) = parsed(&var, "PROVIDER_TIMEOUT") {
            self.provider.timeout_secs = v;
        }
        if let Some(v) = parsed(&var, "CIRCUIT_BREAKER_THRESHOLD") {
            self.provider.circuit_breaker_threshold = v;
        }
        if let Some(v) = parsed(&var, "CIRCUIT_BREAKER_TIMEOUT") {
            self.provider.circuit_breaker_timeout_secs = v;
        }
        if let Some(v) = parsed(&var, "CACHE_TTL") {
            self.cache.ttl_secs = v;
        }
    }

    /// Validates this configuration, returning an error if any field is invalid.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(HubError::Config("server.port must be non-zero".into()));
        }
        if self.cache.max_entries == 0 {
            return Err(HubError::Config("cache.max_entries must be greater than 0".into()));
        }
        for (i, source) in self.providers.iter().enumerate() {
            if source.name.trim().is_empty() {
                return Err(HubError::Config(format!("providers[{i}].name is required")));
            }
            if source.url.trim().is_empty() {
                return Err(HubError::Config(format!("providers[{i}].url is required")));
            }
            if self.providers[..i].iter().any(|p| p.name == source.name) {
                return Err(HubError::Config(format!(
                    "provider name '{}' is used more than once",
                    source.name
                )));
            }
        }
        self.aggregator_config().validate()?;
        Ok(())
    }

    /// The engine settings derived from this configuration.
    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            provider_timeout: self.provider_timeout(),
            search_deadline: Duration::from_secs(self.provider.search_deadline_secs),
            breaker: CircuitBreakerConfig {
                failure_threshold: self.provider.circuit_breaker_threshold,
                cooldown: Duration::from_secs(self.provider.circuit_breaker_timeout_secs),
            },
            cache_ttl: Duration::from_secs(self.cache.ttl_secs),
            persist_queue_size: self.provider.persist_queue_size,
        }
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider.timeout_secs)
    }

    /// `host:port` for the HTTP listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parsed<T, F>(var: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = var(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable environment override");
            None
        }
    }
}
