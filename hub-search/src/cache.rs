//! Result cache for materialised search pages.
//!
//! [`ResultCache`] is the get/set contract the aggregation service relies
//! on; [`MemoryCache`] implements it in-process with [`moka`], honouring a
//! per-entry TTL. Keys come from [`cache_key`], a SHA-256 digest over the
//! normalised search parameters.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::types::{SearchParams, SearchResult};

/// Prefix shared by every search cache key.
pub const KEY_PREFIX: &str = "search:";

/// Default number of cached pages for [`MemoryCache`].
pub const DEFAULT_MAX_ENTRIES: u64 = 1_000;

/// Cache-aside storage for search pages.
#[async_trait]
pub trait ResultCache: Send + Sync {
    /// Look up a page. `Ok(None)` is a miss; `Err` means the cache itself failed.
    async fn get(&self, key: &str) -> Result<Option<SearchResult>>;

    /// Store a page for `ttl`.
    async fn set(&self, key: &str, value: &SearchResult, ttl: Duration) -> Result<()>;
}

/// Build the cache key for a search.
///
/// The params are normalised first so that `page=0` and `page=1` share an
/// entry. Tag and kind order is significant. Every free-text field is length
/// prefixed so separators inside a query or tag cannot shift field boundaries.
pub fn cache_key(params: &SearchParams) -> String {
    let params = params.clone().normalized();
    let mut canonical = String::new();
    push_field(&mut canonical, "q", &params.query);
    let _ = write!(canonical, "tags#{};", params.tags.len());
    for tag in &params.tags {
        push_field(&mut canonical, "tag", tag);
    }
    let _ = write!(canonical, "types#{};", params.content_kinds.len());
    for kind in &params.content_kinds {
        push_field(&mut canonical, "type", kind.as_str());
    }
    push_field(&mut canonical, "sort", params.sort.as_str());
    let _ = write!(canonical, "page={};per_page={};", params.page, params.per_page);

    let digest = Sha256::digest(canonical.as_bytes());
    let mut key = String::with_capacity(KEY_PREFIX.len() + digest.len() * 2);
    key.push_str(KEY_PREFIX);
    for byte in digest {
        let _ = write!(key, "{byte:02x}");
    }
    key
}

fn push_field(out: &mut String, name: &str, value: &str) {
    let _ = write!(out, "{name}={}:{value};", value.len());
}

#[derive(Clone)]
struct Entry {
    value: Arc<SearchResult>,
    ttl: Duration,
}

struct EntryTtl;

impl Expiry<String, Entry> for EntryTtl {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// In-process [`ResultCache`] with bounded capacity and per-entry TTL.
#[derive(Clone)]
pub struct MemoryCache {
    inner: Cache<String, Entry>,
}

impl MemoryCache {
    pub fn new(max_entries: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(EntryTtl)
            .build();
        Self { inner }
    }

    /// Approximate number of live entries.
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

#[async_trait]
impl ResultCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<SearchResult>> {
        Ok(self
            .inner
            .get(key)
            .await
            .map(|entry| entry.value.as_ref().clone()))
    }

    async fn set(&self, key: &str, value: &SearchResult, ttl: Duration) -> Result<()> {
        if ttl.is_zero() {
            return Ok(());
        }
        let entry = Entry {
            value: Arc::new(value.clone()),
            ttl,
        };
        self.inner.insert(key.to_owned(), entry).await;
        Ok(())
    }
}
