//! Core types for normalised content, search parameters and paginated results.

use std::fmt;
use std::ops::Range;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SearchError;

/// Page size used when a request does not specify one.
pub const DEFAULT_PER_PAGE: u32 = 20;

/// Largest page size a request may ask for.
pub const MAX_PER_PAGE: u32 = 100;

/// Longest title accepted from a provider, in characters.
pub const MAX_TITLE_CHARS: usize = 500;

/// The kind of a piece of content. Scoring and popularity sorting differ per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// Video content, ranked by views and likes.
    Video,
    /// Text content, ranked by reading time and reactions.
    Text,
}

impl ContentKind {
    /// Returns the wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Text => "text",
        }
    }

    /// Returns all known kinds.
    pub fn all() -> &'static [ContentKind] {
        &[Self::Video, Self::Text]
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "video" => Ok(Self::Video),
            "text" => Ok(Self::Text),
            other => Err(SearchError::Validation(format!(
                "invalid content type '{other}', must be 'video' or 'text'"
            ))),
        }
    }
}

/// Result ordering requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortMode {
    /// Same-kind pairs by views (video) or reactions (text), otherwise by score.
    #[serde(rename = "popularity")]
    Popularity,
    /// By computed score.
    #[default]
    #[serde(rename = "relevant_score")]
    Relevance,
}

impl SortMode {
    /// Returns the wire name of this sort mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Popularity => "popularity",
            Self::Relevance => "relevant_score",
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortMode {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "popularity" => Ok(Self::Popularity),
            "relevant_score" => Ok(Self::Relevance),
            other => Err(SearchError::Validation(format!(
                "invalid sort field '{other}', must be 'popularity' or 'relevant_score'"
            ))),
        }
    }
}

/// Content as returned by a provider adapter, before normalisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderContent {
    /// Identifier unique within the provider.
    pub external_id: String,
    pub title: String,
    pub kind: ContentKind,
    pub published_at: DateTime<Utc>,
    pub views: u64,
    pub likes: u64,
    pub reactions: u64,
    /// Estimated reading time in minutes.
    pub reading_time: u64,
    pub tags: Vec<String>,
    /// Provider payload for this item, kept for re-scoring and debugging.
    pub raw_data: Vec<u8>,
}

impl ProviderContent {
    /// Create provider content with zeroed metrics and no tags.
    pub fn new(
        external_id: impl Into<String>,
        title: impl Into<String>,
        kind: ContentKind,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            title: title.into(),
            kind,
            published_at,
            views: 0,
            likes: 0,
            reactions: 0,
            reading_time: 0,
            tags: Vec::new(),
            raw_data: Vec::new(),
        }
    }

    /// Check the fields every provider item must carry.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Validation`] naming the first offending field.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.external_id.trim().is_empty() {
            return Err(SearchError::Validation("external_id is required".into()));
        }
        if self.title.trim().is_empty() {
            return Err(SearchError::Validation("title is required".into()));
        }
        if self.title.chars().count() > MAX_TITLE_CHARS {
            return Err(SearchError::Validation(format!(
                "title exceeds {MAX_TITLE_CHARS} characters"
            )));
        }
        Ok(())
    }
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

/// A provider-agnostic, scored unit of content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: Uuid,
    pub external_id: String,
    pub provider: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: ContentKind,
    pub published_at: DateTime<Utc>,
    #[serde(skip)]
    pub raw_data: Vec<u8>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub views: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub likes: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub reactions: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub reading_time: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub score: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContentRecord {
    /// Normalise provider content into a record with a fresh identity.
    pub fn from_provider(content: ProviderContent, provider: &str, score: f64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            external_id: content.external_id,
            provider: provider.to_owned(),
            title: content.title,
            kind: content.kind,
            published_at: content.published_at,
            raw_data: content.raw_data,
            views: content.views,
            likes: content.likes,
            reactions: content.reactions,
            reading_time: content.reading_time,
            tags: content.tags,
            score,
            created_at: now,
            updated_at: now,
        }
    }

    /// The kind-specific popularity metric: views for video, reactions for text.
    pub fn popularity(&self) -> u64 {
        match self.kind {
            ContentKind::Video => self.views,
            ContentKind::Text => self.reactions,
        }
    }

    /// Whether any tag matches one of `wanted`, which must already be lowercase.
    pub fn has_any_tag(&self, wanted: &[String]) -> bool {
        self.tags
            .iter()
            .any(|tag| wanted.contains(&tag.to_lowercase()))
    }
}

/// Parameters of one aggregated search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParams {
    pub query: String,
    /// Tag filter, matched case-insensitively. Empty means no filter.
    pub tags: Vec<String>,
    /// Kind filter. Empty means no filter.
    pub content_kinds: Vec<ContentKind>,
    pub sort: SortMode,
    /// 1-based page number.
    pub page: u32,
    pub per_page: u32,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            query: String::new(),
            tags: Vec::new(),
            content_kinds: Vec::new(),
            sort: SortMode::default(),
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl SearchParams {
    /// Parameters for `query` with default sort and pagination.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = ContentKind>) -> Self {
        self.content_kinds = kinds.into_iter().collect();
        self
    }

    pub fn with_sort(mut self, sort: SortMode) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_page(mut self, page: u32, per_page: u32) -> Self {
        self.page = page;
        self.per_page = per_page;
        self
    }

    /// Clamp pagination into range: page ≥ 1, per_page 0 → default, per_page ≤ 100.
    pub fn normalized(mut self) -> Self {
        self.page = self.page.max(1);
        if self.per_page == 0 {
            self.per_page = DEFAULT_PER_PAGE;
        }
        self.per_page = self.per_page.min(MAX_PER_PAGE);
        self
    }
}

/// `ceil(total / per_page)`, and 0 when there is nothing to page.
pub fn total_pages(total: u64, per_page: u32) -> u64 {
    if per_page == 0 {
        return 0;
    }
    total.div_ceil(u64::from(per_page))
}

/// Index window of `page` within a list of `len` items.
///
/// Out-of-range pages yield an empty window positioned at `len`.
pub fn page_window(len: usize, page: u32, per_page: u32) -> Range<usize> {
    let per_page = per_page as usize;
    let start = (page.max(1) as usize - 1).saturating_mul(per_page);
    if start >= len {
        return len..len;
    }
    let end = start.saturating_add(per_page).min(len);
    start..end
}

/// Pagination metadata reported by a paginated provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationInfo {
    pub current_page: u32,
    pub per_page: u32,
    pub total: u64,
    pub total_pages: u64,
}

impl PaginationInfo {
    pub fn new(current_page: u32, per_page: u32, total: u64) -> Self {
        Self {
            current_page,
            per_page,
            total,
            total_pages: total_pages(total, per_page),
        }
    }
}

/// One page of provider content plus the provider's pagination metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderPage {
    pub items: Vec<ProviderContent>,
    pub pagination: PaginationInfo,
}

impl ProviderPage {
    /// Slice `page` out of a full, already-filtered item list.
    pub fn from_full(mut items: Vec<ProviderContent>, page: u32, per_page: u32) -> Self {
        let total = items.len() as u64;
        let window = page_window(items.len(), page, per_page);
        let items: Vec<ProviderContent> = items.drain(window).collect();
        Self {
            items,
            pagination: PaginationInfo::new(page, per_page, total),
        }
    }
}

/// The result of one provider's fan-out call.
#[derive(Debug, Clone)]
pub struct ProviderOutcome {
    pub provider: String,
    pub result: Result<Vec<ProviderContent>, SearchError>,
    pub elapsed: Duration,
}

impl ProviderOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// A materialised, paginated search response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub items: Vec<ContentRecord>,
    /// Number of matches before pagination.
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u64,
}

impl SearchResult {
    pub fn new(items: Vec<ContentRecord>, total: u64, page: u32, per_page: u32) -> Self {
        Self {
            items,
            total,
            page,
            per_page,
            total_pages: total_pages(total, per_page),
        }
    }

    /// An empty page for the given pagination.
    pub fn empty(page: u32, per_page: u32) -> Self {
        Self::new(Vec::new(), 0, page, per_page)
    }
}
