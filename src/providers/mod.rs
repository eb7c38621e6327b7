//! Concrete provider adapters and the format registry that builds them.
//!
//! | Format      | Adapter               | Upstream query       |
//! |-------------|-----------------------|----------------------|
//! | `json`      | [`JsonFeedProvider`]  | filtered locally     |
//! | `xml`       | [`XmlFeedProvider`]   | filtered locally     |
//! | `http_json` | [`QueryFeedProvider`] | sent as `?q=`        |
//! | `http_xml`  | [`QueryFeedProvider`] | sent as `?q=`        |

mod http;
mod json;
mod query;
mod registry;
mod xml;

pub use http::HttpFetcher;
pub use json::JsonFeedProvider;
pub use query::{FeedFormat, QueryFeedProvider};
pub use registry::{ProviderConstructor, ProviderRegistry, ProviderRegistryBuilder};
pub use xml::XmlFeedProvider;

use hub_search::ContentKind;

/// Map a provider's content type onto a known kind.
///
/// Feeds call text content `article` or `text`; anything else is unknown.
pub(crate) fn map_kind(raw: &str) -> Option<ContentKind> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "video" => Some(ContentKind::Video),
        "article" | "text" => Some(ContentKind::Text),
        _ => None,
    }
}

/// Case-insensitive substring match. `needle` must already be lowercase and
/// an empty needle matches everything.
pub(crate) fn title_matches(title: &str, needle: &str) -> bool {
    needle.is_empty() || title.to_lowercase().contains(needle)
}
