//! Page slicing over the final, sorted record list.

use crate::types::{page_window, ContentRecord, SearchResult};

/// Cut page `page` out of `records`.
///
/// `total` counts every record; pages past the end are empty.
pub fn paginate(mut records: Vec<ContentRecord>, page: u32, per_page: u32) -> SearchResult {
    let total = records.len() as u64;
    let window = page_window(records.len(), page, per_page);
    let items: Vec<ContentRecord> = records.drain(window).collect();
    SearchResult::new(items, total, page, per_page)
}
