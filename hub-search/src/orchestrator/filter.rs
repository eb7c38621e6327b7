//! Filtering and ordering of merged records.

use crate::types::{ContentKind, ContentRecord, SortMode};

/// Keep records whose kind is in `kinds` and which carry any of `tags`.
///
/// An empty `kinds` or `tags` disables that filter. Tags match
/// case-insensitively. Relative order is preserved.
pub fn apply_filters(
    records: Vec<ContentRecord>,
    kinds: &[ContentKind],
    tags: &[String],
) -> Vec<ContentRecord> {
    let wanted_tags: Vec<String> = tags.iter().map(|t| t.to_lowercase()).collect();
    records
        .into_iter()
        .filter(|r| kinds.is_empty() || kinds.contains(&r.kind))
        .filter(|r| wanted_tags.is_empty() || r.has_any_tag(&wanted_tags))
        .collect()
}

/// Sort descending by `mode`. Ties keep their arrival order.
pub fn sort_records(records: Vec<ContentRecord>, mode: SortMode) -> Vec<ContentRecord> {
    match mode {
        SortMode::Relevance => {
            let mut records = records;
            records.sort_by(|a, b| b.score.total_cmp(&a.score));
            records
        }
        // Mixed-kind comparisons are not transitive, so the std sorts
        // (which may panic on an inconsistent order) are avoided here.
        SortMode::Popularity => merge_sort_by(records, &popularity_before),
    }
}

/// Same kind: higher views (video) or reactions (text) first. Otherwise by score.
fn popularity_before(a: &ContentRecord, b: &ContentRecord) -> bool {
    if a.kind == b.kind {
        a.popularity() > b.popularity()
    } else {
        a.score > b.score
    }
}

/// Stable top-down merge sort driven by a strict "goes before" predicate.
///
/// Terminates and keeps every element for any predicate, consistent or not.
fn merge_sort_by<T, F>(mut items: Vec<T>, before: &F) -> Vec<T>
where
    F: Fn(&T, &T) -> bool,
{
    if items.len() <= 1 {
        return items;
    }
    let right = items.split_off(items.len() / 2);
    let left = merge_sort_by(items, before);
    let right = merge_sort_by(right, before);

    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    loop {
        let take_right = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => before(r, l),
            (Some(_), None) => false,
            (None, Some(_)) => true,
            (None, None) => break,
        };
        let next = if take_right { right.next() } else { left.next() };
        merged.extend(next);
    }
    merged
}
