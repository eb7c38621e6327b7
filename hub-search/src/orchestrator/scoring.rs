//! Ranking score for normalised content.
//!
//! The score combines four components:
//! - a base score from the kind-specific metrics
//! - a kind multiplier favouring video
//! - a freshness bonus by publication age
//! - an engagement ratio
//!
//! Formula: `score = base * multiplier + freshness + engagement`, rounded to
//! two decimals.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{ContentKind, ContentRecord};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// The individual components of a score, before rounding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub base: f64,
    pub multiplier: f64,
    pub freshness: f64,
    pub engagement: f64,
}

impl ScoreBreakdown {
    /// The final, rounded score.
    pub fn total(&self) -> f64 {
        round2(self.base * self.multiplier + self.freshness + self.engagement)
    }
}

/// Score `record` against the current time.
pub fn calculate_score(record: &ContentRecord) -> f64 {
    calculate_score_at(record, Utc::now())
}

/// Score `record` as if evaluated at `now`.
///
/// # Scoring Formula
///
/// ```text
/// base        video: views / 1000 + likes / 100
///             text:  reading_time + reactions / 50
/// multiplier  video: 1.5, text: 1.0
/// freshness   age ≤ 7 days: 5, ≤ 30: 3, ≤ 90: 1, older: 0
/// engagement  video: likes / views * 10      (0 when views = 0)
///             text:  reactions / reading_time * 5  (0 when reading_time = 0)
/// ```
pub fn calculate_score_at(record: &ContentRecord, now: DateTime<Utc>) -> f64 {
    breakdown_at(record, now).total()
}

/// The score components of `record` as if evaluated at `now`.
pub fn breakdown_at(record: &ContentRecord, now: DateTime<Utc>) -> ScoreBreakdown {
    ScoreBreakdown {
        base: base_score(record),
        multiplier: kind_multiplier(record.kind),
        freshness: freshness_score(record.published_at, now),
        engagement: engagement_score(record),
    }
}

fn base_score(record: &ContentRecord) -> f64 {
    match record.kind {
        ContentKind::Video => record.views as f64 / 1000.0 + record.likes as f64 / 100.0,
        ContentKind::Text => record.reading_time as f64 + record.reactions as f64 / 50.0,
    }
}

fn kind_multiplier(kind: ContentKind) -> f64 {
    match kind {
        ContentKind::Video => 1.5,
        ContentKind::Text => 1.0,
    }
}

/// Future publication dates have negative age and count as fresh.
fn freshness_score(published_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_days = (now - published_at).num_milliseconds() as f64 / MILLIS_PER_DAY;
    if age_days <= 7.0 {
        5.0
    } else if age_days <= 30.0 {
        3.0
    } else if age_days <= 90.0 {
        1.0
    } else {
        0.0
    }
}

fn engagement_score(record: &ContentRecord) -> f64 {
    match record.kind {
        ContentKind::Video if record.views > 0 => {
            record.likes as f64 / record.views as f64 * 10.0
        }
        ContentKind::Text if record.reading_time > 0 => {
            record.reactions as f64 / record.reading_time as f64 * 5.0
        }
        _ => 0.0,
    }
}

/// Round half away from zero to two decimals.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
