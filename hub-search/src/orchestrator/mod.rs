//! Aggregation orchestrator: fan-out, fallback, scoring, ranking.
//!
//! [`service::AggregationService`] drives the pipeline; the sibling modules
//! hold its individual stages so each can be tested in isolation.

pub mod filter;
pub mod paginate;
pub mod persist;
pub mod scoring;
pub mod service;
