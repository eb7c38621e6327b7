//! Content hub: ranked, cached search across independent content providers.
//!
//! The aggregation engine lives in the `hub-search` crate. This crate wires
//! it into a service:
//!
//! # Architecture
//!
//! - **Providers**: JSON and XML feed adapters built from configuration by a
//!   format registry
//! - **Store**: SQLite persistence for fallback when a provider is down
//! - **API**: axum routes for search and health
//! - **App**: configuration → store, providers, cache and service

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod logging;
pub mod providers;
pub mod store;

pub use api::{ApiServer, router};
pub use app::App;
pub use config::{HubConfig, ProviderSource};
pub use error::{HubError, Result};
pub use providers::ProviderRegistry;
pub use store::{SqliteContentStore, StoreError};
