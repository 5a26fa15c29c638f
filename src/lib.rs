//! Concurrent acquisition and gap reconciliation of hourly gridded weather
//! forecasts for a fixed set of points.
//!
//! Fetch windows are planned by [`processors::IntervalPlanner`], fanned out per
//! search pattern by [`fetchers::FetchExecutor`], merged into canonical
//! records by [`processors::ResultMerger`] and appended to a CSV
//! [`writers::ObservationStore`]. Failed windows land in the
//! [`writers::ErrorLog`] and are retried by [`processors::FetchPipeline::refetch_data`].

pub mod analyzers;
pub mod cli;
pub mod config;
pub mod error;
pub mod fetchers;
pub mod models;
pub mod processors;
pub mod readers;
pub mod utils;
pub mod writers;

pub use config::EngineConfig;
pub use error::{FetchError, Result};
