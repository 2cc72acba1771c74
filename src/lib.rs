//! worldstats - country indicator time series over HTTP
//!
//! This crate serves population, GDP and life expectancy measurements:
//! - Time series for one field over an inclusive date range
//! - Summary statistics (mean, min, max, standard deviation) per field
//! - A static client page that charts both
//! - In-memory (JSON file, hot-reloadable) or PostgREST-backed storage
//! - Prometheus metrics

pub mod api;
pub mod config;
pub mod metrics;
pub mod model;
pub mod service;
pub mod state;
pub mod store;
pub mod util;

pub use config::Config;
pub use state::AppState;
