//! Metrics collection and exposition.

mod collector;
mod server;

pub use collector::{MetricsCollector, ReloadResult, RequestTimer, StoreOperation};
pub use server::MetricsServer;
