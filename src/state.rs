//! Shared application state.

use crate::api::StaticFiles;
use crate::metrics::MetricsCollector;
use crate::service::{QueryService, StatisticsService};
use crate::store::MeasurementStore;
use std::sync::Arc;
use std::time::Duration;

/// State handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    query: QueryService,
    statistics: StatisticsService,
    static_files: Option<Arc<StaticFiles>>,
    metrics: MetricsCollector,
}

impl AppState {
    /// Wire both services to one store.
    pub fn new(
        store: Arc<dyn MeasurementStore>,
        query_timeout: Duration,
        static_files: Option<StaticFiles>,
        metrics: MetricsCollector,
    ) -> Self {
        Self {
            query: QueryService::new(Arc::clone(&store), query_timeout, metrics.clone()),
            statistics: StatisticsService::new(store, query_timeout, metrics.clone()),
            static_files: static_files.map(Arc::new),
            metrics,
        }
    }

    pub fn query(&self) -> &QueryService {
        &self.query
    }

    pub fn statistics(&self) -> &StatisticsService {
        &self.statistics
    }

    /// `None` when static serving is disabled.
    pub fn static_files(&self) -> Option<&StaticFiles> {
        self.static_files.as_deref()
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }
}
