//! Metrics collector using prometheus-client.
//!
//! Provides metrics for API requests, store queries, and the loaded dataset.

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Labels for request metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    pub route: String,
    pub method: String,
    pub status: String,
}

/// Labels for request duration.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RouteLabels {
    pub route: String,
}

/// Labels for store query metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct StoreQueryLabels {
    pub operation: StoreOperation,
    pub result: QueryResult,
}

/// Store operation being measured.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum StoreOperation {
    FindSeries,
    FieldValues,
}

/// Outcome of a store query.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum QueryResult {
    Success,
    Failure,
}

/// Labels for dataset reload metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ReloadLabels {
    pub result: ReloadResult,
}

/// Outcome of a dataset reload.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum ReloadResult {
    Success,
    Failure,
}

/// Collects and stores all metrics.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<MetricsCollectorInner>,
}

struct MetricsCollectorInner {
    /// Total requests counter.
    requests_total: Family<RequestLabels, Counter>,
    /// Request duration histogram (in seconds).
    request_duration_seconds: Family<RouteLabels, Histogram>,
    /// Store queries counter.
    store_queries_total: Family<StoreQueryLabels, Counter>,
    /// Store availability (1 = opened, 0 = degraded).
    store_up: Gauge,
    /// Records in the loaded dataset.
    dataset_records: Gauge,
    /// Dataset reloads counter.
    dataset_reloads_total: Family<ReloadLabels, Counter>,
    /// The prometheus registry.
    registry: Registry,
}

impl MetricsCollector {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let requests_total = Family::<RequestLabels, Counter>::default();
        let request_duration_seconds = Family::<RouteLabels, Histogram>::new_with_constructor(|| {
            // Buckets: 1ms, 2.5ms, 6.25ms, ... up to ~15s
            Histogram::new(exponential_buckets(0.001, 2.5, 11))
        });
        let store_queries_total = Family::<StoreQueryLabels, Counter>::default();
        let store_up = Gauge::default();
        let dataset_records = Gauge::default();
        let dataset_reloads_total = Family::<ReloadLabels, Counter>::default();

        registry.register(
            "worldstats_requests",
            "Total number of API requests processed",
            requests_total.clone(),
        );
        registry.register(
            "worldstats_request_duration_seconds",
            "Request duration in seconds",
            request_duration_seconds.clone(),
        );
        registry.register(
            "worldstats_store_queries",
            "Total number of store queries",
            store_queries_total.clone(),
        );
        registry.register(
            "worldstats_store_up",
            "Whether the configured store was opened (1) or the service is degraded (0)",
            store_up.clone(),
        );
        registry.register(
            "worldstats_dataset_records",
            "Number of records in the loaded dataset",
            dataset_records.clone(),
        );
        registry.register(
            "worldstats_dataset_reloads",
            "Total number of dataset reload attempts",
            dataset_reloads_total.clone(),
        );

        Self {
            inner: Arc::new(MetricsCollectorInner {
                requests_total,
                request_duration_seconds,
                store_queries_total,
                store_up,
                dataset_records,
                dataset_reloads_total,
                registry,
            }),
        }
    }

    /// Get the prometheus registry for encoding.
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Record a completed request.
    pub fn record_request(&self, route: &str, method: &str, status: u16, duration: Duration) {
        let labels = RequestLabels {
            route: route.to_string(),
            method: method.to_string(),
            status: status.to_string(),
        };
        self.inner.requests_total.get_or_create(&labels).inc();

        let route_labels = RouteLabels {
            route: route.to_string(),
        };
        self.inner
            .request_duration_seconds
            .get_or_create(&route_labels)
            .observe(duration.as_secs_f64());
    }

    /// Record a store query outcome.
    pub fn record_store_query(&self, operation: StoreOperation, success: bool) {
        let labels = StoreQueryLabels {
            operation,
            result: if success {
                QueryResult::Success
            } else {
                QueryResult::Failure
            },
        };
        self.inner.store_queries_total.get_or_create(&labels).inc();
    }

    /// Update store availability.
    pub fn set_store_up(&self, up: bool) {
        self.inner.store_up.set(if up { 1 } else { 0 });
    }

    /// Update the dataset record count.
    pub fn set_dataset_records(&self, count: usize) {
        self.inner
            .dataset_records
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Record a dataset reload attempt.
    pub fn record_reload(&self, result: ReloadResult) {
        self.inner
            .dataset_reloads_total
            .get_or_create(&ReloadLabels { result })
            .inc();
    }

    /// Start timing a request.
    pub fn start_request_timer(&self, route: &str) -> RequestTimer {
        RequestTimer {
            collector: self.clone(),
            route: route.to_string(),
            start: Instant::now(),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Timer that records a request when consumed.
pub struct RequestTimer {
    collector: MetricsCollector,
    route: String,
    start: Instant,
}

impl RequestTimer {
    /// Record the request and consume the timer.
    pub fn record(self, method: &str, status: u16) -> Duration {
        let duration = self.start.elapsed();
        self.collector
            .record_request(&self.route, method, status, duration);
        duration
    }
}
