//! Metrics Service: aggregate statistics over a whole field.

use crate::metrics::{MetricsCollector, StoreOperation};
use crate::model::Field;
use crate::service::{with_timeout, Param, ServiceError};
use crate::store::MeasurementStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

const NOT_FOUND_MESSAGE: &str = "No data found for the specified field.";
const INTERNAL_MESSAGE: &str = "Internal server error while calculating metrics.";

/// Summary statistics for one field.
///
/// `std_dev` is the population standard deviation (divisor `n`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Statistics {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    #[serde(rename = "stdDev")]
    pub std_dev: f64,
}

impl Statistics {
    /// Compute statistics over `values`, or `None` if there are none.
    ///
    /// Values near `f64::MAX` are handled by rescaling, so finite input only
    /// yields a non-finite result if the answer itself is out of range.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let (avg, std_dev) = match moments(values, 1.0) {
            (avg, std_dev) if avg.is_finite() && std_dev.is_finite() => (avg, std_dev),
            _ => moments(values, min.abs().max(max.abs())),
        };

        Some(Self {
            avg,
            min,
            max,
            std_dev,
        })
    }

    /// All four figures are finite and can be sent as JSON numbers.
    pub fn is_finite(&self) -> bool {
        self.avg.is_finite() && self.min.is_finite() && self.max.is_finite() && self.std_dev.is_finite()
    }
}

/// Two-pass mean and population standard deviation, computed on `values / scale`.
fn moments(values: &[f64], scale: f64) -> (f64, f64) {
    let n = values.len() as f64;
    let avg = values.iter().map(|v| v / scale).sum::<f64>() / n;
    let variance = values
        .iter()
        .map(|v| (v / scale - avg).powi(2))
        .sum::<f64>()
        / n;
    (avg * scale, variance.sqrt() * scale)
}

/// Computes [`Statistics`] from the store.
#[derive(Clone)]
pub struct StatisticsService {
    store: Arc<dyn MeasurementStore>,
    timeout: Duration,
    metrics: MetricsCollector,
}

impl StatisticsService {
    pub fn new(store: Arc<dyn MeasurementStore>, timeout: Duration, metrics: MetricsCollector) -> Self {
        Self {
            store,
            timeout,
            metrics,
        }
    }

    /// Statistics over every stored value of the requested field.
    ///
    /// `field` is the raw query parameter; it is validated before the store is
    /// touched.
    pub async fn get_statistics(&self, field: Param<'_>) -> Result<Statistics, ServiceError> {
        let field = Field::from_param(field)?;
        self.statistics_for(field).await
    }

    /// Statistics for an already-validated field.
    pub async fn statistics_for(&self, field: Field) -> Result<Statistics, ServiceError> {
        let result = with_timeout(self.timeout, self.store.field_values(field)).await;
        self.metrics.record_store_query(StoreOperation::FieldValues, result.is_ok());

        let values = result.map_err(|e| {
            error!(error = %e, store = %self.store.describe(), field = %field, "metrics query failed");
            ServiceError::Internal(INTERNAL_MESSAGE.to_string())
        })?;

        debug!(field = %field, values = values.len(), "computing statistics");

        let stats = Statistics::from_values(&values)
            .ok_or_else(|| ServiceError::NotFound(NOT_FOUND_MESSAGE.to_string()))?;

        if !stats.is_finite() {
            error!(field = %field, values = values.len(), "statistics out of range");
            return Err(ServiceError::Internal(INTERNAL_MESSAGE.to_string()));
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Measurement;
    use crate::store::{MemoryStore, UnavailableStore};
    use crate::service::INVALID_FIELD_MESSAGE;
    use chrono::{TimeZone, Utc};

    fn service(store: Arc<dyn MeasurementStore>) -> StatisticsService {
        StatisticsService::new(store, Duration::from_secs(5), MetricsCollector::new())
    }

    fn store_with_populations(values: &[f64]) -> Arc<dyn MeasurementStore> {
        let records = values
            .iter()
            .enumerate()
            .map(|(i, &population)| Measurement {
                timestamp: Utc.with_ymd_and_hms(2000 + i as i32, 1, 1, 0, 0, 0).unwrap(),
                population,
                gdp: 1.0,
                life_expectancy: 1.0,
            })
            .collect();
        Arc::new(MemoryStore::new(records))
    }

    #[test]
    fn test_population_standard_deviation() {
        let stats = Statistics::from_values(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(stats.avg, 5.0);
        assert_eq!(stats.min, 2.0);
        assert_eq!(stats.max, 9.0);
        assert_eq!(stats.std_dev, 2.0);
    }

    #[test]
    fn test_single_value() {
        let stats = Statistics::from_values(&[10.0]).unwrap();
        assert_eq!(
            stats,
            Statistics {
                avg: 10.0,
                min: 10.0,
                max: 10.0,
                std_dev: 0.0
            }
        );
    }

    #[test]
    fn test_values_near_f64_max() {
        let stats = Statistics::from_values(&[1e308, 1e308]).unwrap();
        assert!(stats.is_finite());
        assert_eq!(stats.avg, 1e308);
        assert_eq!(stats.min, 1e308);
        assert_eq!(stats.max, 1e308);
        assert_eq!(stats.std_dev, 0.0);

        let stats = Statistics::from_values(&[-1e308, 1e308, 1e308, -1e308]).unwrap();
        assert!(stats.is_finite());
        assert_eq!(stats.avg, 0.0);
        assert_eq!(stats.std_dev, 1e308);
    }

    #[test]
    fn test_empty_values() {
        assert!(Statistics::from_values(&[]).is_none());
    }

    #[test]
    fn test_negative_values() {
        let stats = Statistics::from_values(&[-3.0, 3.0]).unwrap();
        assert_eq!(stats.avg, 0.0);
        assert_eq!(stats.min, -3.0);
        assert_eq!(stats.max, 3.0);
        assert_eq!(stats.std_dev, 3.0);
    }

    #[test]
    fn test_serializes_with_wire_names() {
        let stats = Statistics::from_values(&[1.0, 3.0]).unwrap();
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json, serde_json::json!({"avg": 2.0, "min": 1.0, "max": 3.0, "stdDev": 1.0}));
    }

    #[tokio::test]
    async fn test_get_statistics() {
        let svc = service(store_with_populations(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]));
        let stats = svc.get_statistics(Param::Value("population")).await.unwrap();
        assert_eq!(stats.avg, 5.0);
        assert_eq!(stats.std_dev, 2.0);
    }

    #[tokio::test]
    async fn test_invalid_field_is_validation_error() {
        let svc = service(store_with_populations(&[1.0]));
        assert!(matches!(
            svc.get_statistics(Param::Value("foo")).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            svc.get_statistics(Param::Absent).await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_field_never_reaches_store() {
        let svc = service(Arc::new(UnavailableStore::new("down")));
        assert!(matches!(
            svc.get_statistics(Param::Value("foo")).await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_large_values_serialize_as_numbers() {
        let svc = service(store_with_populations(&[1e308, 1e308]));
        let stats = svc.get_statistics(Param::Value("population")).await.unwrap();
        let json = serde_json::to_value(stats).unwrap();
        assert!(json["avg"].is_number());
        assert!(json["stdDev"].is_number());
    }

    #[tokio::test]
    async fn test_repeated_field_is_validation_error() {
        let svc = service(store_with_populations(&[1.0]));
        assert_eq!(
            svc.get_statistics(Param::Repeated).await,
            Err(ServiceError::Validation(INVALID_FIELD_MESSAGE.to_string()))
        );
    }

    #[tokio::test]
    async fn test_empty_store_is_not_found() {
        let svc = service(store_with_populations(&[]));
        let err = svc.get_statistics(Param::Value("GDP")).await.unwrap_err();
        assert_eq!(err, ServiceError::NotFound(NOT_FOUND_MESSAGE.to_string()));
    }

    #[tokio::test]
    async fn test_store_failure_is_internal() {
        let svc = service(Arc::new(UnavailableStore::new("down")));
        let err = svc.get_statistics(Param::Value("GDP")).await.unwrap_err();
        assert_eq!(err, ServiceError::Internal(INTERNAL_MESSAGE.to_string()));
    }
}
