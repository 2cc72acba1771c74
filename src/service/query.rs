//! Query Service: field values over an inclusive date range.

use crate::metrics::{MetricsCollector, StoreOperation};
use crate::model::{parse_timestamp, DateRange, Field, SeriesPoint};
use crate::service::{with_timeout, Param, ServiceError};
use crate::store::MeasurementStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

const MISSING_DATES_MESSAGE: &str = "Missing required query parameters: start_date, end_date";
const INVALID_DATE_MESSAGE: &str =
    "Invalid date format. Please provide dates in a valid format (e.g., YYYY-MM-DD).";
const INVERTED_RANGE_MESSAGE: &str = "Start date cannot be later than end date.";
const NOT_FOUND_MESSAGE: &str = "No data found for the specified range and field.";
const INTERNAL_MESSAGE: &str = "Internal server error while fetching data.";

/// A validated series request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesQuery {
    pub field: Field,
    pub range: DateRange,
}

impl SeriesQuery {
    /// Validate raw query parameters.
    ///
    /// Checks run in order: field, date presence, date syntax, range order.
    /// Empty strings count as missing; a repeated date is malformed.
    pub fn from_params(
        field: Param<'_>,
        start_date: Param<'_>,
        end_date: Param<'_>,
    ) -> Result<Self, ServiceError> {
        let field = Field::from_param(field)?;

        if start_date.is_missing() || end_date.is_missing() {
            return Err(ServiceError::Validation(MISSING_DATES_MESSAGE.to_string()));
        }

        let start = start_date.single().and_then(parse_timestamp);
        let end = end_date.single().and_then(parse_timestamp);
        let (Some(start), Some(end)) = (start, end) else {
            return Err(ServiceError::Validation(INVALID_DATE_MESSAGE.to_string()));
        };

        let range = DateRange::new(start, end)
            .ok_or_else(|| ServiceError::Validation(INVERTED_RANGE_MESSAGE.to_string()))?;

        Ok(Self { field, range })
    }
}

/// Retrieves time series from the store.
#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn MeasurementStore>,
    timeout: Duration,
    metrics: MetricsCollector,
}

impl QueryService {
    pub fn new(store: Arc<dyn MeasurementStore>, timeout: Duration, metrics: MetricsCollector) -> Self {
        Self {
            store,
            timeout,
            metrics,
        }
    }

    /// Validate raw parameters and fetch the matching series.
    pub async fn get_series(
        &self,
        field: Param<'_>,
        start_date: Param<'_>,
        end_date: Param<'_>,
    ) -> Result<Vec<SeriesPoint>, ServiceError> {
        let query = SeriesQuery::from_params(field, start_date, end_date)?;
        self.series_for(&query).await
    }

    /// Fetch the series for an already-validated query, oldest first.
    ///
    /// Points sharing a timestamp keep the order the store returned them in.
    pub async fn series_for(&self, query: &SeriesQuery) -> Result<Vec<SeriesPoint>, ServiceError> {
        let result = with_timeout(self.timeout, self.store.find_series(query.field, &query.range)).await;
        self.metrics.record_store_query(StoreOperation::FindSeries, result.is_ok());

        let mut points = result.map_err(|e| {
            error!(
                error = %e,
                store = %self.store.describe(),
                field = %query.field,
                "series query failed"
            );
            ServiceError::Internal(INTERNAL_MESSAGE.to_string())
        })?;

        if points.is_empty() {
            return Err(ServiceError::NotFound(NOT_FOUND_MESSAGE.to_string()));
        }

        points.sort_by_key(|p| p.timestamp);
        debug!(field = %query.field, points = points.len(), "series fetched");

        Ok(points)
    }
}
