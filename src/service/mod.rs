//! Query and Metrics services.
//!
//! Both services validate their input before touching the store and convert
//! every store failure into [`ServiceError::Internal`] with a generic message.

mod query;
mod statistics;

pub use query::{QueryService, SeriesQuery};
pub use statistics::{Statistics, StatisticsService};

use crate::model::Field;
use crate::store::StoreError;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

pub(crate) const INVALID_FIELD_MESSAGE: &str =
    "Invalid field specified. Please choose between population, GDP, or lifeExpectancy.";

/// Service outcome taxonomy. Messages are safe to show to clients.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// Malformed or missing input.
    #[error("{0}")]
    Validation(String),

    /// Well-formed request with no matching data.
    #[error("{0}")]
    NotFound(String),

    /// Store failure or anything unanticipated.
    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    /// The client-facing message.
    pub fn message(&self) -> &str {
        match self {
            ServiceError::Validation(m) | ServiceError::NotFound(m) | ServiceError::Internal(m) => m,
        }
    }
}

/// A query parameter as it arrived on the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param<'a> {
    Absent,
    Value(&'a str),
    /// Sent more than once; never a valid field or date.
    Repeated,
}

impl<'a> Param<'a> {
    /// Absent or empty.
    pub fn is_missing(&self) -> bool {
        matches!(self, Param::Absent | Param::Value(""))
    }

    /// The value, if exactly one was sent.
    pub fn single(&self) -> Option<&'a str> {
        match *self {
            Param::Value(v) => Some(v),
            Param::Absent | Param::Repeated => None,
        }
    }
}

impl<'a> From<Option<&'a str>> for Param<'a> {
    fn from(value: Option<&'a str>) -> Self {
        value.map_or(Param::Absent, Param::Value)
    }
}

impl Field {
    /// Parse a raw `field` query parameter.
    pub fn from_param(param: Param<'_>) -> Result<Field, ServiceError> {
        param
            .single()
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| ServiceError::Validation(INVALID_FIELD_MESSAGE.to_string()))
    }
}

/// Run a store call under a deadline. Expiry is reported as a request failure.
pub(crate) async fn with_timeout<T, F>(timeout: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Request(format!(
            "timed out after {}",
            humantime::format_duration(timeout)
        ))),
    }
}
