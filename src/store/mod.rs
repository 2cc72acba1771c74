//! Measurement storage.
//!
//! The services only see the [`MeasurementStore`] trait. Backends are chosen
//! from configuration at startup and the resulting handle is injected into the
//! services, so tests can run against an in-memory store.

mod memory;
mod rest;
mod watcher;

pub use memory::MemoryStore;
pub use rest::PostgrestStore;
pub use watcher::DatasetWatcher;

use crate::config::{StoreConfig, StoreKind};
use crate::model::{DateRange, Field, SeriesPoint};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Errors raised by store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read dataset '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse dataset '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("store request failed: {0}")]
    Request(String),

    #[error("store responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed store row: {0}")]
    Decode(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store misconfigured: {0}")]
    Config(String),
}

/// Read-only access to the measurement collection.
///
/// Implementations apply the field-existence filter: records lacking `field`
/// never appear in results.
#[async_trait]
pub trait MeasurementStore: Send + Sync {
    /// Records whose timestamp lies in `range` (inclusive), projected onto `field`.
    async fn find_series(&self, field: Field, range: &DateRange)
        -> Result<Vec<SeriesPoint>, StoreError>;

    /// Every stored value of `field`.
    async fn field_values(&self, field: Field) -> Result<Vec<f64>, StoreError>;

    /// Short human-readable description for logs.
    fn describe(&self) -> String;
}

/// Store used when the configured backend could not be opened.
///
/// Every query fails, which the services surface as an internal error.
pub struct UnavailableStore {
    reason: String,
}

impl UnavailableStore {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl MeasurementStore for UnavailableStore {
    async fn find_series(
        &self,
        _field: Field,
        _range: &DateRange,
    ) -> Result<Vec<SeriesPoint>, StoreError> {
        Err(StoreError::Unavailable(self.reason.clone()))
    }

    async fn field_values(&self, _field: Field) -> Result<Vec<f64>, StoreError> {
        Err(StoreError::Unavailable(self.reason.clone()))
    }

    fn describe(&self) -> String {
        format!("unavailable ({})", self.reason)
    }
}

/// A freshly opened store.
pub struct OpenedStore {
    /// Handle shared by the services.
    pub store: Arc<dyn MeasurementStore>,
    /// Set for file-backed stores, which can be reloaded in place.
    pub reloadable: Option<Arc<MemoryStore>>,
}

/// Open the backend described by `config`.
pub async fn open_store(config: &StoreConfig) -> Result<OpenedStore, StoreError> {
    match config.kind {
        StoreKind::File => {
            let path = config
                .path
                .as_ref()
                .ok_or_else(|| StoreError::Config("store.path is required for file stores".into()))?;
            let store = Arc::new(MemoryStore::load_file(path)?);
            info!(path = %path.display(), records = store.len(), "dataset loaded");

            Ok(OpenedStore {
                store: Arc::clone(&store) as Arc<dyn MeasurementStore>,
                reloadable: Some(store),
            })
        }
        StoreKind::Postgrest => {
            let url = config
                .url
                .as_deref()
                .ok_or_else(|| StoreError::Config("store.url is required for postgrest stores".into()))?;
            let store = PostgrestStore::connect(url, config.api_key.as_ref(), &config.table).await?;
            info!(url = %url, table = %config.table, "connected to postgrest");

            Ok(OpenedStore {
                store: Arc::new(store),
                reloadable: None,
            })
        }
    }
}
