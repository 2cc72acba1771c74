//! In-memory store, optionally loaded from a JSON dataset file.

use crate::model::{DateRange, Field, Measurement, SeriesPoint};
use crate::store::{MeasurementStore, StoreError};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Measurements held in memory as an atomically swappable snapshot.
pub struct MemoryStore {
    records: ArcSwap<Vec<Measurement>>,
    source: Option<PathBuf>,
}

impl MemoryStore {
    /// Create a store over the given records, in storage order.
    pub fn new(records: Vec<Measurement>) -> Self {
        Self {
            records: ArcSwap::from_pointee(records),
            source: None,
        }
    }

    /// Load a store from a JSON file holding an array of measurements.
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let records = read_dataset(path)?;

        Ok(Self {
            records: ArcSwap::from_pointee(records),
            source: Some(path.to_path_buf()),
        })
    }

    /// Replace the whole snapshot. Queries already running keep the old one.
    pub fn replace(&self, records: Vec<Measurement>) {
        self.records.store(Arc::new(records));
    }

    /// Number of records in the current snapshot.
    pub fn len(&self) -> usize {
        self.records.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// File this store was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

/// Read and parse a dataset file.
pub fn read_dataset(path: &Path) -> Result<Vec<Measurement>, StoreError> {
    let contents = std::fs::read_to_string(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&contents).map_err(|source| StoreError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[async_trait]
impl MeasurementStore for MemoryStore {
    async fn find_series(
        &self,
        field: Field,
        range: &DateRange,
    ) -> Result<Vec<SeriesPoint>, StoreError> {
        let records = self.records.load();
        Ok(records
            .iter()
            .filter(|m| range.contains(&m.timestamp))
            .filter_map(|m| SeriesPoint::project(m, field))
            .collect())
    }

    async fn field_values(&self, field: Field) -> Result<Vec<f64>, StoreError> {
        let records = self.records.load();
        Ok(records.iter().filter_map(|m| field.value_of(m)).collect())
    }

    fn describe(&self) -> String {
        match &self.source {
            Some(path) => format!("file:{}", path.display()),
            None => "memory".to_string(),
        }
    }
}
