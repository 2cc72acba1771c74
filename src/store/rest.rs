//! PostgREST-backed store.
//!
//! Reads the measurement table through a PostgREST endpoint (for example a
//! Supabase project). Filtering and ordering are pushed down to the server.

use crate::model::{format_timestamp, parse_timestamp, DateRange, Field, SeriesPoint};
use crate::store::{MeasurementStore, StoreError};
use async_trait::async_trait;
use postgrest::{Builder, Postgrest};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

/// Rows requested per page. The server's `max-rows` may cap pages below this.
const PAGE_SIZE: usize = 1000;

/// A row as returned by PostgREST: the timestamp plus the selected columns.
#[derive(Debug, Deserialize)]
struct Row {
    timestamp: String,
    #[serde(flatten)]
    columns: Map<String, Value>,
}

/// Store reading a PostgREST table.
pub struct PostgrestStore {
    client: Postgrest,
    url: String,
    table: String,
}

impl PostgrestStore {
    /// Build a client for `url` and read one row to check the table.
    ///
    /// This surfaces a bad URL, key, or table name at startup rather than
    /// on the first request.
    pub async fn connect(
        url: &str,
        api_key: Option<&Secret<String>>,
        table: &str,
    ) -> Result<Self, StoreError> {
        let mut client = Postgrest::new(url);
        if let Some(key) = api_key {
            client = client
                .insert_header("apikey", key.expose_secret())
                .insert_header("Authorization", format!("Bearer {}", key.expose_secret()));
        }

        let store = Self {
            client,
            url: url.to_string(),
            table: table.to_string(),
        };

        store
            .fetch(store.client.from(&store.table).select("timestamp").limit(1))
            .await?;

        Ok(store)
    }

    /// Execute a request and decode the JSON array body.
    async fn fetch(&self, request: Builder) -> Result<Vec<Row>, StoreError> {
        let response = request
            .execute()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| StoreError::Decode(e.to_string()))
    }

    /// Page through every row matched by `request`, which must be ordered.
    ///
    /// The first page's length is taken as the server's effective page size,
    /// so a `max-rows` cap smaller than [`PAGE_SIZE`] does not truncate results.
    async fn fetch_all(&self, request: Builder) -> Result<Vec<Row>, StoreError> {
        let mut rows = Vec::new();
        let mut page_size = PAGE_SIZE;

        loop {
            let offset = rows.len();
            let page = self
                .fetch(request.clone().range(offset, offset + PAGE_SIZE - 1))
                .await?;

            if offset == 0 {
                page_size = page.len().clamp(1, PAGE_SIZE);
            }
            let len = page.len();
            rows.extend(page);

            if len < page_size {
                break;
            }
        }

        Ok(rows)
    }
}

/// Extract `field` from a row. A missing key or JSON null means the field is absent.
fn row_value(row: &Row, field: Field) -> Result<Option<f64>, StoreError> {
    match row.columns.get(field.as_str()) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value.as_f64().map(Some).ok_or_else(|| {
            StoreError::Decode(format!("column '{}' is not numeric: {}", field, value))
        }),
    }
}

fn row_point(row: &Row, field: Field) -> Result<Option<SeriesPoint>, StoreError> {
    let Some(value) = row_value(row, field)? else {
        return Ok(None);
    };
    let timestamp = parse_timestamp(&row.timestamp)
        .ok_or_else(|| StoreError::Decode(format!("invalid timestamp '{}'", row.timestamp)))?;

    Ok(Some(SeriesPoint {
        timestamp,
        field,
        value,
    }))
}

#[async_trait]
impl MeasurementStore for PostgrestStore {
    async fn find_series(
        &self,
        field: Field,
        range: &DateRange,
    ) -> Result<Vec<SeriesPoint>, StoreError> {
        let request = self
            .client
            .from(&self.table)
            .select(format!("timestamp,{}", field.as_str()))
            .gte("timestamp", format_timestamp(&range.start()))
            .lte("timestamp", format_timestamp(&range.end()))
            .not("is", field.as_str(), "null")
            .order("timestamp.asc");

        let rows = self.fetch_all(request).await?;
        debug!(table = %self.table, field = %field, rows = rows.len(), "series fetched");

        let mut points = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(point) = row_point(row, field)? {
                points.push(point);
            }
        }
        Ok(points)
    }

    async fn field_values(&self, field: Field) -> Result<Vec<f64>, StoreError> {
        let request = self
            .client
            .from(&self.table)
            .select(format!("timestamp,{}", field.as_str()))
            .not("is", field.as_str(), "null")
            .order("timestamp.asc");

        let rows = self.fetch_all(request).await?;
        debug!(table = %self.table, field = %field, rows = rows.len(), "values fetched");

        let mut values = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(value) = row_value(row, field)? {
                values.push(value);
            }
        }
        Ok(values)
    }

    fn describe(&self) -> String {
        format!("postgrest:{}/{}", self.url.trim_end_matches('/'), self.table)
    }
}
