//! Configuration data types.

use secrecy::Secret;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Global settings
    #[serde(default)]
    pub global: GlobalConfig,

    /// API server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Measurement store settings
    #[serde(default)]
    pub store: StoreConfig,
}

impl Config {
    /// Override the port of the API listen address.
    pub fn apply_port(&mut self, port: u16) {
        self.server.listen.set_port(port);
    }
}

/// Global configuration settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GlobalConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::Json,
            metrics: MetricsConfig::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Metrics endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// Whether metrics endpoint is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Address to bind metrics server
    #[serde(default = "default_metrics_address")]
    pub address: SocketAddr,

    /// Path for metrics endpoint
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: default_metrics_address(),
            path: default_metrics_path(),
        }
    }
}

/// API server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Address and port to listen on
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Directory holding the client page; `null` disables static serving
    #[serde(default = "default_static_dir")]
    pub static_dir: Option<PathBuf>,

    /// Deadline for a single store query
    #[serde(default = "default_query_timeout", with = "humantime_serde")]
    pub query_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            static_dir: default_static_dir(),
            query_timeout: default_query_timeout(),
        }
    }
}

/// Store backend type.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// JSON dataset file loaded into memory
    #[default]
    File,
    /// Table read through a PostgREST endpoint
    Postgrest,
}

/// Measurement store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Backend type: file or postgrest
    #[serde(default, rename = "type")]
    pub kind: StoreKind,

    /// Dataset path (file stores)
    #[serde(default = "default_dataset_path")]
    pub path: Option<PathBuf>,

    /// Reload the dataset when the file changes (file stores)
    #[serde(default)]
    pub watch: bool,

    /// PostgREST base URL (postgrest stores)
    #[serde(default)]
    pub url: Option<String>,

    /// PostgREST API key (postgrest stores)
    #[serde(default)]
    pub api_key: Option<Secret<String>>,

    /// Table holding the measurements (postgrest stores)
    #[serde(default = "default_table")]
    pub table: String,

    /// Exit at startup if the store cannot be opened instead of running degraded
    #[serde(default)]
    pub required: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::File,
            path: default_dataset_path(),
            watch: false,
            url: None,
            api_key: None,
            table: default_table(),
            required: false,
        }
    }
}

impl StoreConfig {
    /// Point the store at a connection URI.
    ///
    /// `http://` and `https://` URIs select a PostgREST store; anything else is
    /// a dataset path, optionally prefixed with `file://`.
    pub fn apply_uri(&mut self, uri: &str) {
        let uri = uri.trim();
        if uri.starts_with("http://") || uri.starts_with("https://") {
            self.kind = StoreKind::Postgrest;
            self.url = Some(uri.to_string());
        } else {
            self.kind = StoreKind::File;
            self.path = Some(PathBuf::from(uri.strip_prefix("file://").unwrap_or(uri)));
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Json
}

fn default_true() -> bool {
    true
}

fn default_metrics_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9090))
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3000))
}

fn default_static_dir() -> Option<PathBuf> {
    Some(PathBuf::from("public"))
}

fn default_query_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_dataset_path() -> Option<PathBuf> {
    Some(PathBuf::from("data/worldbank.json"))
}

fn default_table() -> String {
    "worldbank".to_string()
}

/// Custom serde module for humantime durations.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
