//! End-to-end tests for the worldstats HTTP API.
//!
//! Each test boots the API server on an ephemeral port and speaks raw
//! HTTP/1.1 over TCP.

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::{NamedTempFile, TempDir};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use worldstats::api::{ApiServer, StaticFiles};
use worldstats::config::load_config;
use worldstats::metrics::MetricsCollector;
use worldstats::model::Measurement;
use worldstats::store::{open_store, MeasurementStore, MemoryStore, UnavailableStore};
use worldstats::util::ShutdownSignal;
use worldstats::AppState;

const INVALID_FIELD: &str =
    "Invalid field specified. Please choose between population, GDP, or lifeExpectancy.";

/// GDP values chosen so that mean = 5 and population std dev = 2.
const GDP_VALUES: [f64; 8] = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];

struct TestServer {
    addr: SocketAddr,
    shutdown: ShutdownSignal,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.shutdown();
    }
}

struct Reply {
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
}

impl Reply {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn json(&self) -> Value {
        serde_json::from_str(&self.body)
            .unwrap_or_else(|e| panic!("body is not JSON ({e}): {}", self.body))
    }

    fn error(&self) -> String {
        self.json()["error"].as_str().unwrap().to_string()
    }
}

/// Eight yearly records, 2000 through 2007.
fn sample_records() -> Vec<Measurement> {
    GDP_VALUES
        .iter()
        .enumerate()
        .map(|(i, gdp)| Measurement {
            timestamp: Utc.with_ymd_and_hms(2000 + i as i32, 1, 1, 0, 0, 0).unwrap(),
            population: 1_000.0 + i as f64,
            gdp: *gdp,
            life_expectancy: 60.0 + i as f64,
        })
        .collect()
}

async fn start_with(store: Arc<dyn MeasurementStore>, static_files: Option<StaticFiles>) -> TestServer {
    let state = AppState::new(
        store,
        Duration::from_secs(5),
        static_files,
        MetricsCollector::new(),
    );
    let server = ApiServer::bind("127.0.0.1:0".parse().unwrap(), state)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();

    let shutdown = ShutdownSignal::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move { server.run(rx).await });

    TestServer { addr, shutdown }
}

async fn start() -> TestServer {
    start_with(Arc::new(MemoryStore::new(sample_records())), None).await
}

async fn send(addr: SocketAddr, raw: String) -> Reply {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();

    let mut buf = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut buf))
        .await
        .expect("response timed out")
        .unwrap();

    let text = String::from_utf8(buf).unwrap();
    let (head, body) = text.split_once("\r\n\r\n").unwrap();
    let mut lines = head.split("\r\n");
    let status = lines
        .next()
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|s| s.parse().ok())
        .unwrap();
    let headers = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    Reply {
        status,
        headers,
        body: body.to_string(),
    }
}

async fn request(addr: SocketAddr, method: &str, target: &str) -> Reply {
    send(
        addr,
        format!("{method} {target} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"),
    )
    .await
}

async fn get(addr: SocketAddr, target: &str) -> Reply {
    request(addr, "GET", target).await
}

#[tokio::test]
async fn test_series_is_inclusive_and_ordered() {
    let server = start().await;

    let reply = get(
        server.addr,
        "/api/measurements?field=GDP&start_date=2001-01-01&end_date=2003-01-01",
    )
    .await;

    assert_eq!(reply.status, 200);
    assert!(reply.header("content-type").unwrap().starts_with("application/json"));
    assert_eq!(
        reply.json(),
        json!([
            {"timestamp": "2001-01-01T00:00:00.000Z", "GDP": 4.0},
            {"timestamp": "2002-01-01T00:00:00.000Z", "GDP": 4.0},
            {"timestamp": "2003-01-01T00:00:00.000Z", "GDP": 4.0},
        ])
    );
}

#[tokio::test]
async fn test_series_points_only_carry_requested_field() {
    let server = start().await;

    let reply = get(
        server.addr,
        "/api/measurements?field=lifeExpectancy&start_date=2000&end_date=2007-12-31",
    )
    .await;

    assert_eq!(reply.status, 200);
    let points = reply.json();
    let points = points.as_array().unwrap();
    assert_eq!(points.len(), 8);
    for point in points {
        let object = point.as_object().unwrap();
        assert_eq!(object.len(), 2);
        assert!(object.contains_key("timestamp"));
        assert!(object.contains_key("lifeExpectancy"));
    }
}

#[tokio::test]
async fn test_series_accepts_percent_encoded_timestamps() {
    let server = start().await;

    let reply = get(
        server.addr,
        "/api/measurements?field=population&start_date=2004-01-01T00%3A00%3A00Z&end_date=2004-01-01T00%3A00%3A00.000Z",
    )
    .await;

    assert_eq!(reply.status, 200);
    assert_eq!(
        reply.json(),
        json!([{"timestamp": "2004-01-01T00:00:00.000Z", "population": 1004.0}])
    );
}

#[tokio::test]
async fn test_series_point_round_trips_as_range() {
    let server = start().await;

    let reply = get(
        server.addr,
        "/api/measurements?field=GDP&start_date=2006-06-01&end_date=2007-06-01",
    )
    .await;
    let points = reply.json();
    let point = &points[0];
    let timestamp = point["timestamp"].as_str().unwrap();

    let again = get(
        server.addr,
        &format!("/api/measurements?field=GDP&start_date={timestamp}&end_date={timestamp}"),
    )
    .await;

    assert_eq!(again.status, 200);
    assert_eq!(again.json(), json!([point]));
}

#[tokio::test]
async fn test_series_rejects_unknown_field_before_dates() {
    let server = start().await;

    for target in [
        "/api/measurements?field=foo&start_date=2000-01-01&end_date=2001-01-01",
        "/api/measurements?field=gdp",
        "/api/measurements",
    ] {
        let reply = get(server.addr, target).await;
        assert_eq!(reply.status, 400, "{target}");
        assert_eq!(reply.error(), INVALID_FIELD, "{target}");
    }
}

#[tokio::test]
async fn test_series_date_validation() {
    let server = start().await;

    let reply = get(server.addr, "/api/measurements?field=GDP&start_date=2000-01-01").await;
    assert_eq!(reply.status, 400);
    assert_eq!(
        reply.error(),
        "Missing required query parameters: start_date, end_date"
    );

    let reply = get(
        server.addr,
        "/api/measurements?field=GDP&start_date=yesterday&end_date=2001-01-01",
    )
    .await;
    assert_eq!(reply.status, 400);
    assert_eq!(
        reply.error(),
        "Invalid date format. Please provide dates in a valid format (e.g., YYYY-MM-DD)."
    );

    let reply = get(
        server.addr,
        "/api/measurements?field=GDP&start_date=2005-01-01&end_date=2001-01-01",
    )
    .await;
    assert_eq!(reply.status, 400);
    assert_eq!(reply.error(), "Start date cannot be later than end date.");
}

#[tokio::test]
async fn test_series_empty_range_is_not_found() {
    let server = start().await;

    let reply = get(
        server.addr,
        "/api/measurements?field=GDP&start_date=1990-01-01&end_date=1999-12-31",
    )
    .await;

    assert_eq!(reply.status, 404);
    assert_eq!(reply.error(), "No data found for the specified range and field.");
}

#[tokio::test]
async fn test_repeated_parameters_are_rejected() {
    let server = start().await;

    let reply = get(
        server.addr,
        "/api/measurements?field=population&field=GDP&start_date=2000-01-01&end_date=2000-01-01",
    )
    .await;
    assert_eq!(reply.status, 400);
    assert_eq!(reply.error(), INVALID_FIELD);

    let reply = get(server.addr, "/api/measurements/metrics?field=GDP&field=foo").await;
    assert_eq!(reply.status, 400);
    assert_eq!(reply.error(), INVALID_FIELD);

    let reply = get(
        server.addr,
        "/api/measurements?field=GDP&start_date=2000-01-01&start_date=2001-01-01&end_date=2002-01-01",
    )
    .await;
    assert_eq!(reply.status, 400);
    assert_eq!(
        reply.error(),
        "Invalid date format. Please provide dates in a valid format (e.g., YYYY-MM-DD)."
    );
}

#[tokio::test]
async fn test_metrics_statistics() {
    let server = start().await;

    let reply = get(server.addr, "/api/measurements/metrics?field=GDP").await;

    assert_eq!(reply.status, 200);
    assert_eq!(
        reply.json(),
        json!({"avg": 5.0, "min": 2.0, "max": 9.0, "stdDev": 2.0})
    );
}

#[tokio::test]
async fn test_metrics_near_f64_max_are_numbers() {
    let records = (0..2)
        .map(|i| Measurement {
            timestamp: Utc.with_ymd_and_hms(2000 + i, 1, 1, 0, 0, 0).unwrap(),
            population: 1.0,
            gdp: 1e308,
            life_expectancy: 1.0,
        })
        .collect();
    let server = start_with(Arc::new(MemoryStore::new(records)), None).await;

    let reply = get(server.addr, "/api/measurements/metrics?field=GDP").await;

    assert_eq!(reply.status, 200);
    assert_eq!(
        reply.json(),
        json!({"avg": 1e308, "min": 1e308, "max": 1e308, "stdDev": 0.0})
    );
}

#[tokio::test]
async fn test_metrics_validation_and_not_found() {
    let server = start().await;
    let reply = get(server.addr, "/api/measurements/metrics?field=GNP").await;
    assert_eq!(reply.status, 400);
    assert_eq!(reply.error(), INVALID_FIELD);

    let empty = start_with(Arc::new(MemoryStore::new(Vec::new())), None).await;
    let reply = get(empty.addr, "/api/measurements/metrics?field=population").await;
    assert_eq!(reply.status, 404);
    assert_eq!(reply.error(), "No data found for the specified field.");
}

#[tokio::test]
async fn test_unavailable_store_yields_internal_errors() {
    let server = start_with(Arc::new(UnavailableStore::new("connection refused")), None).await;

    let reply = get(
        server.addr,
        "/api/measurements?field=GDP&start_date=2000-01-01&end_date=2001-01-01",
    )
    .await;
    assert_eq!(reply.status, 500);
    assert_eq!(reply.error(), "Internal server error while fetching data.");

    let reply = get(server.addr, "/api/measurements/metrics?field=GDP").await;
    assert_eq!(reply.status, 500);
    assert_eq!(reply.error(), "Internal server error while calculating metrics.");

    // Validation still runs first
    let reply = get(server.addr, "/api/measurements/metrics?field=nope").await;
    assert_eq!(reply.status, 400);
}

#[tokio::test]
async fn test_non_get_method_not_allowed() {
    let server = start().await;

    let reply = request(server.addr, "POST", "/api/measurements/metrics?field=GDP").await;

    assert_eq!(reply.status, 405);
    assert_eq!(reply.header("allow"), Some("GET"));
    assert_eq!(reply.error(), "Method not allowed");
}

#[tokio::test]
async fn test_unknown_api_path() {
    let server = start().await;

    let reply = get(server.addr, "/api/countries").await;

    assert_eq!(reply.status, 404);
    assert_eq!(reply.json(), json!({"error": "Not found"}));
}

#[tokio::test]
async fn test_request_id_header() {
    let server = start().await;

    let reply = get(server.addr, "/api/measurements/metrics?field=GDP").await;
    assert_eq!(reply.header("x-request-id").unwrap().len(), 36);

    let reply = send(
        server.addr,
        "GET /api/nothing HTTP/1.1\r\nHost: localhost\r\nx-request-id: trace-42\r\nConnection: close\r\n\r\n"
            .to_string(),
    )
    .await;
    assert_eq!(reply.header("x-request-id"), Some("trace-42"));
}

#[tokio::test]
async fn test_static_files() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("index.html"), "<title>worldstats</title>").unwrap();
    std::fs::create_dir(dir.path().join("css")).unwrap();
    std::fs::write(dir.path().join("css").join("style.css"), "body {}").unwrap();

    let server = start_with(
        Arc::new(MemoryStore::new(sample_records())),
        Some(StaticFiles::new(dir.path())),
    )
    .await;

    let reply = get(server.addr, "/").await;
    assert_eq!(reply.status, 200);
    assert_eq!(reply.body, "<title>worldstats</title>");
    assert!(reply.header("content-type").unwrap().starts_with("text/html"));

    let reply = get(server.addr, "/css/style.css").await;
    assert_eq!(reply.status, 200);
    assert!(reply.header("content-type").unwrap().starts_with("text/css"));

    assert_eq!(get(server.addr, "/missing.js").await.status, 404);
    assert_eq!(get(server.addr, "/css/../../secret").await.status, 404);
}

#[tokio::test]
async fn test_static_disabled() {
    let server = start().await;
    assert_eq!(get(server.addr, "/").await.status, 404);
}

#[tokio::test]
async fn test_keep_alive_serves_multiple_requests() {
    let server = start().await;

    let raw = "GET /api/measurements/metrics?field=GDP HTTP/1.1\r\nHost: localhost\r\n\r\n\
               GET /api/measurements/metrics?field=population HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n";
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();

    let mut buf = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut buf))
        .await
        .unwrap()
        .unwrap();
    let text = String::from_utf8(buf).unwrap();

    assert_eq!(text.matches("HTTP/1.1 200 OK").count(), 2);
}

#[tokio::test]
async fn test_server_from_config_file() {
    let mut dataset = NamedTempFile::new().unwrap();
    dataset
        .write_all(
            br#"[
                {"timestamp": "2010-01-01T00:00:00.000Z", "population": 10, "GDP": 1, "lifeExpectancy": 70},
                {"timestamp": {"$date": "2011-01-01T00:00:00.000Z"}, "population": 20, "GDP": 2, "lifeExpectancy": 71}
            ]"#,
        )
        .unwrap();

    let mut config_file = NamedTempFile::new().unwrap();
    write!(
        config_file,
        "server:\n  listen: \"127.0.0.1:0\"\n  query_timeout: 2s\n  static_dir: null\nstore:\n  type: file\n  path: {}\n",
        dataset.path().display()
    )
    .unwrap();

    let config = load_config(config_file.path()).unwrap();
    let opened = open_store(&config.store).await.unwrap();
    let server = start_with(opened.store, None).await;

    let reply = get(server.addr, "/api/measurements/metrics?field=population").await;
    assert_eq!(reply.status, 200);
    assert_eq!(reply.json()["avg"], json!(15.0));

    let reply = get(
        server.addr,
        "/api/measurements?field=lifeExpectancy&start_date=2011-01-01&end_date=2011-01-01",
    )
    .await;
    assert_eq!(
        reply.json(),
        json!([{"timestamp": "2011-01-01T00:00:00.000Z", "lifeExpectancy": 71.0}])
    );
}
