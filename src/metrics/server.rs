//! Prometheus metrics HTTP server.
//!
//! Serves metrics and a liveness check on a separate address from the API.

use crate::metrics::MetricsCollector;
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus_client::encoding::text::encode;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Prometheus metrics HTTP server.
pub struct MetricsServer {
    /// Address to bind.
    address: SocketAddr,
    /// Path for metrics endpoint.
    path: String,
    /// Metrics collector.
    collector: MetricsCollector,
}

impl MetricsServer {
    /// Create a new metrics server.
    pub fn new(address: SocketAddr, path: String, collector: MetricsCollector) -> Self {
        Self {
            address,
            path,
            collector,
        }
    }

    /// Run the metrics server until shutdown.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let listener = match TcpListener::bind(self.address).await {
            Ok(l) => l,
            Err(e) => {
                error!(error = %e, address = %self.address, "failed to bind metrics server");
                return;
            }
        };

        info!(address = %self.address, path = %self.path, "metrics server started");

        let collector = Arc::new(self.collector);
        let path = Arc::new(self.path);

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, _addr)) => {
                            let collector = Arc::clone(&collector);
                            let path = Arc::clone(&path);

                            tokio::spawn(async move {
                                let io = TokioIo::new(stream);
                                let service = service_fn(move |req| {
                                    let collector = Arc::clone(&collector);
                                    let path = Arc::clone(&path);
                                    async move {
                                        handle_request(req, &collector, &path).await
                                    }
                                });

                                if let Err(e) = http1::Builder::new()
                                    .serve_connection(io, service)
                                    .await
                                {
                                    debug!(error = %e, "metrics connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept metrics connection");
                        }
                    }
                }

                _ = shutdown.recv() => {
                    info!("metrics server shutting down");
                    break;
                }
            }
        }
    }
}

fn text_response(status: StatusCode, content_type: &'static str, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// Handle an incoming metrics request.
async fn handle_request<B>(
    req: Request<B>,
    collector: &MetricsCollector,
    metrics_path: &str,
) -> Result<Response<Full<Bytes>>, Infallible> {
    Ok(route(req.method(), req.uri().path(), collector, metrics_path))
}

fn route(
    method: &Method,
    path: &str,
    collector: &MetricsCollector,
    metrics_path: &str,
) -> Response<Full<Bytes>> {
    debug!(path = %path, method = %method, "metrics request");

    if method != Method::GET {
        return text_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "text/plain",
            "Method not allowed\n".to_string(),
        );
    }

    if path == metrics_path {
        let mut buffer = String::new();
        if let Err(e) = encode(&mut buffer, collector.registry()) {
            error!(error = %e, "failed to encode metrics");
            return text_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "text/plain",
                "Failed to encode metrics\n".to_string(),
            );
        }
        text_response(StatusCode::OK, PROMETHEUS_CONTENT_TYPE, buffer)
    } else if path == "/health" || path == "/healthz" {
        text_response(StatusCode::OK, "text/plain", "OK\n".to_string())
    } else if path == "/" {
        let body = format!(
            "worldstats metrics server\n\nEndpoints:\n  {} - Prometheus metrics\n  /health - Health check\n",
            metrics_path
        );
        text_response(StatusCode::OK, "text/plain", body)
    } else {
        text_response(StatusCode::NOT_FOUND, "text/plain", "Not found\n".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_string(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_metrics_server_new() {
        let collector = MetricsCollector::new();
        let server = MetricsServer::new(
            "127.0.0.1:9090".parse().unwrap(),
            "/metrics".to_string(),
            collector,
        );
        assert_eq!(server.address, "127.0.0.1:9090".parse().unwrap());
        assert_eq!(server.path, "/metrics");
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let collector = MetricsCollector::new();
        collector.record_request("measurements", "GET", 200, std::time::Duration::from_millis(10));

        let response = route(&Method::GET, "/metrics", &collector, "/metrics");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            PROMETHEUS_CONTENT_TYPE
        );

        let body = body_string(response).await;
        assert!(body.contains("worldstats_requests"));
    }

    #[test]
    fn test_health_and_unknown_paths() {
        let collector = MetricsCollector::new();
        assert_eq!(
            route(&Method::GET, "/health", &collector, "/metrics").status(),
            StatusCode::OK
        );
        assert_eq!(
            route(&Method::GET, "/nope", &collector, "/metrics").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            route(&Method::POST, "/metrics", &collector, "/metrics").status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
    }
}
