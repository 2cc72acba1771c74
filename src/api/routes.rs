//! Request routing for the API and client page.

use crate::api::response::{error_json, json_response, service_error};
use crate::service::Param;
use crate::state::AppState;
use crate::util::{RequestId, REQUEST_ID_HEADER};
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, ALLOW, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use std::collections::HashMap;
use std::convert::Infallible;
use tracing::{info, warn};

pub const MEASUREMENTS_PATH: &str = "/api/measurements";
pub const METRICS_PATH: &str = "/api/measurements/metrics";

const API_PREFIX: &str = "/api";
const NOT_FOUND_MESSAGE: &str = "Not found";
const METHOD_NOT_ALLOWED_MESSAGE: &str = "Method not allowed";

/// Route label used for request metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Measurements,
    Metrics,
    Static,
    NotFound,
}

impl Route {
    /// Classify a request path. A single trailing slash is ignored.
    pub fn classify(path: &str) -> Self {
        let trimmed = if path.len() > 1 {
            path.strip_suffix('/').unwrap_or(path)
        } else {
            path
        };

        match trimmed {
            MEASUREMENTS_PATH => Route::Measurements,
            METRICS_PATH => Route::Metrics,
            p if p == API_PREFIX || p.starts_with("/api/") => Route::NotFound,
            _ => Route::Static,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Measurements => "measurements",
            Route::Metrics => "metrics",
            Route::Static => "static",
            Route::NotFound => "not_found",
        }
    }
}

/// Decoded query parameters, keeping every occurrence of a key.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct QueryParams(HashMap<String, Vec<String>>);

impl QueryParams {
    pub fn parse(query: Option<&str>) -> Self {
        let mut params: HashMap<String, Vec<String>> = HashMap::new();
        if let Some(query) = query {
            for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
                params.entry(key.into_owned()).or_default().push(value.into_owned());
            }
        }
        Self(params)
    }

    /// `key` as the services see it; a key sent twice is [`Param::Repeated`].
    pub fn param(&self, key: &str) -> Param<'_> {
        match self.0.get(key).map(Vec::as_slice) {
            None | Some([]) => Param::Absent,
            Some([value]) => Param::Value(value),
            Some(_) => Param::Repeated,
        }
    }
}

/// hyper service entry point: route, tag with a request ID, record and log.
pub async fn handle<B>(req: Request<B>, state: AppState) -> Result<Response<Full<Bytes>>, Infallible> {
    let request_id = RequestId::from_header(req.headers().get(REQUEST_ID_HEADER));
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let route = Route::classify(&path);
    let timer = state.metrics().start_request_timer(route.as_str());

    let mut response = dispatch(&method, route, &path, req.uri().query(), &state).await;

    if let Some(value) = request_id.header_value() {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    let status = response.status();
    let duration = timer.record(method.as_str(), status.as_u16());

    if status.is_server_error() {
        warn!(
            request_id = %request_id,
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms = duration.as_millis(),
            "request failed"
        );
    } else {
        info!(
            request_id = %request_id,
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms = duration.as_millis(),
            "request completed"
        );
    }

    Ok(response)
}

/// Produce the response for an already-classified request.
pub async fn dispatch(
    method: &Method,
    route: Route,
    path: &str,
    query: Option<&str>,
    state: &AppState,
) -> Response<Full<Bytes>> {
    match route {
        Route::Measurements | Route::Metrics if method != Method::GET => method_not_allowed(),
        Route::Measurements => {
            let params = QueryParams::parse(query);
            match state
                .query()
                .get_series(
                    params.param("field"),
                    params.param("start_date"),
                    params.param("end_date"),
                )
                .await
            {
                Ok(points) => json_response(StatusCode::OK, &points),
                Err(e) => service_error(&e),
            }
        }
        Route::Metrics => {
            let params = QueryParams::parse(query);
            match state.statistics().get_statistics(params.param("field")).await {
                Ok(stats) => json_response(StatusCode::OK, &stats),
                Err(e) => service_error(&e),
            }
        }
        Route::NotFound => error_json(StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE),
        Route::Static => {
            if method != Method::GET {
                return plain_not_found();
            }
            match state.static_files() {
                Some(files) => match files.serve(path).await {
                    Some(response) => response,
                    None => plain_not_found(),
                },
                None => plain_not_found(),
            }
        }
    }
}

fn method_not_allowed() -> Response<Full<Bytes>> {
    let mut response = error_json(StatusCode::METHOD_NOT_ALLOWED, METHOD_NOT_ALLOWED_MESSAGE);
    response
        .headers_mut()
        .insert(ALLOW, HeaderValue::from_static("GET"));
    response
}

fn plain_not_found() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(b"Not Found")));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
