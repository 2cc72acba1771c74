//! JSON response helpers and service-error mapping.

use crate::service::ServiceError;
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use serde::Serialize;
use tracing::error;

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

const SERIALIZE_FAILURE_BODY: &str = r#"{"error":"Internal server error."}"#;

/// Body of every error response.
#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

/// HTTP status for a service outcome.
pub fn status_for(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
        ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Serialize `value` as a JSON response with the given status.
pub fn json_response<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(body) => build(status, Bytes::from(body)),
        Err(e) => {
            error!(error = %e, "failed to serialize response body");
            build(
                StatusCode::INTERNAL_SERVER_ERROR,
                Bytes::from_static(SERIALIZE_FAILURE_BODY.as_bytes()),
            )
        }
    }
}

/// `{"error": message}` with the given status.
pub fn error_json(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(status, &ErrorBody { error: message })
}

/// Map a service error onto its status code and client message.
pub fn service_error(err: &ServiceError) -> Response<Full<Bytes>> {
    error_json(status_for(err), err.message())
}

fn build(status: StatusCode, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
    response
}
