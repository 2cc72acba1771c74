//! HTTP layer: routing, JSON responses, static assets and the listener.

mod response;
mod routes;
mod server;
mod static_files;

pub use response::{error_json, json_response, service_error, status_for, JSON_CONTENT_TYPE};
pub use routes::{dispatch, handle, QueryParams, Route, MEASUREMENTS_PATH, METRICS_PATH};
pub use server::ApiServer;
pub use static_files::{content_type, StaticFiles};
