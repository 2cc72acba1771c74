//! Request ID generation for request tracing.
//!
//! Every API response carries an `x-request-id` header. A well-formed ID sent
//! by the client (or a proxy in front of us) is echoed back; otherwise one is
//! generated.

use hyper::header::HeaderValue;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Header used to propagate request IDs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest client-supplied ID that is accepted.
const MAX_INCOMING_LEN: usize = 128;

/// Counter for short request IDs.
static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a new UUID-based request ID.
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generate a short request ID based on a counter.
///
/// Only unique within a single process.
/// Format: `req-{counter}` where counter is zero-padded to 16 hex digits.
pub fn generate_short_request_id() -> String {
    let count = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("req-{:016x}", count)
}

/// Request ID wrapper that can be included in tracing spans.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestId(String);

impl RequestId {
    /// Create a new random request ID.
    pub fn new() -> Self {
        Self(generate_request_id())
    }

    /// Create a new short request ID.
    pub fn short() -> Self {
        Self(generate_short_request_id())
    }

    /// Reuse an incoming header value if it is a sane token, else generate a UUID.
    pub fn from_header(value: Option<&HeaderValue>) -> Self {
        value
            .and_then(|v| v.to_str().ok())
            .filter(|s| is_acceptable(s))
            .map(|s| Self(s.to_string()))
            .unwrap_or_default()
    }

    /// Get the request ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The ID as a response header value.
    pub fn header_value(&self) -> Option<HeaderValue> {
        HeaderValue::from_str(&self.0).ok()
    }
}

fn is_acceptable(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= MAX_INCOMING_LEN
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b':'))
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for RequestId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
