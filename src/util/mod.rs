//! Utility functions and helpers.

mod logging;
mod request_id;
mod shutdown;

pub use logging::{build_filter, init_logging};
pub use request_id::{generate_request_id, generate_short_request_id, RequestId, REQUEST_ID_HEADER};
pub use shutdown::ShutdownSignal;
