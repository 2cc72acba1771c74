//! Domain types: indicator fields, measurements, and time ranges.

mod field;
mod measurement;
mod time;

pub use field::{Accessor, Field, UnknownField};
pub use measurement::{Measurement, SeriesPoint};
pub use time::{format_timestamp, parse_timestamp, DateRange};
