//! Time helpers.
//!
//! Issue and forum records store epoch seconds; event records store epoch
//! milliseconds.

use chrono::Utc;

/// Current time as epoch seconds.
#[must_use]
pub fn now_ts() -> i64 {
    Utc::now().timestamp()
}

/// Current time as epoch milliseconds.
#[must_use]
pub fn now_ts_ms() -> i64 {
    Utc::now().timestamp_millis()
}
