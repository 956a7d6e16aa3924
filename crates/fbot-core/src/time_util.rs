//! Wall-clock helpers.
//!
//! Exchange timestamps are milliseconds since the Unix epoch; local time is
//! read from `SystemTime` and converted to the same unit so the two can be
//! subtracted directly.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as **milliseconds** since Unix epoch.
#[inline]
pub fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Apply a signed millisecond offset to a timestamp, saturating at zero.
#[inline]
pub fn offset_ms(ts: u64, offset: i64) -> u64 {
    if offset >= 0 { ts.saturating_add(offset as u64) } else { ts.saturating_sub(offset.unsigned_abs()) }
}
