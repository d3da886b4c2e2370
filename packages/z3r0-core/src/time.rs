//! OpenPGP timestamp helpers.
//!
//! OpenPGP stores times as unsigned 32-bit seconds since the Unix epoch.

use chrono::{DateTime, Utc};

/// Returns the current Unix timestamp in seconds.
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Returns the current time as an OpenPGP timestamp.
///
/// Times before the epoch clamp to 0 and times past 2106 clamp to `u32::MAX`.
pub fn now_pgp_timestamp() -> u32 {
    now_timestamp().clamp(0, i64::from(u32::MAX)) as u32
}

/// Formats an OpenPGP timestamp as RFC 3339 UTC.
pub fn format_pgp_timestamp(ts: u32) -> String {
    match DateTime::<Utc>::from_timestamp(i64::from(ts), 0) {
        Some(dt) => dt.to_rfc3339(),
        None => ts.to_string(),
    }
}
