//! Nanosecond-precision timestamps.
//!
//! [`Timestamp`] wraps a `u64` representing nanoseconds since the Unix epoch.
//! Snapshots are ordered by it, and calendar features (hour, minute,
//! weekday) are derived from it through [`Timestamp::to_datetime`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Nanosecond-precision wall-clock timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Capture the current wall-clock time.
    pub fn now() -> Self {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        Self(nanos.max(0) as u64)
    }

    /// Create a timestamp from milliseconds since the epoch.
    #[inline]
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms * 1_000_000)
    }

    /// Create a timestamp from whole seconds since the epoch.
    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs * 1_000_000_000)
    }

    /// Convert to milliseconds since the epoch.
    #[inline]
    pub const fn to_millis(&self) -> u64 {
        self.0 / 1_000_000
    }

    /// Returns the raw nanosecond value.
    #[inline]
    pub const fn as_nanos(&self) -> u64 {
        self.0
    }

    /// Calendar view of this timestamp in UTC.
    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.0 as i64)
    }

    /// Elapsed nanoseconds from `earlier` to `self`, saturating at zero.
    #[inline]
    pub const fn elapsed_since(&self, earlier: &Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0 / 1_000_000_000;
        let nanos = self.0 % 1_000_000_000;
        write!(f, "{}.{:09}", secs, nanos)
    }
}
