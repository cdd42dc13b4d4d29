//! Time representations: device uptime and reconstructed wall-clock time.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire format for timestamps sent to the backend (local time, no offset suffix).
pub const WIRE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A device uptime reading in milliseconds since process start.
///
/// Readings are widened to 64 bits, so the counter does not wrap within any
/// realistic uptime. Arithmetic between readings saturates instead of
/// wrapping.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MonotonicMs(pub u64);

impl MonotonicMs {
    /// Milliseconds elapsed from `earlier` to `self`, or zero if `earlier` is later.
    pub fn saturating_since(self, earlier: MonotonicMs) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    /// Signed millisecond distance from `reference` to `self`.
    pub fn offset_from(self, reference: MonotonicMs) -> i128 {
        i128::from(self.0) - i128::from(reference.0)
    }
}

impl fmt::Display for MonotonicMs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

impl From<u64> for MonotonicMs {
    fn from(ms: u64) -> Self {
        MonotonicMs(ms)
    }
}

/// A resolved wall-clock instant in the terminal's configured UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WallTimestamp(DateTime<FixedOffset>);

impl WallTimestamp {
    pub fn new(at: DateTime<FixedOffset>) -> Self {
        WallTimestamp(at)
    }

    /// Seconds since the Unix epoch.
    pub fn epoch_secs(&self) -> i64 {
        self.0.timestamp()
    }

    /// Formats the timestamp the way the attendance backend expects it.
    pub fn to_wire(&self) -> String {
        self.0.format(WIRE_TIMESTAMP_FORMAT).to_string()
    }
}

impl fmt::Display for WallTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
