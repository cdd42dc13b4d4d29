//! Typed request bodies and acknowledgement parsing.
//!
//! Bodies are built as structs and serialized with `serde_json`, so quotes
//! or other special characters in a name cannot break the JSON.

use serde::{Deserialize, Serialize};

use crate::types::{Location, SubjectId, WallTimestamp};

/// Body for the primary endpoint. The server records the shift at "now".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShiftRequest<'a> {
    pub employee_name: &'a str,
    pub work_location: &'a str,

    /// The terminal's own view of "now", for server-side diagnostics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_time: Option<String>,
}

impl<'a> ShiftRequest<'a> {
    pub fn new(subject: &'a SubjectId, location: &'a Location, now: Option<&WallTimestamp>) -> Self {
        ShiftRequest {
            employee_name: subject.as_str(),
            work_location: location.as_str(),
            device_time: now.map(WallTimestamp::to_wire),
        }
    }
}

/// Body for the backfill endpoint, carrying the historical timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackfillRequest<'a> {
    pub employee_name: &'a str,
    pub work_location: &'a str,
    pub timestamp: String,
}

impl<'a> BackfillRequest<'a> {
    pub fn new(subject: &'a SubjectId, location: &'a Location, at: &WallTimestamp) -> Self {
        BackfillRequest {
            employee_name: subject.as_str(),
            work_location: location.as_str(),
            timestamp: at.to_wire(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Acknowledgement {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    status: Option<String>,
}

/// Whether a response body carries an explicit success marker:
/// `"success": true` or `"status": "ok"`.
pub fn is_acknowledged(body: &str) -> bool {
    match serde_json::from_str::<Acknowledgement>(body) {
        Ok(ack) => {
            ack.success == Some(true)
                || ack
                    .status
                    .as_deref()
                    .is_some_and(|s| s.eq_ignore_ascii_case("ok"))
        }
        Err(_) => false,
    }
}
