//! The stored event and its line-oriented record format.
//!
//! One event per line, three pipe-delimited fields:
//!
//! ```text
//! <subject_id>|<location>|<occurred_at_monotonic_ms>
//! ```
//!
//! Values cannot contain `|` or line breaks. [`SubjectId`] and [`Location`]
//! reject such values at construction, so every event that can be built can
//! also be written.

use std::fmt;

use thiserror::Error;

use crate::types::{FIELD_DELIMITER, Location, MonotonicMs, SubjectId};

/// A shift event awaiting delivery.
///
/// Never mutated once created: a retry either removes it from the store or
/// writes it back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoredEvent {
    pub subject_id: SubjectId,
    pub location: Location,

    /// Uptime at the moment of the originating scan, not at storage time.
    pub occurred_at: MonotonicMs,
}

impl StoredEvent {
    pub fn new(subject_id: SubjectId, location: Location, occurred_at: MonotonicMs) -> Self {
        StoredEvent {
            subject_id,
            location,
            occurred_at,
        }
    }

    /// Encodes the event as one record line, including the trailing newline.
    pub fn to_line(&self) -> Result<String, MalformedRecord> {
        if self.occurred_at.0 == 0 {
            return Err(MalformedRecord::ZeroMonotonic);
        }
        Ok(format!(
            "{}{d}{}{d}{}\n",
            self.subject_id,
            self.location,
            self.occurred_at.0,
            d = FIELD_DELIMITER
        ))
    }

    /// Parses one record line (without its newline).
    pub fn parse_line(line: &str) -> Result<Self, MalformedRecord> {
        let fields: Vec<&str> = line.split(FIELD_DELIMITER).collect();
        let [subject, location, occurred_at] = fields.as_slice() else {
            return Err(MalformedRecord::FieldCount(fields.len()));
        };

        let subject_id = SubjectId::new(*subject).map_err(|_| MalformedRecord::EmptySubject)?;
        let location = Location::new(*location).map_err(|_| MalformedRecord::EmptyLocation)?;
        let ms: u64 = occurred_at
            .trim()
            .parse()
            .map_err(|_| MalformedRecord::BadMonotonic(occurred_at.to_string()))?;
        if ms == 0 {
            return Err(MalformedRecord::ZeroMonotonic);
        }

        Ok(StoredEvent::new(subject_id, location, MonotonicMs(ms)))
    }
}

impl fmt::Display for StoredEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {} ({})", self.subject_id, self.location, self.occurred_at)
    }
}

/// Why a persisted line was not accepted as a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedRecord {
    #[error("expected 3 fields, found {0}")]
    FieldCount(usize),

    #[error("empty subject_id")]
    EmptySubject,

    #[error("empty location")]
    EmptyLocation,

    #[error("non-numeric monotonic field {0:?}")]
    BadMonotonic(String),

    #[error("zero monotonic field")]
    ZeroMonotonic,

    #[error("line is not valid UTF-8")]
    NotUtf8,
}
