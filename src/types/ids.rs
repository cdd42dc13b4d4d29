//! Newtype wrappers for the identity fields carried by a shift event.
//!
//! These types prevent accidental mixing of an employee name with a work
//! location and guarantee, at construction time, that the value can be
//! written to the pipe-delimited event store without corrupting it.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Field delimiter of the persisted record format.
pub const FIELD_DELIMITER: char = '|';

/// Rejection reasons for identity fields.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidField {
    /// The value is empty.
    #[error("{field} is empty")]
    Empty { field: &'static str },

    /// The value contains a character the record format cannot represent.
    #[error("{field} contains reserved character {ch:?}")]
    ReservedChar { field: &'static str, ch: char },
}

fn validate(field: &'static str, value: &str) -> Result<(), InvalidField> {
    if value.is_empty() {
        return Err(InvalidField::Empty { field });
    }

    // The store has no escaping: a delimiter or line break would split the record.
    if let Some(ch) = value
        .chars()
        .find(|c| *c == FIELD_DELIMITER || *c == '\n' || *c == '\r')
    {
        return Err(InvalidField::ReservedChar { field, ch });
    }

    Ok(())
}

/// The resolved identity of the person who scanned a card (the employee name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubjectId(String);

impl SubjectId {
    /// Creates a subject ID, rejecting empty values and reserved characters.
    pub fn new(s: impl Into<String>) -> Result<Self, InvalidField> {
        let s = s.into();
        validate("subject_id", &s)?;
        Ok(SubjectId(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for SubjectId {
    type Error = InvalidField;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        SubjectId::new(s)
    }
}

impl From<SubjectId> for String {
    fn from(id: SubjectId) -> Self {
        id.0
    }
}

/// Free-text work location reported alongside every shift event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Location(String);

impl Location {
    pub fn new(s: impl Into<String>) -> Result<Self, InvalidField> {
        let s = s.into();
        validate("location", &s)?;
        Ok(Location(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Location {
    type Error = InvalidField;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Location::new(s)
    }
}

impl From<Location> for String {
    fn from(loc: Location) -> Self {
        loc.0
    }
}
