//! Core domain types for the shift relay.
//!
//! This module contains the value types shared by every relay component,
//! designed to encode invariants via the type system.

pub mod ids;
pub mod time;

pub use ids::{FIELD_DELIMITER, InvalidField, Location, SubjectId};
pub use time::{MonotonicMs, WIRE_TIMESTAMP_FORMAT, WallTimestamp};
