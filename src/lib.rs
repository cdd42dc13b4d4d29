//! Shift Relay - offline-tolerant delivery of attendance badge events.
//!
//! A terminal admits shift events as badges are scanned, delivers them to the
//! attendance service when it can, and otherwise keeps them in a durable
//! local store until a later drain pass delivers them with their original
//! timestamps.

pub mod admission;
pub mod clock;
pub mod config;
pub mod connectivity;
pub mod delivery;
pub mod identity;
pub mod relay;
pub mod scheduler;
pub mod store;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;
