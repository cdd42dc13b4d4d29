//! Admission of freshly scanned shift events.
//!
//! Decides between sending immediately and queuing:
//!
//! 1. Invalid identity: rejected before any store or network access.
//! 2. Offline or clock unsynced: appended to the store.
//! 3. Otherwise one immediate attempt; anything short of `Delivered` is
//!    appended to the store.
//!
//! Every valid event is therefore either acknowledged or durably queued when
//! this returns (unless the store itself fails). A success response lost in
//! transit leads to a later duplicate delivery. The backend has no
//! deduplication key, so that duplicate is accepted.

use thiserror::Error;
use tracing::{error, info};

use crate::clock::{ClockReconciler, Uptime};
use crate::delivery::{DeliveryAttempter, DeliveryOutcome, DeliveryTransport};
use crate::store::{EventStore, StoreError, StoredEvent};
use crate::types::{InvalidField, Location, MonotonicMs, SubjectId};

/// What happened to an admitted event.
#[derive(Debug)]
pub enum AdmissionOutcome {
    /// Acknowledged by the service.
    Delivered,

    /// Queued without a network attempt (offline or clock unknown).
    Queued,

    /// The immediate attempt failed; queued for retry.
    QueuedForRetry(DeliveryOutcome),

    /// The store could not persist the event. It is gone.
    Lost(StoreError),
}

impl AdmissionOutcome {
    /// Short status line for the terminal display.
    pub fn status_line(&self) -> &'static str {
        match self {
            AdmissionOutcome::Delivered => "Shift recorded",
            AdmissionOutcome::Queued => "Saved offline",
            AdmissionOutcome::QueuedForRetry(_) => "Saved, will retry",
            AdmissionOutcome::Lost(_) => "Storage error!",
        }
    }
}

/// Input rejected before any side effect.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("invalid identity: {0}")]
    InvalidIdentity(InvalidField),
}

/// Everything admission needs from the terminal's context.
pub struct Admission<'a, T, U> {
    pub attempter: &'a DeliveryAttempter<T>,
    pub store: &'a EventStore,
    pub clock: &'a ClockReconciler<U>,
    pub connected: bool,
}

impl<T: DeliveryTransport, U: Uptime> Admission<'_, T, U> {
    /// Admits one event scanned at uptime `occurred_at`.
    pub fn admit(
        &self,
        subject: &str,
        location: &str,
        occurred_at: MonotonicMs,
    ) -> Result<AdmissionOutcome, AdmissionError> {
        let subject = SubjectId::new(subject).map_err(AdmissionError::InvalidIdentity)?;
        let location = Location::new(location).map_err(AdmissionError::InvalidIdentity)?;

        if !self.connected || !self.clock.is_synced() {
            info!(
                subject = %subject,
                connected = self.connected,
                synced = self.clock.is_synced(),
                "Cannot deliver now, queuing"
            );
            return Ok(self.enqueue(subject, location, occurred_at, AdmissionOutcome::Queued));
        }

        match self.attempter.attempt_immediate(&subject, &location, self.clock) {
            DeliveryOutcome::Delivered => Ok(AdmissionOutcome::Delivered),
            failed => Ok(self.enqueue(
                subject,
                location,
                occurred_at,
                AdmissionOutcome::QueuedForRetry(failed),
            )),
        }
    }

    fn enqueue(
        &self,
        subject: SubjectId,
        location: Location,
        occurred_at: MonotonicMs,
        queued: AdmissionOutcome,
    ) -> AdmissionOutcome {
        // A zero reading is reserved as malformed in the record format.
        let occurred_at = occurred_at.max(MonotonicMs(1));
        let event = StoredEvent::new(subject, location, occurred_at);

        match self.store.append(&event) {
            Ok(()) => queued,
            Err(e) => {
                error!(event = %event, error = %e, "Failed to queue event, event lost");
                AdmissionOutcome::Lost(e)
            }
        }
    }
}
