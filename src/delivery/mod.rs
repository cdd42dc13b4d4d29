//! Delivery of shift events to the attendance service.
//!
//! Two logical endpoints exist:
//!
//! ```text
//! primary   POST {employee_name, work_location}             - shift at "now"
//! backfill  POST {employee_name, work_location, timestamp}  - shift at a past instant
//! ```
//!
//! Each attempt is one network exchange. This module never touches the store
//! or the display; it only reports what happened.

pub mod payload;
pub mod transport;

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::{ClockReconciler, Uptime};
use crate::store::StoredEvent;
use crate::types::{Location, SubjectId, WallTimestamp};

pub use payload::{BackfillRequest, ShiftRequest, is_acknowledged};
pub use transport::{DeliveryTransport, HttpTransport, TransportError, TransportResponse};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest response excerpt included in logs.
const LOG_BODY_LIMIT: usize = 100;

/// Result of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The service acknowledged the event.
    Delivered,

    /// The service answered, but did not acknowledge the event.
    Rejected,

    /// No interpretable response (transport failure or timeout).
    Unreachable,
}

impl DeliveryOutcome {
    pub fn is_delivered(self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }
}

/// The two endpoint URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub primary: String,
    pub backfill: String,
}

/// Turns events into requests and responses into outcomes.
#[derive(Debug)]
pub struct DeliveryAttempter<T> {
    transport: T,
    endpoints: Endpoints,
    timeout: Duration,
}

impl<T: DeliveryTransport> DeliveryAttempter<T> {
    pub fn new(transport: T, endpoints: Endpoints, timeout: Duration) -> Self {
        DeliveryAttempter {
            transport,
            endpoints,
            timeout,
        }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Sends a fresh event to the primary endpoint.
    ///
    /// Requires a synced clock; without one nothing is sent and the attempt
    /// counts as not delivered.
    pub fn attempt_immediate<U: Uptime>(
        &self,
        subject: &SubjectId,
        location: &Location,
        clock: &ClockReconciler<U>,
    ) -> DeliveryOutcome {
        let Some(now) = clock.now() else {
            warn!(subject = %subject, "Clock not synced, skipping immediate delivery");
            return DeliveryOutcome::Unreachable;
        };

        let request = ShiftRequest::new(subject, location, Some(&now));
        let outcome = self.send(&self.endpoints.primary, &request);
        info!(subject = %subject, ?outcome, "Immediate delivery attempt");
        outcome
    }

    /// Sends a stored event to the backfill endpoint with its resolved timestamp.
    pub fn attempt_retry(&self, event: &StoredEvent, at: WallTimestamp) -> DeliveryOutcome {
        let request = BackfillRequest::new(&event.subject_id, &event.location, &at);
        let outcome = self.send(&self.endpoints.backfill, &request);
        debug!(event = %event, timestamp = %at, ?outcome, "Backfill delivery attempt");
        outcome
    }

    fn send<B: Serialize>(&self, url: &str, body: &B) -> DeliveryOutcome {
        let body = match serde_json::to_string(body) {
            Ok(body) => body,
            Err(e) => {
                // Plain string fields cannot fail to serialize, but never panic here.
                warn!(error = %e, "Failed to encode request body");
                return DeliveryOutcome::Rejected;
            }
        };

        match self.transport.post_json(url, &body, self.timeout) {
            Ok(resp) => interpret(&resp),
            Err(e) => {
                warn!(url, error = %e, "Delivery transport failure");
                DeliveryOutcome::Unreachable
            }
        }
    }
}

/// Delivered only on a 2xx status AND an explicit success marker in the body.
pub fn interpret(resp: &TransportResponse) -> DeliveryOutcome {
    if resp.is_success_status() && is_acknowledged(&resp.body) {
        return DeliveryOutcome::Delivered;
    }

    let excerpt: String = resp.body.chars().take(LOG_BODY_LIMIT).collect();
    warn!(status = resp.status, body = %excerpt, "Delivery rejected");
    DeliveryOutcome::Rejected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SyncPolicy;
    use crate::test_utils::{FixedWallSource, ManualUptime, ScriptedTransport, event, utc};
    use chrono::FixedOffset;

    fn endpoints() -> Endpoints {
        Endpoints {
            primary: "http://relay.test/api/shift_by_name".to_string(),
            backfill: "http://relay.test/api/shift_by_name/backfill".to_string(),
        }
    }

    fn synced_clock(uptime: &ManualUptime) -> ClockReconciler<&ManualUptime> {
        let mut clock = ClockReconciler::new(
            uptime,
            SyncPolicy {
                attempts: 1,
                spacing: Duration::ZERO,
                min_year: 2024,
            },
            FixedOffset::east_opt(0).unwrap(),
        );
        clock
            .synchronize(&FixedWallSource::always(utc(2025, 9, 14, 8, 0, 0)))
            .unwrap();
        clock
    }

    #[test]
    fn interpret_requires_status_and_marker() {
        let ok = TransportResponse::new(200, r#"{"success": true}"#);
        assert_eq!(interpret(&ok), DeliveryOutcome::Delivered);

        let no_marker = TransportResponse::new(200, "Shift updated");
        assert_eq!(interpret(&no_marker), DeliveryOutcome::Rejected);

        let error_with_marker = TransportResponse::new(500, r#"{"success": true}"#);
        assert_eq!(interpret(&error_with_marker), DeliveryOutcome::Rejected);
    }

    #[test]
    fn immediate_posts_to_primary_endpoint() {
        let uptime = ManualUptime::new(1_000);
        let clock = synced_clock(&uptime);
        let transport = ScriptedTransport::always_ok();
        let attempter = DeliveryAttempter::new(&transport, endpoints(), DEFAULT_REQUEST_TIMEOUT);

        let subject = SubjectId::new("Alice").unwrap();
        let location = Location::new("Zoo").unwrap();
        let outcome = attempter.attempt_immediate(&subject, &location, &clock);

        assert_eq!(outcome, DeliveryOutcome::Delivered);
        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, endpoints().primary);
        let body: serde_json::Value = serde_json::from_str(&requests[0].body).unwrap();
        assert_eq!(body["employee_name"], "Alice");
        assert_eq!(body["work_location"], "Zoo");
        assert_eq!(body["device_time"], "2025-09-14T08:00:00");
    }

    #[test]
    fn immediate_without_clock_sends_nothing() {
        let uptime = ManualUptime::new(1_000);
        let clock = ClockReconciler::new(
            &uptime,
            SyncPolicy::default(),
            FixedOffset::east_opt(0).unwrap(),
        );
        let transport = ScriptedTransport::always_ok();
        let attempter = DeliveryAttempter::new(&transport, endpoints(), DEFAULT_REQUEST_TIMEOUT);

        let outcome = attempter.attempt_immediate(
            &SubjectId::new("Bob").unwrap(),
            &Location::new("Zoo").unwrap(),
            &clock,
        );

        assert_eq!(outcome, DeliveryOutcome::Unreachable);
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn retry_posts_historical_timestamp_to_backfill() {
        let uptime = ManualUptime::new(61_000);
        let clock = synced_clock(&uptime);
        let transport = ScriptedTransport::always_ok();
        let attempter = DeliveryAttempter::new(&transport, endpoints(), DEFAULT_REQUEST_TIMEOUT);

        let stored = event("Alice", "Zoo", 1_000);
        let at = clock.resolve(stored.occurred_at).unwrap();
        let outcome = attempter.attempt_retry(&stored, at);

        assert_eq!(outcome, DeliveryOutcome::Delivered);
        let requests = transport.requests();
        assert_eq!(requests[0].url, endpoints().backfill);
        let body: serde_json::Value = serde_json::from_str(&requests[0].body).unwrap();
        assert_eq!(body["timestamp"], "2025-09-14T07:59:00");
    }

    #[test]
    fn transport_failure_is_unreachable() {
        let uptime = ManualUptime::new(1_000);
        let clock = synced_clock(&uptime);
        let transport = ScriptedTransport::always_unreachable();
        let attempter = DeliveryAttempter::new(&transport, endpoints(), DEFAULT_REQUEST_TIMEOUT);

        let at = clock.now().unwrap();
        let outcome = attempter.attempt_retry(&event("Alice", "Zoo", 5), at);
        assert_eq!(outcome, DeliveryOutcome::Unreachable);
    }

    #[test]
    fn passes_configured_timeout() {
        let uptime = ManualUptime::new(1_000);
        let clock = synced_clock(&uptime);
        let transport = ScriptedTransport::always_ok();
        let timeout = Duration::from_millis(1_234);
        let attempter = DeliveryAttempter::new(&transport, endpoints(), timeout);

        attempter.attempt_retry(&event("Alice", "Zoo", 5), clock.now().unwrap());
        assert_eq!(transport.requests()[0].timeout, timeout);
    }
}
