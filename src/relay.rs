//! The relay context owned by the terminal's control loop.
//!
//! [`Relay`] holds all mutable state the subsystem needs: the clock mapping,
//! the last observed connectivity, the resync bookkeeping and the retry
//! scheduler. The host loop calls [`Relay::tick`] once per iteration with the
//! current connectivity, and [`Relay::on_scan`] whenever a badge yields an
//! identity. Both run to completion before returning, so a drain pass and an
//! admission never touch the store at the same time.
//!
//! # Triggers
//!
//! | Observation | Effect |
//! | --- | --- |
//! | connectivity false to true | resync, raise immediate retry |
//! | clock unsynced to synced | raise immediate retry |
//! | unsynced and resync interval elapsed (while connected) | resync |
//! | [`Relay::request_resync`] | resync on the next connected tick |

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::admission::{Admission, AdmissionError, AdmissionOutcome};
use crate::clock::{ClockReconciler, Uptime, WallTimeSource};
use crate::config::RelayConfig;
use crate::delivery::{DeliveryAttempter, DeliveryTransport};
use crate::scheduler::{DrainConditions, DrainReport, RetryScheduler};
use crate::store::{CleanupReport, EventStore, StoreError};
use crate::types::{Location, MonotonicMs};

/// What one evaluation of the loop did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub connected: bool,
    pub synced: bool,
    /// Events in the store before any drain pass.
    pub pending: usize,
    pub sync_attempted: bool,
    pub drain: Option<DrainReport>,
}

/// State and collaborators of the offline-tolerant relay.
pub struct Relay<T, U, W> {
    location: Location,
    store: EventStore,
    clock: ClockReconciler<U>,
    attempter: DeliveryAttempter<T>,
    time_source: W,
    scheduler: RetryScheduler,
    connected: bool,
    resync_requested: bool,
    last_sync_attempt: Option<MonotonicMs>,
    resync_interval: Duration,
}

impl<T, U, W> Relay<T, U, W>
where
    T: DeliveryTransport,
    U: Uptime,
    W: WallTimeSource,
{
    pub fn new(config: &RelayConfig, transport: T, uptime: U, time_source: W) -> Self {
        Relay {
            location: config.location.clone(),
            store: EventStore::new(&config.store_path),
            clock: ClockReconciler::new(uptime, config.sync, config.utc_offset),
            attempter: DeliveryAttempter::new(
                transport,
                config.endpoints.clone(),
                config.request_timeout,
            ),
            time_source,
            scheduler: RetryScheduler::new(config.retry_cooldown),
            connected: false,
            resync_requested: false,
            last_sync_attempt: None,
            resync_interval: config.resync_interval,
        }
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    pub fn clock(&self) -> &ClockReconciler<U> {
        &self.clock
    }

    pub fn scheduler(&self) -> &RetryScheduler {
        &self.scheduler
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Startup maintenance: purges malformed records before any retry runs.
    pub fn start(&mut self) -> Result<CleanupReport, StoreError> {
        let report = self.store.cleanup()?;
        info!(
            path = %self.store.path().display(),
            pending = report.kept,
            dropped = report.dropped,
            "Relay started"
        );
        Ok(report)
    }

    /// Asks for a clock resync on the next connected tick.
    pub fn request_resync(&mut self) {
        self.resync_requested = true;
    }

    /// One evaluation of the control loop.
    pub fn tick(&mut self, connected: bool) -> TickReport {
        self.observe_connectivity(connected);

        let now = self.clock.uptime_ms();
        let sync_attempted = connected && self.sync_due(now);
        if sync_attempted {
            self.synchronize(now);
        }

        let pending = match self.store.count() {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "Failed to count pending events");
                0
            }
        };

        let conditions = DrainConditions {
            connected,
            synced: self.clock.is_synced(),
            pending,
            now: self.clock.uptime_ms(),
        };
        let drain = self
            .scheduler
            .run_if_due(&conditions, &self.store, &self.clock, &self.attempter)
            .and_then(Result::ok);

        TickReport {
            connected,
            synced: conditions.synced,
            pending,
            sync_attempted,
            drain,
        }
    }

    /// Admits a scan taken now at this terminal's location.
    pub fn on_scan(&self, subject: &str) -> Result<AdmissionOutcome, AdmissionError> {
        self.admit_at(subject, self.clock.uptime_ms())
    }

    /// Admits a scan taken at uptime `occurred_at`.
    pub fn admit_at(
        &self,
        subject: &str,
        occurred_at: MonotonicMs,
    ) -> Result<AdmissionOutcome, AdmissionError> {
        let admission = Admission {
            attempter: &self.attempter,
            store: &self.store,
            clock: &self.clock,
            connected: self.connected,
        };
        admission.admit(subject, self.location.as_str(), occurred_at)
    }

    fn observe_connectivity(&mut self, connected: bool) {
        match (self.connected, connected) {
            (false, true) => {
                info!("Connectivity restored");
                self.resync_requested = true;
                self.scheduler.raise_immediate_retry();
            }
            (true, false) => info!("Connectivity lost"),
            _ => {}
        }
        self.connected = connected;
    }

    fn sync_due(&self, now: MonotonicMs) -> bool {
        if self.resync_requested {
            return true;
        }
        if self.clock.is_synced() {
            return false;
        }
        let interval_ms = u64::try_from(self.resync_interval.as_millis()).unwrap_or(u64::MAX);
        match self.last_sync_attempt {
            None => true,
            Some(last) => now.saturating_since(last) >= interval_ms,
        }
    }

    fn synchronize(&mut self, now: MonotonicMs) {
        let was_synced = self.clock.is_synced();
        self.last_sync_attempt = Some(now);
        self.resync_requested = false;

        match self.clock.synchronize(&self.time_source) {
            Ok(_) if !was_synced => {
                debug!("Clock became known, raising immediate retry");
                self.scheduler.raise_immediate_retry();
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Clock synchronization failed"),
        }
    }
}
