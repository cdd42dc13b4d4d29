//! Retry scheduling for queued events.
//!
//! # State Machine
//!
//! ```text
//!            trigger              pass done
//!   Idle ─────────────▶ Draining ───────────▶ Cooldown
//!    ▲                                           │
//!    └───────────────────────────────────────────┘
//!               next evaluation (immediate)
//! ```
//!
//! A drain is triggered when the terminal is online, the clock is synced, the
//! store is non-empty, and either the immediate-retry flag is raised (by a
//! connectivity or clock transition) or the cooldown has elapsed since the
//! previous pass.
//!
//! A pass loads the whole store, attempts each event whose timestamp can be
//! resolved, and rewrites the store once with everything not delivered, in
//! original order. Only one pass runs at a time; triggers observed while
//! draining are ignored rather than queued.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::clock::{ClockReconciler, Uptime};
use crate::delivery::{DeliveryAttempter, DeliveryTransport};
use crate::store::{EventStore, StoreError};
use crate::types::MonotonicMs;

/// Default minimum spacing between drain passes.
pub const DEFAULT_RETRY_COOLDOWN: Duration = Duration::from_secs(60);

/// Scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Draining,
    Cooldown,
}

/// Facts the scheduler needs to decide whether a pass is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainConditions {
    pub connected: bool,
    pub synced: bool,
    pub pending: usize,
    pub now: MonotonicMs,
}

/// Statistics from one completed pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Network attempts made.
    pub attempted: usize,
    pub delivered: usize,
    /// Events written back to the store.
    pub retained: usize,
    /// Events kept without an attempt because their time could not be resolved.
    pub unresolved: usize,
}

/// Errors that end a pass early.
#[derive(Debug, Error)]
pub enum DrainError {
    /// A pass is already running.
    #[error("a drain pass is already in progress")]
    AlreadyDraining,

    /// The store could not be read or rewritten. It was left as it was.
    #[error("store error during drain: {0}")]
    Store(#[from] StoreError),
}

/// Decides when to drain the store and runs the drain pass.
#[derive(Debug)]
pub struct RetryScheduler {
    state: SchedulerState,
    cooldown: Duration,
    last_pass: Option<MonotonicMs>,
    immediate_retry: bool,
}

impl RetryScheduler {
    pub fn new(cooldown: Duration) -> Self {
        RetryScheduler {
            state: SchedulerState::Idle,
            cooldown,
            last_pass: None,
            immediate_retry: false,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn last_pass(&self) -> Option<MonotonicMs> {
        self.last_pass
    }

    pub fn immediate_retry_pending(&self) -> bool {
        self.immediate_retry
    }

    /// Requests a pass at the next opportunity, bypassing the cooldown.
    pub fn raise_immediate_retry(&mut self) {
        self.immediate_retry = true;
    }

    /// Evaluates the trigger. Moves `Cooldown` back to `Idle` as a side effect.
    pub fn should_drain(&mut self, conditions: &DrainConditions) -> bool {
        match self.state {
            SchedulerState::Draining => return false,
            SchedulerState::Cooldown => self.state = SchedulerState::Idle,
            SchedulerState::Idle => {}
        }

        if !conditions.connected || !conditions.synced || conditions.pending == 0 {
            return false;
        }

        self.immediate_retry || self.cooldown_elapsed(conditions.now)
    }

    fn cooldown_elapsed(&self, now: MonotonicMs) -> bool {
        let cooldown_ms = u64::try_from(self.cooldown.as_millis()).unwrap_or(u64::MAX);
        match self.last_pass {
            None => true,
            Some(last) => now.saturating_since(last) >= cooldown_ms,
        }
    }

    /// Runs one pass over the whole store.
    ///
    /// The store is rewritten exactly once, after every event has been
    /// considered. If loading or rewriting fails, the store is not touched
    /// further and the error is returned; the pass still counts for cooldown.
    #[instrument(skip_all)]
    pub fn drain<T: DeliveryTransport, U: Uptime>(
        &mut self,
        store: &EventStore,
        clock: &ClockReconciler<U>,
        attempter: &DeliveryAttempter<T>,
    ) -> Result<DrainReport, DrainError> {
        if self.state == SchedulerState::Draining {
            debug!("Drain requested while draining, ignoring");
            return Err(DrainError::AlreadyDraining);
        }
        self.state = SchedulerState::Draining;

        let result = Self::pass(store, clock, attempter);

        // Clear the flag on failure too: the cooldown rate-limits retries
        // against a failing medium.
        self.immediate_retry = false;
        self.state = SchedulerState::Cooldown;
        self.last_pass = Some(clock.uptime_ms());

        match &result {
            Ok(report) => info!(
                attempted = report.attempted,
                delivered = report.delivered,
                retained = report.retained,
                unresolved = report.unresolved,
                "Drain pass complete"
            ),
            Err(e) => warn!(error = %e, "Drain pass aborted"),
        }
        result
    }

    fn pass<T: DeliveryTransport, U: Uptime>(
        store: &EventStore,
        clock: &ClockReconciler<U>,
        attempter: &DeliveryAttempter<T>,
    ) -> Result<DrainReport, DrainError> {
        let events = store.load_all()?;
        let mut report = DrainReport::default();
        let mut retained = Vec::with_capacity(events.len());

        for event in events {
            let Some(at) = clock.resolve(event.occurred_at) else {
                debug!(event = %event, "Cannot resolve timestamp, keeping event");
                report.unresolved += 1;
                retained.push(event);
                continue;
            };

            report.attempted += 1;
            if attempter.attempt_retry(&event, at).is_delivered() {
                report.delivered += 1;
            } else {
                retained.push(event);
            }
        }

        store.replace(&retained)?;
        report.retained = retained.len();
        Ok(report)
    }

    /// Evaluates the trigger and, if due, runs a pass.
    ///
    /// Returns `None` when no pass was due.
    pub fn run_if_due<T: DeliveryTransport, U: Uptime>(
        &mut self,
        conditions: &DrainConditions,
        store: &EventStore,
        clock: &ClockReconciler<U>,
        attempter: &DeliveryAttempter<T>,
    ) -> Option<Result<DrainReport, DrainError>> {
        if !self.should_drain(conditions) {
            return None;
        }
        Some(self.drain(store, clock, attempter))
    }
}
