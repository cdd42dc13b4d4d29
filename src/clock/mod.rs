//! Clock reconciliation between device uptime and wall-clock time.
//!
//! The terminal has no battery-backed clock. It only knows how long it has
//! been running. Once a wall-clock source answers, the reconciler records the
//! pair `(uptime, wall time)` and from then on can answer both "what time is
//! it" and "what time was it when uptime read T".
//!
//! # Invariants
//!
//! - While synced, a reading `t` resolves to
//!   `wall_epoch_at_reference + floor((t - monotonic_reference) / 1000)`.
//! - Resolution is clamped to the current uptime, so no reading ever resolves
//!   to a wall time later than "now".
//! - Every successful sync replaces the mapping wholesale. Repeated syncs
//!   correct drift instead of accumulating it.

pub mod source;
pub mod uptime;

use std::time::Duration;

use chrono::{DateTime, Datelike, FixedOffset, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::types::{MonotonicMs, WallTimestamp};

pub use source::{
    ConfiguredTimeSource, HttpDateSource, SystemWallClock, WallTimeError, WallTimeSource,
};
pub use uptime::{ProcessUptime, Uptime};

/// Default number of queries per synchronization.
pub const DEFAULT_SYNC_ATTEMPTS: u32 = 5;

/// Default spacing between queries within one synchronization.
pub const DEFAULT_SYNC_SPACING: Duration = Duration::from_millis(500);

/// Default plausibility floor. A wall time must fall in a later year; clocks
/// reporting this year or earlier were never set.
pub const DEFAULT_MIN_YEAR: i32 = 2023;

/// Errors produced by clock synchronization.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClockError {
    /// No plausible wall time was obtained within the attempt budget.
    #[error("wall time unavailable after {attempts} attempts")]
    Unavailable { attempts: u32 },
}

/// The uptime-to-wall-time mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClockState {
    /// Uptime reading at the moment synchronization last succeeded.
    pub monotonic_reference: MonotonicMs,

    /// Wall-clock seconds since the Unix epoch at `monotonic_reference`.
    pub wall_epoch_at_reference: i64,

    /// Whether a valid mapping exists.
    pub synced: bool,
}

/// Bounds on a single synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPolicy {
    /// Maximum number of source queries.
    pub attempts: u32,

    /// Pause between consecutive queries.
    pub spacing: Duration,

    /// Calendar year a real clock reading must exceed.
    pub min_year: i32,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        SyncPolicy {
            attempts: DEFAULT_SYNC_ATTEMPTS,
            spacing: DEFAULT_SYNC_SPACING,
            min_year: DEFAULT_MIN_YEAR,
        }
    }
}

/// Owns the clock mapping and the uptime counter it is defined against.
#[derive(Debug)]
pub struct ClockReconciler<U> {
    uptime: U,
    state: ClockState,
    policy: SyncPolicy,
    offset: FixedOffset,
}

impl<U: Uptime> ClockReconciler<U> {
    /// Creates an unsynced reconciler reporting timestamps in `offset`.
    pub fn new(uptime: U, policy: SyncPolicy, offset: FixedOffset) -> Self {
        ClockReconciler {
            uptime,
            state: ClockState::default(),
            policy,
            offset,
        }
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn is_synced(&self) -> bool {
        self.state.synced
    }

    /// Current uptime reading.
    pub fn uptime_ms(&self) -> MonotonicMs {
        self.uptime.now_ms()
    }

    pub fn policy(&self) -> &SyncPolicy {
        &self.policy
    }

    /// Queries `source` up to the attempt budget and installs the first
    /// plausible answer as the new mapping.
    ///
    /// On exhaustion the previous mapping (synced or not) is left untouched.
    pub fn synchronize<W: WallTimeSource + ?Sized>(
        &mut self,
        source: &W,
    ) -> Result<ClockState, ClockError> {
        let attempts = self.policy.attempts.max(1);

        for attempt in 1..=attempts {
            match source.query() {
                Ok(wall) if self.is_plausible(&wall) => {
                    let reference = self.uptime.now_ms();
                    self.state = ClockState {
                        monotonic_reference: reference,
                        wall_epoch_at_reference: wall.timestamp(),
                        synced: true,
                    };
                    info!(
                        attempt,
                        wall = %wall.to_rfc3339(),
                        reference = %reference,
                        "Clock synchronized"
                    );
                    return Ok(self.state);
                }
                Ok(wall) => {
                    warn!(
                        attempt,
                        wall = %wall.to_rfc3339(),
                        min_year = self.policy.min_year,
                        "Ignoring implausible wall time"
                    );
                }
                Err(e) => {
                    debug!(attempt, error = %e, "Wall time query failed");
                }
            }

            if attempt < attempts && !self.policy.spacing.is_zero() {
                std::thread::sleep(self.policy.spacing);
            }
        }

        warn!(attempts, synced = self.state.synced, "Clock synchronization exhausted");
        Err(ClockError::Unavailable { attempts })
    }

    /// Resolves an uptime reading to wall time.
    ///
    /// Returns `None` when unsynced, or when the result does not fall after
    /// the plausibility floor year. Readings later than the current uptime (corrupt or
    /// from a previous boot) resolve to "now".
    pub fn resolve(&self, reading: MonotonicMs) -> Option<WallTimestamp> {
        if !self.state.synced {
            return None;
        }

        let clamped = reading.min(self.uptime.now_ms());
        let delta_ms = clamped.offset_from(self.state.monotonic_reference);
        let delta_secs = i64::try_from(delta_ms.div_euclid(1000)).ok()?;
        let secs = self.state.wall_epoch_at_reference.checked_add(delta_secs)?;

        let utc = DateTime::<Utc>::from_timestamp(secs, 0)?;
        let local = utc.with_timezone(&self.offset);
        if local.year() <= self.policy.min_year {
            return None;
        }

        Some(WallTimestamp::new(local))
    }

    /// Wall time for the current uptime reading.
    pub fn now(&self) -> Option<WallTimestamp> {
        self.resolve(self.uptime.now_ms())
    }

    fn is_plausible(&self, wall: &DateTime<Utc>) -> bool {
        wall.with_timezone(&self.offset).year() > self.policy.min_year
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FixedWallSource, ManualUptime, utc};
    use proptest::prelude::*;

    fn policy() -> SyncPolicy {
        SyncPolicy {
            attempts: 3,
            spacing: Duration::ZERO,
            min_year: 2023,
        }
    }

    fn reconciler(uptime: &ManualUptime) -> ClockReconciler<&ManualUptime> {
        ClockReconciler::new(uptime, policy(), FixedOffset::east_opt(0).unwrap())
    }

    #[test]
    fn unsynced_resolves_nothing() {
        let uptime = ManualUptime::new(1_000);
        let clock = reconciler(&uptime);
        assert!(!clock.is_synced());
        assert_eq!(clock.resolve(MonotonicMs(500)), None);
        assert_eq!(clock.now(), None);
    }

    #[test]
    fn sync_installs_mapping() {
        let uptime = ManualUptime::new(10_000);
        let mut clock = reconciler(&uptime);
        let source = FixedWallSource::always(utc(2025, 9, 14, 8, 0, 0));

        let state = clock.synchronize(&source).unwrap();

        assert!(state.synced);
        assert_eq!(state.monotonic_reference, MonotonicMs(10_000));
        assert_eq!(
            state.wall_epoch_at_reference,
            utc(2025, 9, 14, 8, 0, 0).timestamp()
        );
    }

    #[test]
    fn resolves_readings_before_and_after_reference() {
        let uptime = ManualUptime::new(60_000);
        let mut clock = reconciler(&uptime);
        clock
            .synchronize(&FixedWallSource::always(utc(2025, 9, 14, 8, 0, 0)))
            .unwrap();
        uptime.advance(30_000);

        // 59.5 s before the reference floors to a full minute back.
        let before = clock.resolve(MonotonicMs(500)).unwrap();
        assert_eq!(before.epoch_secs(), utc(2025, 9, 14, 7, 59, 0).timestamp());

        let after = clock.resolve(MonotonicMs(70_999)).unwrap();
        assert_eq!(after.epoch_secs(), utc(2025, 9, 14, 8, 0, 10).timestamp());
    }

    #[test]
    fn future_reading_is_clamped_to_now() {
        let uptime = ManualUptime::new(5_000);
        let mut clock = reconciler(&uptime);
        clock
            .synchronize(&FixedWallSource::always(utc(2025, 1, 1, 0, 0, 0)))
            .unwrap();

        let now = clock.now().unwrap();
        let corrupt = clock.resolve(MonotonicMs(u64::MAX)).unwrap();
        assert_eq!(corrupt, now);
    }

    #[test]
    fn exhaustion_keeps_previous_state() {
        let uptime = ManualUptime::new(1_000);
        let mut clock = reconciler(&uptime);
        let good = FixedWallSource::always(utc(2025, 3, 1, 12, 0, 0));
        let before = clock.synchronize(&good).unwrap();

        uptime.advance(5_000);
        let failing = FixedWallSource::failing();
        let result = clock.synchronize(&failing);

        assert_eq!(result, Err(ClockError::Unavailable { attempts: 3 }));
        assert_eq!(failing.calls(), 3);
        assert_eq!(clock.state(), before);
    }

    #[test]
    fn implausible_year_is_rejected() {
        let uptime = ManualUptime::new(1_000);
        let mut clock = reconciler(&uptime);
        // An unset RTC commonly reports the Unix epoch.
        let source = FixedWallSource::always(utc(1970, 1, 1, 0, 0, 5));

        assert!(clock.synchronize(&source).is_err());
        assert!(!clock.is_synced());
    }

    #[test]
    fn answer_in_floor_year_is_rejected() {
        let uptime = ManualUptime::new(1_000);
        let mut clock = reconciler(&uptime);

        let floor = FixedWallSource::always(utc(2023, 12, 31, 23, 59, 59));
        assert_eq!(
            clock.synchronize(&floor),
            Err(ClockError::Unavailable { attempts: 3 })
        );

        let after = FixedWallSource::always(utc(2024, 1, 1, 0, 0, 0));
        assert!(clock.synchronize(&after).is_ok());
    }

    #[test]
    fn retries_until_plausible_answer() {
        let uptime = ManualUptime::new(1_000);
        let mut clock = reconciler(&uptime);
        let source = FixedWallSource::scripted(vec![
            None,
            Some(utc(1970, 1, 1, 0, 0, 0)),
            Some(utc(2025, 6, 1, 9, 30, 0)),
        ]);

        let state = clock.synchronize(&source).unwrap();
        assert_eq!(source.calls(), 3);
        assert_eq!(
            state.wall_epoch_at_reference,
            utc(2025, 6, 1, 9, 30, 0).timestamp()
        );
    }

    #[test]
    fn resync_replaces_rather_than_accumulates() {
        let uptime = ManualUptime::new(0);
        let mut clock = reconciler(&uptime);
        clock
            .synchronize(&FixedWallSource::always(utc(2025, 1, 1, 0, 0, 0)))
            .unwrap();

        // The device clock ran 10 s slow over an hour; the next sync corrects it.
        uptime.advance(3_600_000);
        clock
            .synchronize(&FixedWallSource::always(utc(2025, 1, 1, 1, 0, 10)))
            .unwrap();

        let now = clock.now().unwrap();
        assert_eq!(now.epoch_secs(), utc(2025, 1, 1, 1, 0, 10).timestamp());
    }

    #[test]
    fn resolution_below_year_floor_is_none() {
        let uptime = ManualUptime::new(10 * 86_400_000);
        let mut clock = reconciler(&uptime);
        clock
            .synchronize(&FixedWallSource::always(utc(2024, 1, 3, 0, 0, 0)))
            .unwrap();

        // Ten days before the reference lands in 2023.
        assert_eq!(clock.resolve(MonotonicMs(1)), None);
    }

    #[test]
    fn resolves_across_32_bit_boundary() {
        let past_wrap = u64::from(u32::MAX) + 10_001;
        let uptime = ManualUptime::new(past_wrap);
        let mut clock = reconciler(&uptime);
        clock
            .synchronize(&FixedWallSource::always(utc(2025, 5, 5, 5, 5, 5)))
            .unwrap();

        // A reading taken just before the 32-bit counter would have wrapped.
        let reading = MonotonicMs(u64::from(u32::MAX) - 4_999);
        let resolved = clock.resolve(reading).unwrap();
        assert_eq!(resolved.epoch_secs(), utc(2025, 5, 5, 5, 4, 50).timestamp());
    }

    #[test]
    fn applies_configured_offset() {
        let uptime = ManualUptime::new(0);
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let mut clock = ClockReconciler::new(&uptime, policy(), offset);
        clock
            .synchronize(&FixedWallSource::always(utc(2025, 9, 14, 6, 0, 0)))
            .unwrap();

        assert_eq!(clock.now().unwrap().to_wire(), "2025-09-14T08:00:00");
    }

    proptest! {
        /// No stored reading at or before the current uptime resolves later than now.
        #[test]
        fn no_future_timestamps(
            reference in 0u64..1_000_000_000,
            elapsed in 0u64..1_000_000_000,
            reading in any::<u64>(),
        ) {
            let uptime = ManualUptime::new(reference);
            let mut clock = reconciler(&uptime);
            clock
                .synchronize(&FixedWallSource::always(utc(2025, 1, 1, 0, 0, 0)))
                .unwrap();
            uptime.advance(elapsed);

            let now = clock.resolve(uptime.now_ms()).unwrap();
            if let Some(resolved) = clock.resolve(MonotonicMs(reading)) {
                prop_assert!(resolved <= now);
            }
        }

        /// Two back-to-back syncs against the same answer behave like one.
        #[test]
        fn resync_is_idempotent(
            reference in 0u64..1_000_000_000,
            readings in prop::collection::vec(0u64..2_000_000_000, 1..20),
        ) {
            let source = FixedWallSource::always(utc(2025, 7, 1, 12, 0, 0));

            let uptime_once = ManualUptime::new(reference);
            let mut once = reconciler(&uptime_once);
            once.synchronize(&source).unwrap();

            let uptime_twice = ManualUptime::new(reference);
            let mut twice = reconciler(&uptime_twice);
            twice.synchronize(&source).unwrap();
            twice.synchronize(&source).unwrap();

            prop_assert_eq!(once.state(), twice.state());
            for r in readings {
                prop_assert_eq!(once.resolve(MonotonicMs(r)), twice.resolve(MonotonicMs(r)));
            }
        }
    }
}
