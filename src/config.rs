//! Relay configuration.
//!
//! Everything is read from `SHIFT_RELAY_*` environment variables. The endpoint
//! and the work location are required; every other value has a default, and
//! an unparseable numeric value falls back to its default rather than
//! stopping the terminal.
//!
//! | Variable | Default |
//! | --- | --- |
//! | `SHIFT_RELAY_ENDPOINT` | required |
//! | `SHIFT_RELAY_BACKFILL_ENDPOINT` | `<endpoint>/backfill` |
//! | `SHIFT_RELAY_LOCATION` | required |
//! | `SHIFT_RELAY_STORE_PATH` | `pending_events.log` |
//! | `SHIFT_RELAY_TIME_URL` | the endpoint (`system` uses the host clock) |
//! | `SHIFT_RELAY_REQUEST_TIMEOUT_MS` | 5000 |
//! | `SHIFT_RELAY_RETRY_COOLDOWN_SECS` | 60 |
//! | `SHIFT_RELAY_RESYNC_INTERVAL_SECS` | 300 |
//! | `SHIFT_RELAY_SYNC_ATTEMPTS` | 5 |
//! | `SHIFT_RELAY_SYNC_SPACING_MS` | 500 |
//! | `SHIFT_RELAY_MIN_YEAR` | 2023 (wall time must be later) |
//! | `SHIFT_RELAY_UTC_OFFSET_SECS` | 0 |
//! | `SHIFT_RELAY_TICK_MS` | 1000 |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use thiserror::Error;
use tracing::warn;

use crate::clock::{DEFAULT_MIN_YEAR, DEFAULT_SYNC_ATTEMPTS, DEFAULT_SYNC_SPACING, SyncPolicy};
use crate::delivery::{DEFAULT_REQUEST_TIMEOUT, Endpoints};
use crate::scheduler::DEFAULT_RETRY_COOLDOWN;
use crate::types::{InvalidField, Location};

/// Default event store file, relative to the working directory.
const DEFAULT_STORE_PATH: &str = "pending_events.log";

/// Default interval between resync attempts while the clock is unknown (5 minutes).
const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 300;

/// Default period of the host loop.
const DEFAULT_TICK_MS: u64 = 1000;

/// Suffix appended to the primary endpoint when no backfill URL is given.
const BACKFILL_SUFFIX: &str = "/backfill";

/// Configuration errors. Only required values can fail.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("required setting {0} is not set")]
    Missing(&'static str),

    #[error("setting {var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Everything the relay needs to run.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub endpoints: Endpoints,

    /// Work location reported with every event from this terminal.
    pub location: Location,

    pub store_path: PathBuf,

    /// URL whose `Date` response header is the wall-time source, or `system`.
    pub time_url: String,

    /// Per-request timeout for deliveries and time queries.
    pub request_timeout: Duration,

    /// Minimum spacing between drain passes.
    pub retry_cooldown: Duration,

    /// How often to retry synchronization while the clock is unknown.
    pub resync_interval: Duration,

    pub sync: SyncPolicy,

    /// Offset in which backfill timestamps are expressed.
    pub utc_offset: FixedOffset,

    /// Period of the host loop.
    pub tick: Duration,
}

impl RelayConfig {
    /// Creates a configuration with defaults for everything but the required values.
    pub fn new(endpoint: impl Into<String>, location: Location) -> Self {
        let endpoint = endpoint.into();
        RelayConfig {
            endpoints: Endpoints {
                backfill: default_backfill(&endpoint),
                primary: endpoint.clone(),
            },
            location,
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            time_url: endpoint,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry_cooldown: DEFAULT_RETRY_COOLDOWN,
            resync_interval: Duration::from_secs(DEFAULT_RESYNC_INTERVAL_SECS),
            sync: SyncPolicy::default(),
            utc_offset: utc(),
            tick: Duration::from_millis(DEFAULT_TICK_MS),
        }
    }

    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = required(&lookup, "SHIFT_RELAY_ENDPOINT")?;
        let location = Location::new(required(&lookup, "SHIFT_RELAY_LOCATION")?).map_err(
            |e: InvalidField| ConfigError::Invalid {
                var: "SHIFT_RELAY_LOCATION",
                reason: e.to_string(),
            },
        )?;

        let defaults = RelayConfig::new(endpoint, location);

        let offset_secs: i32 = numeric(&lookup, "SHIFT_RELAY_UTC_OFFSET_SECS", 0);
        let utc_offset = FixedOffset::east_opt(offset_secs).unwrap_or_else(|| {
            warn!(offset_secs, "UTC offset out of range, using UTC");
            utc()
        });

        Ok(RelayConfig {
            endpoints: Endpoints {
                primary: defaults.endpoints.primary.clone(),
                backfill: optional(&lookup, "SHIFT_RELAY_BACKFILL_ENDPOINT")
                    .unwrap_or(defaults.endpoints.backfill),
            },
            store_path: optional(&lookup, "SHIFT_RELAY_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.store_path),
            time_url: optional(&lookup, "SHIFT_RELAY_TIME_URL").unwrap_or(defaults.time_url),
            request_timeout: Duration::from_millis(numeric(
                &lookup,
                "SHIFT_RELAY_REQUEST_TIMEOUT_MS",
                millis(DEFAULT_REQUEST_TIMEOUT),
            )),
            retry_cooldown: Duration::from_secs(numeric(
                &lookup,
                "SHIFT_RELAY_RETRY_COOLDOWN_SECS",
                DEFAULT_RETRY_COOLDOWN.as_secs(),
            )),
            resync_interval: Duration::from_secs(numeric(
                &lookup,
                "SHIFT_RELAY_RESYNC_INTERVAL_SECS",
                DEFAULT_RESYNC_INTERVAL_SECS,
            )),
            sync: SyncPolicy {
                attempts: numeric(&lookup, "SHIFT_RELAY_SYNC_ATTEMPTS", DEFAULT_SYNC_ATTEMPTS),
                spacing: Duration::from_millis(numeric(
                    &lookup,
                    "SHIFT_RELAY_SYNC_SPACING_MS",
                    millis(DEFAULT_SYNC_SPACING),
                )),
                min_year: numeric(&lookup, "SHIFT_RELAY_MIN_YEAR", DEFAULT_MIN_YEAR),
            },
            utc_offset,
            tick: Duration::from_millis(numeric(&lookup, "SHIFT_RELAY_TICK_MS", DEFAULT_TICK_MS)),
            ..defaults
        })
    }
}

fn utc() -> FixedOffset {
    Utc.fix()
}

fn default_backfill(endpoint: &str) -> String {
    format!("{}{BACKFILL_SUFFIX}", endpoint.trim_end_matches('/'))
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn optional<F: Fn(&str) -> Option<String>>(lookup: &F, var: &str) -> Option<String> {
    lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn required<F: Fn(&str) -> Option<String>>(
    lookup: &F,
    var: &'static str,
) -> Result<String, ConfigError> {
    optional(lookup, var).ok_or(ConfigError::Missing(var))
}

fn numeric<T, F>(lookup: &F, var: &'static str, default: T) -> T
where
    T: FromStr + Copy,
    F: Fn(&str) -> Option<String>,
{
    match optional(lookup, var) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(var, value = %raw, "Unparseable setting, using default");
            default
        }),
    }
}
