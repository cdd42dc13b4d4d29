//! Best-effort wall-clock sources.
//!
//! A source answers a single question, "what time is it now?", and may fail.
//! Retrying is the caller's business (see [`super::ClockReconciler::synchronize`]).

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors returned by a single wall-clock query.
#[derive(Debug, Error)]
pub enum WallTimeError {
    /// The time service could not be reached.
    #[error("time service unreachable: {0}")]
    Unreachable(String),

    /// The response carried no usable `Date` header.
    #[error("response has no Date header")]
    MissingDate,

    /// The `Date` header could not be parsed.
    #[error("invalid Date header {value:?}: {source}")]
    InvalidDate {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// A wall-clock time service.
pub trait WallTimeSource {
    /// Queries the current UTC time once.
    fn query(&self) -> Result<DateTime<Utc>, WallTimeError>;
}

impl<W: WallTimeSource + ?Sized> WallTimeSource for &W {
    fn query(&self) -> Result<DateTime<Utc>, WallTimeError> {
        (**self).query()
    }
}

/// Uses the host's system clock.
///
/// Useful on hosts that run their own NTP client. The plausibility check in
/// the reconciler still rejects a clock that was never set.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemWallClock;

impl WallTimeSource for SystemWallClock {
    fn query(&self) -> Result<DateTime<Utc>, WallTimeError> {
        Ok(Utc::now())
    }
}

/// Reads the time from the `Date` header of an HTTP response.
///
/// Any reachable web server reports its clock with one-second precision,
/// which matches the precision of the event timestamps.
#[derive(Debug, Clone)]
pub struct HttpDateSource {
    agent: ureq::Agent,
    url: String,
}

impl HttpDateSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();
        HttpDateSource {
            agent,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl WallTimeSource for HttpDateSource {
    fn query(&self) -> Result<DateTime<Utc>, WallTimeError> {
        let response = match self.agent.head(&self.url).call() {
            Ok(resp) => resp,
            // Error statuses still carry the server's clock.
            Err(ureq::Error::Status(_, resp)) => resp,
            Err(ureq::Error::Transport(err)) => {
                return Err(WallTimeError::Unreachable(err.to_string()));
            }
        };

        let header = response.header("date").ok_or(WallTimeError::MissingDate)?;
        parse_http_date(header)
    }
}

/// Setting value that selects the host clock instead of an HTTP source.
pub const SYSTEM_TIME_SETTING: &str = "system";

/// Wall-time source chosen from the time setting.
#[derive(Debug, Clone)]
pub enum ConfiguredTimeSource {
    Http(HttpDateSource),
    System(SystemWallClock),
}

impl ConfiguredTimeSource {
    /// `system` selects the host clock; anything else is a URL.
    pub fn from_setting(setting: &str, timeout: Duration) -> Self {
        if setting.eq_ignore_ascii_case(SYSTEM_TIME_SETTING) {
            ConfiguredTimeSource::System(SystemWallClock)
        } else {
            ConfiguredTimeSource::Http(HttpDateSource::new(setting, timeout))
        }
    }
}

impl WallTimeSource for ConfiguredTimeSource {
    fn query(&self) -> Result<DateTime<Utc>, WallTimeError> {
        match self {
            ConfiguredTimeSource::Http(source) => source.query(),
            ConfiguredTimeSource::System(source) => source.query(),
        }
    }
}

/// Parses an RFC 2822 / IMF-fixdate `Date` header value.
pub fn parse_http_date(value: &str) -> Result<DateTime<Utc>, WallTimeError> {
    DateTime::parse_from_rfc2822(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|source| WallTimeError::InvalidDate {
            value: value.to_string(),
            source,
        })
}
