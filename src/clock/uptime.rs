//! Device uptime counters.

use std::time::Instant;

use crate::types::MonotonicMs;

/// A monotonically non-decreasing millisecond counter.
pub trait Uptime {
    /// Current reading of the counter.
    fn now_ms(&self) -> MonotonicMs;
}

impl<U: Uptime + ?Sized> Uptime for &U {
    fn now_ms(&self) -> MonotonicMs {
        (**self).now_ms()
    }
}

/// Milliseconds since this value was created, backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct ProcessUptime {
    started: Instant,
}

impl ProcessUptime {
    pub fn start() -> Self {
        ProcessUptime {
            started: Instant::now(),
        }
    }
}

impl Default for ProcessUptime {
    fn default() -> Self {
        Self::start()
    }
}

impl Uptime for ProcessUptime {
    fn now_ms(&self) -> MonotonicMs {
        // u64 milliseconds cover ~584 million years of uptime.
        let ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        MonotonicMs(ms)
    }
}
