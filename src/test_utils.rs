//! Shared test utilities: fakes for the collaborator traits and arbitrary
//! generators for property-based testing.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;

use crate::clock::{Uptime, WallTimeError, WallTimeSource};
use crate::delivery::{DeliveryTransport, TransportError, TransportResponse};
use crate::store::StoredEvent;
use crate::types::{Location, MonotonicMs, SubjectId};

pub fn utc(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
        .single()
        .unwrap()
}

pub fn event(subject: &str, location: &str, ms: u64) -> StoredEvent {
    StoredEvent::new(
        SubjectId::new(subject).unwrap(),
        Location::new(location).unwrap(),
        MonotonicMs(ms),
    )
}

/// An uptime counter moved by hand.
#[derive(Debug, Default)]
pub struct ManualUptime {
    ms: Cell<u64>,
}

impl ManualUptime {
    pub fn new(ms: u64) -> Self {
        ManualUptime { ms: Cell::new(ms) }
    }

    pub fn advance(&self, ms: u64) {
        self.ms.set(self.ms.get() + ms);
    }
}

impl Uptime for ManualUptime {
    fn now_ms(&self) -> MonotonicMs {
        MonotonicMs(self.ms.get())
    }
}

/// A wall-time source with canned answers. `None` answers are failures.
#[derive(Debug)]
pub struct FixedWallSource {
    script: RefCell<VecDeque<Option<DateTime<Utc>>>>,
    fallback: Option<DateTime<Utc>>,
    calls: Cell<u32>,
}

impl FixedWallSource {
    pub fn always(at: DateTime<Utc>) -> Self {
        FixedWallSource {
            script: RefCell::new(VecDeque::new()),
            fallback: Some(at),
            calls: Cell::new(0),
        }
    }

    pub fn failing() -> Self {
        Self::scripted(Vec::new())
    }

    /// Answers in order, then fails forever.
    pub fn scripted(answers: Vec<Option<DateTime<Utc>>>) -> Self {
        FixedWallSource {
            script: RefCell::new(answers.into()),
            fallback: None,
            calls: Cell::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.get()
    }
}

impl WallTimeSource for FixedWallSource {
    fn query(&self) -> Result<DateTime<Utc>, WallTimeError> {
        self.calls.set(self.calls.get() + 1);
        let answer = self.script.borrow_mut().pop_front().unwrap_or(self.fallback);
        answer.ok_or_else(|| WallTimeError::Unreachable("scripted failure".to_string()))
    }
}

/// One request seen by [`ScriptedTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub url: String,
    pub body: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy)]
enum Reply {
    Ok,
    Rejected,
    Unreachable,
}

impl Reply {
    fn produce(self) -> Result<TransportResponse, TransportError> {
        match self {
            Reply::Ok => Ok(TransportResponse::new(200, r#"{"success": true}"#)),
            Reply::Rejected => Ok(TransportResponse::new(
                400,
                r#"{"success": false, "error": "unknown employee"}"#,
            )),
            Reply::Unreachable => Err(TransportError::Transport("connection refused".to_string())),
        }
    }
}

#[derive(Debug)]
enum Script {
    Always(Reply),
    Alternating,
    Queue(RefCell<VecDeque<Result<TransportResponse, TransportError>>>),
}

/// A delivery transport that records requests and replays canned responses.
#[derive(Debug)]
pub struct ScriptedTransport {
    script: Script,
    requests: RefCell<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    fn with(script: Script) -> Self {
        ScriptedTransport {
            script,
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn always_ok() -> Self {
        Self::with(Script::Always(Reply::Ok))
    }

    pub fn always_rejected() -> Self {
        Self::with(Script::Always(Reply::Rejected))
    }

    pub fn always_unreachable() -> Self {
        Self::with(Script::Always(Reply::Unreachable))
    }

    /// Accepts the first request, rejects the second, and so on.
    pub fn alternating() -> Self {
        Self::with(Script::Alternating)
    }

    /// Replays `responses` in order, then is unreachable.
    pub fn scripted(responses: Vec<Result<TransportResponse, TransportError>>) -> Self {
        Self::with(Script::Queue(RefCell::new(responses.into())))
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.borrow().clone()
    }
}

impl DeliveryTransport for ScriptedTransport {
    fn post_json(
        &self,
        url: &str,
        body: &str,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        let index = {
            let mut requests = self.requests.borrow_mut();
            requests.push(RecordedRequest {
                url: url.to_string(),
                body: body.to_string(),
                timeout,
            });
            requests.len() - 1
        };

        match &self.script {
            Script::Always(reply) => reply.produce(),
            Script::Alternating if index % 2 == 0 => Reply::Ok.produce(),
            Script::Alternating => Reply::Rejected.produce(),
            Script::Queue(queue) => queue
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Reply::Unreachable.produce()),
        }
    }
}

pub fn arb_subject() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z .'-]{0,30}".prop_map(String::from)
}

pub fn arb_location() -> impl Strategy<Value = String> {
    "[A-Za-z0-9][A-Za-z0-9 _-]{0,20}".prop_map(String::from)
}

pub fn arb_stored_event() -> impl Strategy<Value = StoredEvent> {
    (arb_subject(), arb_location(), 1..=u64::from(u32::MAX))
        .prop_map(|(subject, location, ms)| event(&subject, &location, ms))
}
