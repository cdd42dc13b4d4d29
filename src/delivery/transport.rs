//! Request/response transport used by the delivery attempter.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// A response the remote service actually produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        TransportResponse {
            status,
            body: body.into(),
        }
    }

    pub fn is_success_status(&self) -> bool {
        (200..=299).contains(&self.status)
    }
}

/// Failures that left no interpretable response.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connect, TLS, DNS or timeout failure.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The response body could not be read.
    #[error("failed to read response body: {0}")]
    Body(#[from] io::Error),
}

/// Performs one JSON POST exchange.
///
/// Implementations must give up after `timeout` and report it as an error;
/// a stalled endpoint must never block the caller indefinitely.
pub trait DeliveryTransport {
    fn post_json(
        &self,
        url: &str,
        body: &str,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError>;
}

impl<T: DeliveryTransport + ?Sized> DeliveryTransport for &T {
    fn post_json(
        &self,
        url: &str,
        body: &str,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        (**self).post_json(url, body, timeout)
    }
}

/// Blocking HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(connect_timeout)
            .build();
        HttpTransport { agent }
    }
}

impl DeliveryTransport for HttpTransport {
    fn post_json(
        &self,
        url: &str,
        body: &str,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        let result = self
            .agent
            .post(url)
            .timeout(timeout)
            .set("content-type", "application/json")
            .send_string(body);

        match result {
            Ok(resp) => {
                let status = resp.status();
                Ok(TransportResponse::new(status, resp.into_string()?))
            }
            // The server answered; the caller decides what the status means.
            Err(ureq::Error::Status(status, resp)) => {
                Ok(TransportResponse::new(status, resp.into_string()?))
            }
            Err(ureq::Error::Transport(err)) => Err(TransportError::Transport(err.to_string())),
        }
    }
}
