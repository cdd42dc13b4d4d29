//! Network reachability as seen by the relay.
//!
//! The relay only needs a boolean per evaluation. A TCP connect to the
//! delivery endpoint's host is the cheapest signal that a request could go
//! through; it says nothing about whether the service will accept it.

use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;
use url::Url;

/// Reports whether the network is currently usable.
pub trait ConnectivitySource {
    fn is_connected(&self) -> bool;
}

impl<C: ConnectivitySource + ?Sized> ConnectivitySource for &C {
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}

#[derive(Debug, Error)]
pub enum ReachabilityError {
    #[error("invalid endpoint URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("endpoint URL {0:?} has no host or port")]
    NoAuthority(String),
}

/// Checks connectivity by opening (and immediately dropping) a TCP connection.
#[derive(Debug, Clone)]
pub struct TcpReachability {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpReachability {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        TcpReachability {
            host: host.into(),
            port,
            timeout,
        }
    }

    /// Builds a check for the host and port of `endpoint`.
    pub fn for_url(endpoint: &str, timeout: Duration) -> Result<Self, ReachabilityError> {
        let url = Url::parse(endpoint).map_err(|source| ReachabilityError::InvalidUrl {
            url: endpoint.to_string(),
            source,
        })?;
        let host = url
            .host_str()
            .ok_or_else(|| ReachabilityError::NoAuthority(endpoint.to_string()))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| ReachabilityError::NoAuthority(endpoint.to_string()))?;
        Ok(TcpReachability::new(host, port, timeout))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn resolve(&self) -> Option<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
    }
}

impl ConnectivitySource for TcpReachability {
    fn is_connected(&self) -> bool {
        let Some(addr) = self.resolve() else {
            debug!(host = %self.host, "Endpoint host did not resolve");
            return false;
        };
        match TcpStream::connect_timeout(&addr, self.timeout) {
            Ok(_) => true,
            Err(e) => {
                debug!(%addr, error = %e, "Connectivity check failed");
                false
            }
        }
    }
}
