//! Request/response channels to the remote API endpoint.
//!
//! This module provides:
//! - `Transport`: the object-safe channel the RPC client posts documents over
//! - `HttpsTransport`: direct TLS connection to the server
//! - `ProxyTransport`: plain connection to an HTTP proxy that forwards the
//!   request on to the real server over TLS
//! - `TransportConfig`: picks one of the two for a destination host

pub mod https;
pub mod proxy;

use std::fmt;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Error, TransportError};

pub use https::HttpsTransport;
pub use proxy::ProxyTransport;

/// Path of the XML-RPC handler on every server.
pub const RPC_PATH: &str = "/rpc/api";

/// User agent sent on every request.
pub(crate) const USER_AGENT: &str = concat!("rhnapi/", env!("CARGO_PKG_VERSION"));

/// Default port when a proxy address does not name one.
const DEFAULT_PROXY_PORT: u16 = 80;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send an XML request body and return the response body.
    async fn post(&self, body: String) -> Result<String, TransportError>;

    /// Human-readable description for logging.
    fn describe(&self) -> String;
}

/// A `host:port` pair naming an HTTP proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyAddress {
    pub host: String,
    pub port: u16,
}

impl ProxyAddress {
    /// Parse `host`, `host:port`, `[v6]:port`, optionally prefixed with
    /// `http://` and followed by a trailing slash.
    pub fn parse(input: &str) -> Result<Self, Error> {
        let invalid = || Error::InvalidProxy(input.to_string());

        let trimmed = input.trim();
        let without_scheme = trimmed
            .strip_prefix("http://")
            .unwrap_or(trimmed)
            .trim_end_matches('/');

        let (host, port) = if let Some(rest) = without_scheme.strip_prefix('[') {
            let (host, after) = rest.split_once(']').ok_or_else(invalid)?;
            let port = match after.strip_prefix(':') {
                Some(port) => Some(port),
                None if after.is_empty() => None,
                None => return Err(invalid()),
            };
            (host, port)
        } else {
            match without_scheme.rsplit_once(':') {
                // an IPv6 literal needs brackets
                Some((host, _)) if host.contains(':') => return Err(invalid()),
                Some((host, port)) => (host, Some(port)),
                None => (without_scheme, None),
            }
        };

        if host.is_empty() || host.contains(|c: char| c.is_whitespace() || c == '/') {
            return Err(invalid());
        }

        let port = match port {
            Some(port) => port.parse::<u16>().ok().filter(|p| *p != 0).ok_or_else(invalid)?,
            None => DEFAULT_PROXY_PORT,
        };

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for ProxyAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Chooses between a direct and a proxied transport. Recording a proxy does
/// not open any connection.
#[derive(Debug, Clone, Default)]
pub struct TransportConfig {
    proxy: Option<ProxyAddress>,
}

impl TransportConfig {
    pub fn direct() -> Self {
        Self::default()
    }

    pub fn configure(proxy: ProxyAddress) -> Self {
        Self { proxy: Some(proxy) }
    }

    pub fn proxy(&self) -> Option<&ProxyAddress> {
        self.proxy.as_ref()
    }

    /// Build the transport for `destination` (a bare hostname).
    pub fn connect(&self, destination: &str) -> Result<Box<dyn Transport>, TransportError> {
        match &self.proxy {
            Some(proxy) => {
                debug!(proxy = %proxy, destination, "Using proxied transport");
                Ok(Box::new(ProxyTransport::new(proxy.clone(), destination, RPC_PATH)))
            }
            None => {
                debug!(destination, "Using direct HTTPS transport");
                Ok(Box::new(HttpsTransport::new(destination)?))
            }
        }
    }
}
