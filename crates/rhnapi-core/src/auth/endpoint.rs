use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::transport::RPC_PATH;

/// Optional scheme, then the hostname up to the first `:`, `/` or other
/// non-hostname character.
static HOSTNAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Za-z][A-Za-z0-9+.\-]*://)?(\w[\w.\-]*)").expect("valid hostname pattern")
});

/// Canonical hostname and XML-RPC endpoint for a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub hostname: String,
    pub url: String,
}

impl Endpoint {
    /// Normalize a hostname or URL such as `sat`, `http://sat/x` or
    /// `https://sat:8443/rhn` into `sat` and `https://sat/rpc/api`.
    pub fn parse(server: &str) -> Result<Self> {
        let hostname = HOSTNAME_PATTERN
            .captures(server.trim())
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| Error::InvalidServer(server.to_string()))?;

        let url = format!("https://{}{}", hostname, RPC_PATH);
        Ok(Self { hostname, url })
    }
}
