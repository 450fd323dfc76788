use std::fmt;
use std::path::PathBuf;

use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::transport::{ProxyAddress, TransportConfig};

/// Everything a `Session` can be configured with besides the server name.
#[derive(Clone)]
pub struct SessionOptions {
    /// Login name. Takes precedence over the credential file.
    pub login: Option<String>,
    /// Password. Takes precedence over the credential file.
    pub password: Option<Zeroizing<String>>,
    /// Credential file consulted when neither login nor password is given.
    pub credential_file: Option<PathBuf>,
    /// Write the resolved login/password to `credential_file` after login.
    pub save_credentials: bool,
    /// HTTP proxy as `host[:port]`.
    pub proxy: Option<String>,
    /// Print failure details through the failure reporter.
    pub debug: bool,
    /// Send failure details to this file instead of stderr.
    pub log_file: Option<PathBuf>,
    /// Query `api.systemVersion` and `api.getVersion` after login.
    pub fetch_versions: bool,
    /// Requested session lifetime in seconds, forwarded to `auth.login`.
    pub session_duration: Option<i32>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            login: None,
            password: None,
            credential_file: None,
            save_credentials: false,
            proxy: None,
            debug: false,
            log_file: None,
            fetch_versions: true,
            session_duration: None,
        }
    }
}

impl fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionOptions")
            .field("login", &self.login)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("credential_file", &self.credential_file)
            .field("save_credentials", &self.save_credentials)
            .field("proxy", &self.proxy)
            .field("debug", &self.debug)
            .field("log_file", &self.log_file)
            .field("fetch_versions", &self.fetch_versions)
            .field("session_duration", &self.session_duration)
            .finish()
    }
}

impl SessionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn login(mut self, login: impl Into<String>) -> Self {
        self.login = Some(login.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(Zeroizing::new(password.into()));
        self
    }

    pub fn credential_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.credential_file = Some(path.into());
        self
    }

    pub fn save_credentials(mut self, save: bool) -> Self {
        self.save_credentials = save;
        self
    }

    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    pub fn fetch_versions(mut self, fetch: bool) -> Self {
        self.fetch_versions = fetch;
        self
    }

    pub fn session_duration(mut self, seconds: i32) -> Self {
        self.session_duration = Some(seconds);
        self
    }

    /// Check option combinations and parse the proxy address.
    pub fn validate(&self) -> Result<TransportConfig> {
        if self.save_credentials && self.credential_file.is_none() {
            return Err(Error::InvalidOption(
                "save_credentials requires a credential file".to_string(),
            ));
        }
        if matches!(self.login.as_deref(), Some(l) if l.trim().is_empty()) {
            return Err(Error::InvalidOption("login must not be empty".to_string()));
        }
        if matches!(self.session_duration, Some(d) if d <= 0) {
            return Err(Error::InvalidOption(
                "session duration must be a positive number of seconds".to_string(),
            ));
        }

        match self.proxy.as_deref() {
            Some(proxy) => Ok(TransportConfig::configure(ProxyAddress::parse(proxy)?)),
            None => Ok(TransportConfig::direct()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = SessionOptions::new();
        assert!(options.fetch_versions);
        assert!(!options.save_credentials);
        assert!(!options.debug);
        assert!(options.validate().unwrap().proxy().is_none());
    }

    #[test]
    fn test_debug_output_redacts_password() {
        let options = SessionOptions::new().login("alice").password("hunter2");
        let rendered = format!("{:?}", options);
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_validate_rejects_bad_combinations() {
        assert!(matches!(
            SessionOptions::new().save_credentials(true).validate(),
            Err(Error::InvalidOption(_))
        ));
        assert!(matches!(
            SessionOptions::new().login("  ").validate(),
            Err(Error::InvalidOption(_))
        ));
        assert!(matches!(
            SessionOptions::new().session_duration(0).validate(),
            Err(Error::InvalidOption(_))
        ));
        assert!(matches!(
            SessionOptions::new().proxy("squid:notaport").validate(),
            Err(Error::InvalidProxy(_))
        ));
    }

    #[test]
    fn test_validate_parses_proxy() {
        let config = SessionOptions::new()
            .credential_file("/tmp/rhninfo")
            .save_credentials(true)
            .proxy("squid.example.com:3128")
            .validate()
            .unwrap();
        let proxy = config.proxy().unwrap();
        assert_eq!(proxy.host, "squid.example.com");
        assert_eq!(proxy.port, 3128);
    }
}
