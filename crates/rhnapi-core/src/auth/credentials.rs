use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use ini::{EscapePolicy, Ini, ParseOption, WriteOption};
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::error::CredentialError;

/// Default credential file name in the user's home directory
const CREDENTIAL_FILE: &str = ".rhninfo";

/// Section supplying values missing from a hostname section
const DEFAULT_SECTION: &str = "DEFAULT";

const LOGIN_KEY: &str = "login";
const PASSWORD_KEY: &str = "password";

/// Login/password found for a host. Either field may be missing.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct StoredCredentials {
    pub login: Option<String>,
    pub password: Option<Zeroizing<String>>,
}

impl StoredCredentials {
    pub fn is_empty(&self) -> bool {
        self.login.is_none() && self.password.is_none()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref().map(String::as_str)
    }
}

impl fmt::Debug for StoredCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredCredentials")
            .field("login", &self.login)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Values are stored verbatim: no quoting, no escapes. A value that would
/// not read back unchanged is refused.
fn check_storable(field: &'static str, value: &str) -> Result<(), CredentialError> {
    // a trailing backslash reads as a line continuation
    if value.contains(['\n', '\r']) || value.trim() != value || value.ends_with('\\') {
        return Err(CredentialError::Unrepresentable(field));
    }
    Ok(())
}

/// INI file of `[hostname]` sections holding `login` and `password`.
///
/// Writes merge into whatever the file already holds and replace it
/// atomically. There is no locking between processes: concurrent writers
/// race and the last one wins.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.rhninfo`, if a home directory can be determined.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(CREDENTIAL_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Credentials stored for `hostname`. A missing or unreadable file, or a
    /// file without a section for the host, yields empty credentials.
    pub fn fetch(&self, hostname: &str) -> StoredCredentials {
        let ini = match self.load() {
            Ok(Some(ini)) => ini,
            Ok(None) => {
                debug!(path = %self.path.display(), "No credential file");
                return StoredCredentials::default();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring unreadable credential file");
                return StoredCredentials::default();
            }
        };

        let Some(section) = ini.section(Some(hostname)) else {
            debug!(hostname, "No stored credentials for host");
            return StoredCredentials::default();
        };

        let lookup = |key: &str| -> Option<String> {
            section
                .get(key)
                .or_else(|| ini.section(Some(DEFAULT_SECTION)).and_then(|s| s.get(key)))
                .or_else(|| ini.section(None::<String>).and_then(|s| s.get(key)))
                .map(str::to_string)
        };

        StoredCredentials {
            login: lookup(LOGIN_KEY),
            password: lookup(PASSWORD_KEY).map(Zeroizing::new),
        }
    }

    /// Store the given fields for `hostname`, keeping every other section
    /// and key. `None` fields are left as they are.
    pub fn save(
        &self,
        hostname: &str,
        login: Option<&str>,
        password: Option<&str>,
    ) -> Result<(), CredentialError> {
        if let Some(login) = login {
            check_storable(LOGIN_KEY, login)?;
        }
        if let Some(password) = password {
            check_storable(PASSWORD_KEY, password)?;
        }
        let mut ini = self.load()?.unwrap_or_default();

        // creates the section even when both fields are None
        let _ = ini.with_section(Some(hostname));
        if let Some(login) = login {
            ini.set_to(Some(hostname), LOGIN_KEY.to_string(), login.to_string());
        }
        if let Some(password) = password {
            ini.set_to(Some(hostname), PASSWORD_KEY.to_string(), password.to_string());
        }

        self.write(&ini)?;
        debug!(hostname, path = %self.path.display(), "Saved credentials");
        Ok(())
    }

    fn load(&self) -> Result<Option<Ini>, CredentialError> {
        // backslashes and quotes in a hand-edited password are literal
        let options = ParseOption {
            enabled_quote: false,
            enabled_escape: false,
            ..Default::default()
        };
        match Ini::load_from_file_opt(&self.path, options) {
            Ok(ini) => Ok(Some(ini)),
            Err(ini::Error::Io(e)) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(ini::Error::Io(e)) => Err(CredentialError::Io(e)),
            Err(ini::Error::Parse(e)) => Err(CredentialError::Parse(e.to_string())),
        }
    }

    /// Write to a temp file beside the target, then rename over it.
    fn write(&self, ini: &Ini) -> Result<(), CredentialError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        // NamedTempFile is created 0600 on unix
        let mut tmp = NamedTempFile::new_in(&dir)?;
        let options = WriteOption {
            escape_policy: EscapePolicy::Nothing,
            ..Default::default()
        };
        ini.write_to_opt(&mut tmp, options)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}
