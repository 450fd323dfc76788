//! Authentication: everything needed to turn a server name into a logged-in
//! `Session`.
//!
//! This module provides:
//! - `Session`: login, renew, logout and the shared failure hook
//! - `CredentialStore`: per-host login/password in an INI file
//! - `SessionOptions`: validated session configuration
//! - `Prompter`: interactive fallback for credentials still missing
//!
//! Credentials are resolved once, at construction, in this order: explicit
//! options, then the credential file, then prompting.

pub mod credentials;
pub mod endpoint;
pub mod options;
pub mod prompt;
pub mod report;
pub mod session;

pub use credentials::{CredentialStore, StoredCredentials};
pub use endpoint::Endpoint;
pub use options::SessionOptions;
pub use prompt::{NoPrompt, Prompter, TerminalPrompter};
pub use report::FailureReporter;
pub use session::{Session, SessionState};
