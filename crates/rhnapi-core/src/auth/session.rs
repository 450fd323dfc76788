use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::credentials::CredentialStore;
use super::endpoint::Endpoint;
use super::options::SessionOptions;
use super::prompt::{Prompter, TerminalPrompter};
use super::report::FailureReporter;
use crate::api;
use crate::error::{Error, Result};
use crate::rpc::{RpcClient, Value};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, no key yet.
    Unauthenticated,
    /// Holding a key; remote calls are valid.
    Authenticated,
    /// Logged out. Terminal: calls are rejected without reaching the server.
    Closed,
}

/// An authenticated connection to one server.
///
/// Owns exactly one transport and at most one session key. Not meant to be
/// shared between tasks; open a second `Session` for concurrent work.
pub struct Session {
    hostname: String,
    url: String,
    login: String,
    password: Option<Zeroizing<String>>,
    key: Option<String>,
    state: SessionState,
    credential_file: Option<PathBuf>,
    session_duration: Option<i32>,
    rpc: RpcClient,
    reporter: FailureReporter,
    server_version: Option<String>,
    api_version: Option<String>,
}

impl Session {
    /// Log in to `server`, prompting on the terminal for anything the
    /// options and credential file do not supply.
    pub async fn connect(server: &str, options: SessionOptions) -> Result<Self> {
        Self::connect_with(server, options, &mut TerminalPrompter).await
    }

    /// Like `connect`, with a caller-supplied prompter.
    pub async fn connect_with(
        server: &str,
        options: SessionOptions,
        prompter: &mut dyn Prompter,
    ) -> Result<Self> {
        let endpoint = Endpoint::parse(server)?;
        let transport_config = options.validate()?;
        let transport = transport_config.connect(&endpoint.hostname)?;
        Self::establish(endpoint, options, transport, prompter).await
    }

    /// Log in over an already-built transport.
    pub async fn connect_over(
        server: &str,
        options: SessionOptions,
        transport: Box<dyn Transport>,
        prompter: &mut dyn Prompter,
    ) -> Result<Self> {
        let endpoint = Endpoint::parse(server)?;
        options.validate()?;
        Self::establish(endpoint, options, transport, prompter).await
    }

    async fn establish(
        endpoint: Endpoint,
        options: SessionOptions,
        transport: Box<dyn Transport>,
        prompter: &mut dyn Prompter,
    ) -> Result<Self> {
        let reporter = match &options.log_file {
            Some(path) => FailureReporter::to_file(options.debug, path).map_err(|e| {
                Error::InvalidOption(format!("cannot open log file {}: {}", path.display(), e))
            })?,
            None => FailureReporter::new(options.debug),
        };

        let store = options.credential_file.as_deref().map(CredentialStore::new);
        let (login, password) = resolve_credentials(
            &endpoint.hostname,
            options.login,
            options.password,
            store.as_ref(),
            prompter,
        )?;

        let mut session = Session {
            hostname: endpoint.hostname,
            url: endpoint.url,
            login,
            password: Some(password),
            key: None,
            state: SessionState::Unauthenticated,
            credential_file: options.credential_file,
            session_duration: options.session_duration,
            rpc: RpcClient::new(transport),
            reporter,
            server_version: None,
            api_version: None,
        };

        debug!(hostname = %session.hostname, via = %session.rpc.describe(), "Logging in");
        if let Err(e) = session.authenticate().await {
            let context = format!("log in to {} as {}", session.hostname, session.login);
            return session.reporter.fail(e, &context);
        }
        info!(hostname = %session.hostname, login = %session.login, "Logged in");

        if options.fetch_versions {
            session.fetch_versions().await;
        }

        if options.save_credentials {
            session.save_credentials(store.as_ref());
        }

        Ok(session)
    }

    async fn authenticate(&mut self) -> Result<()> {
        let password = self.password.as_ref().ok_or(Error::SessionClosed)?;
        let key = api::login(&self.rpc, &self.login, password, self.session_duration).await?;
        self.key = Some(key);
        self.state = SessionState::Authenticated;
        Ok(())
    }

    async fn fetch_versions(&mut self) {
        match api::system_version(&self.rpc).await {
            Ok(version) => self.server_version = Some(version),
            Err(e) => self.reporter.report(&e, "fetch server version"),
        }
        match api::get_version(&self.rpc).await {
            Ok(version) => self.api_version = Some(version),
            Err(e) => self.reporter.report(&e, "fetch API version"),
        }
        debug!(
            server_version = ?self.server_version,
            api_version = ?self.api_version,
            "Server versions"
        );
    }

    fn save_credentials(&self, store: Option<&CredentialStore>) {
        let (Some(store), Some(password)) = (store, self.password.as_ref()) else {
            return;
        };
        match store.save(&self.hostname, Some(&self.login), Some(password.as_str())) {
            Ok(()) => info!(path = %store.path().display(), "Saved credentials"),
            Err(e) => warn!(
                path = %store.path().display(),
                error = %e,
                "Failed to save credentials"
            ),
        }
    }

    /// Log in again with the credentials resolved at construction, replacing
    /// the session key. Never prompts or rereads the credential file.
    pub async fn renew(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Err(Error::SessionClosed);
        }
        match self.authenticate().await {
            Ok(()) => {
                info!(hostname = %self.hostname, login = %self.login, "Renewed session");
                Ok(())
            }
            Err(e) => {
                let context = format!("renew session on {} for {}", self.hostname, self.login);
                self.reporter.fail(e, &context)
            }
        }
    }

    /// Invalidate the key server-side and close the session. The session is
    /// closed even when the remote call fails.
    pub async fn logout(&mut self) -> Result<()> {
        self.state = SessionState::Closed;
        self.password = None;
        let Some(key) = self.key.take() else {
            return Ok(());
        };

        match api::logout(&self.rpc, &key).await {
            Ok(true) => {
                info!(hostname = %self.hostname, "Logged out");
                Ok(())
            }
            Ok(false) => {
                warn!(hostname = %self.hostname, "Server did not confirm logout");
                Ok(())
            }
            Err(e) => {
                let context = format!("log out of {}", self.hostname);
                self.reporter.fail(e, &context)
            }
        }
    }

    /// Same as `logout`.
    pub async fn close(&mut self) -> Result<()> {
        self.logout().await
    }

    /// Call a method that takes no session key (e.g. `api.getVersion`).
    pub async fn call(&self, method: &str, params: &[Value]) -> Result<Value> {
        if self.state == SessionState::Closed {
            return Err(Error::SessionClosed);
        }
        self.rpc.call(method, params).await
    }

    /// Call a method with the session key prepended to `params`.
    pub async fn call_with_key(&self, method: &str, params: &[Value]) -> Result<Value> {
        let key = self.key()?;
        let mut full = Vec::with_capacity(params.len() + 1);
        full.push(Value::from(key));
        full.extend_from_slice(params);
        self.rpc.call(method, &full).await
    }

    /// The failure hook: report `error` (printed only in debug mode) and
    /// return it wrapped with `context`.
    pub fn fail<T>(&self, error: Error, context: &str) -> Result<T> {
        self.reporter.fail(error, context)
    }

    /// Current session key.
    pub fn key(&self) -> Result<&str> {
        match (&self.state, &self.key) {
            (SessionState::Authenticated, Some(key)) => Ok(key),
            _ => Err(Error::SessionClosed),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn login(&self) -> &str {
        &self.login
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    pub fn is_debug(&self) -> bool {
        self.reporter.is_debug()
    }

    pub fn credential_file(&self) -> Option<&Path> {
        self.credential_file.as_deref()
    }

    pub fn server_version(&self) -> Option<&str> {
        self.server_version.as_deref()
    }

    pub fn api_version(&self) -> Option<&str> {
        self.api_version.as_deref()
    }

    /// The underlying client, for calls that manage their own parameters.
    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }
}

/// Explicit arguments win. The credential file is read only when neither
/// login nor password was given. Whatever is still missing is prompted for.
fn resolve_credentials(
    hostname: &str,
    login: Option<String>,
    password: Option<Zeroizing<String>>,
    store: Option<&CredentialStore>,
    prompter: &mut dyn Prompter,
) -> Result<(String, Zeroizing<String>)> {
    let (mut login, mut password) = (login, password);

    if login.is_none() && password.is_none() {
        if let Some(store) = store {
            let stored = store.fetch(hostname);
            debug!(
                hostname,
                login = stored.login.is_some(),
                password = stored.password.is_some(),
                "Read stored credentials"
            );
            login = stored.login;
            password = stored.password;
        }
    }

    let login = match login {
        Some(login) => login,
        None => prompter.prompt_login(hostname).map_err(Error::Prompt)?,
    };
    if login.trim().is_empty() {
        return Err(Error::MissingCredentials("login"));
    }

    let password = match password {
        Some(password) => password,
        None => Zeroizing::new(
            prompter
                .prompt_password(&login, hostname)
                .map_err(Error::Prompt)?,
        ),
    };
    if password.is_empty() {
        return Err(Error::MissingCredentials("password"));
    }

    Ok((login, password))
}
