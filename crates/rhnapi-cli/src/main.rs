//! rhnapi - command-line access to an RHN/Spacewalk server.
//!
//! Logs in with credentials from flags, environment, the credential file or
//! an interactive prompt, runs one command and logs out again.

mod config;
mod params;

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rhnapi_core::auth::{NoPrompt, TerminalPrompter};
use rhnapi_core::{CredentialStore, Prompter, Session, SessionOptions};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::Config;

#[derive(Debug, Parser)]
#[command(name = "rhnapi", version, about = "Run RHN/Spacewalk API calls from the shell")]
struct Cli {
    /// Server hostname or URL
    #[arg(short, long, env = "RHN_SERVER")]
    server: Option<String>,

    /// Login name
    #[arg(short, long, env = "RHN_LOGIN")]
    login: Option<String>,

    /// Password (prompted for when not given or stored)
    #[arg(long, env = "RHN_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Credential file (default ~/.rhninfo)
    #[arg(short = 'c', long)]
    credentials: Option<PathBuf>,

    /// Store the login and password in the credential file after logging in
    #[arg(long)]
    save_credentials: bool,

    /// HTTP proxy as host[:port]
    #[arg(long, env = "RHN_PROXY")]
    proxy: Option<String>,

    /// Print failure details and debug logging
    #[arg(short, long)]
    debug: bool,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Fail instead of prompting for missing credentials
    #[arg(long)]
    no_prompt: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Log in, remember the server as the default and log out
    Login,
    /// Show server and API versions
    Version,
    /// Call an API method; the session key is passed as the first argument
    Call {
        /// Method name, e.g. system.listSystems
        method: String,

        /// Do not pass the session key
        #[arg(long)]
        no_key: bool,

        /// Parameters: text, or int:N, bool:B, date:D, json:J, str:S
        params: Vec<String>,
    },
}

/// Initialize the tracing subscriber for logging
fn init_tracing(debug: bool, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let default_level = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match log_file {
        Some(path) => {
            let file_name = path
                .file_name()
                .with_context(|| format!("Invalid log file path {}", path.display()))?;
            let dir = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));

            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            Ok(None)
        }
    }
}

/// Server from the command line or environment, else the configured default.
fn resolve_server(cli: &Cli, config: &Config) -> Result<String> {
    cli.server
        .clone()
        .or_else(|| config.server.clone())
        .ok_or_else(|| anyhow::anyhow!("No server given: use --server, RHN_SERVER or `server` in the config file"))
}

fn session_options(cli: &Cli, config: &Config) -> SessionOptions {
    let mut options = SessionOptions::new().debug(cli.debug);

    if let Some(login) = &cli.login {
        options = options.login(login.clone());
    }
    if let Some(password) = &cli.password {
        options = options.password(password.clone());
    }
    if let Some(path) = cli
        .credentials
        .clone()
        .or_else(|| config.credential_file.clone())
        .or_else(CredentialStore::default_path)
    {
        options = options.credential_file(path);
    }
    if let Some(proxy) = cli.proxy.clone().or_else(|| config.proxy.clone()) {
        options = options.proxy(proxy);
    }
    if let Some(path) = &cli.log_file {
        options = options.log_file(path.clone());
    }
    if let Some(seconds) = config.session_duration {
        options = options.session_duration(seconds);
    }

    options.save_credentials(cli.save_credentials || config.save_credentials)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing(cli.debug, cli.log_file.as_deref())?;

    let mut config = Config::load()?;
    let server = resolve_server(&cli, &config)?;
    let options = session_options(&cli, &config);

    let mut prompter: Box<dyn Prompter> = if cli.no_prompt {
        Box::new(NoPrompt)
    } else {
        Box::new(TerminalPrompter)
    };

    let mut session = Session::connect_with(&server, options, prompter.as_mut())
        .await
        .with_context(|| format!("Could not log in to {}", server))?;

    let result = run(&cli.command, &session, &mut config).await;

    if let Err(e) = session.logout().await {
        tracing::warn!(error = %e, "Logout failed");
    }
    result
}

async fn run(command: &Command, session: &Session, config: &mut Config) -> Result<()> {
    match command {
        Command::Login => {
            println!("Logged in to {} as {}", session.hostname(), session.login());
            config.server = Some(session.hostname().to_string());
            config.save().context("Failed to save config")?;
            info!(server = %session.hostname(), "Saved default server");
        }
        Command::Version => {
            println!("server:  {}", session.hostname());
            println!("version: {}", session.server_version().unwrap_or("unknown"));
            println!("api:     {}", session.api_version().unwrap_or("unknown"));
        }
        Command::Call {
            method,
            no_key,
            params,
        } => {
            let params = params::parse_params(params)?;
            let result = if *no_key {
                session.call(method, &params).await
            } else {
                session.call_with_key(method, &params).await
            };
            let value = result.or_else(|e| session.fail(e, &format!("call {}", method)))?;
            let json: serde_json::Value = value.into();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["rhnapi"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_server_precedence() {
        let config = Config {
            server: Some("configured".to_string()),
            ..Config::default()
        };
        assert_eq!(
            resolve_server(&cli(&["--server", "flag", "version"]), &config).unwrap(),
            "flag"
        );
        assert_eq!(resolve_server(&cli(&["version"]), &config).unwrap(), "configured");
    }

    #[test]
    fn test_session_options_merge() {
        let config = Config {
            credential_file: Some(PathBuf::from("/etc/rhninfo")),
            proxy: Some("squid:3128".to_string()),
            save_credentials: true,
            ..Config::default()
        };
        let options = session_options(
            &cli(&["--login", "alice", "--proxy", "other:8080", "--debug", "version"]),
            &config,
        );
        assert_eq!(options.login.as_deref(), Some("alice"));
        assert!(options.password.is_none());
        assert_eq!(options.credential_file, Some(PathBuf::from("/etc/rhninfo")));
        assert_eq!(options.proxy.as_deref(), Some("other:8080"));
        assert!(options.save_credentials);
        assert!(options.debug);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_call_arguments() {
        let parsed = cli(&["call", "--no-key", "api.getVersion"]);
        match parsed.command {
            Command::Call { method, no_key, params } => {
                assert_eq!(method, "api.getVersion");
                assert!(no_key);
                assert!(params.is_empty());
            }
            other => panic!("unexpected command {other:?}"),
        }

        let parsed = cli(&["call", "system.getDetails", "int:1000010000"]);
        match parsed.command {
            Command::Call { params, .. } => assert_eq!(params, vec!["int:1000010000"]),
            other => panic!("unexpected command {other:?}"),
        }
    }
}
