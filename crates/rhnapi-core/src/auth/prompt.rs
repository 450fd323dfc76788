use std::io::{self, BufRead, Write};

/// Source of credentials that were neither passed in nor stored.
pub trait Prompter: Send {
    /// Ask for a login name. Input is echoed.
    fn prompt_login(&mut self, hostname: &str) -> io::Result<String>;

    /// Ask for a password. Input is not echoed.
    fn prompt_password(&mut self, login: &str, hostname: &str) -> io::Result<String>;
}

/// Prompts on the controlling terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn prompt_login(&mut self, hostname: &str) -> io::Result<String> {
        print!("Login for {}: ", hostname);
        io::stdout().flush()?;

        let mut login = String::new();
        io::stdin().lock().read_line(&mut login)?;
        Ok(login.trim().to_string())
    }

    fn prompt_password(&mut self, login: &str, hostname: &str) -> io::Result<String> {
        rpassword::prompt_password(format!("Password for {}@{}: ", login, hostname))
    }
}

/// Prompter for non-interactive use: every prompt fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPrompt;

impl Prompter for NoPrompt {
    fn prompt_login(&mut self, _hostname: &str) -> io::Result<String> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "interactive login prompt disabled",
        ))
    }

    fn prompt_password(&mut self, _login: &str, _hostname: &str) -> io::Result<String> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "interactive password prompt disabled",
        ))
    }
}
