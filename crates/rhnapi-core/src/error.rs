use thiserror::Error;

/// Fault codes the server uses for a missing, expired or invalid session key.
const AUTH_FAULT_CODES: [i32; 2] = [2950, 2951];

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid server name or URL: {0:?}")]
    InvalidServer(String),

    #[error("Invalid proxy address: {0:?}")]
    InvalidProxy(String),

    #[error("Invalid session option: {0}")]
    InvalidOption(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Remote fault {code}: {message}")]
    Fault { code: i32, message: String },

    #[error("Invalid XML-RPC document: {0}")]
    Parse(String),

    #[error("Invalid date {0:?}: expected YYYY-MM-DD [HH:MM[:SS]] or YYYYMMDDTHH:MM:SS")]
    InvalidDate(String),

    #[error("Failed to read credentials from terminal: {0}")]
    Prompt(#[source] std::io::Error),

    #[error("No {0} available for login")]
    MissingCredentials(&'static str),

    #[error("Session is closed - create a new session to continue")]
    SessionClosed,

    #[error("Failed to {context}: {source}")]
    Failed {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// The remote fault behind this error, if any, as `(code, message)`.
    pub fn fault(&self) -> Option<(i32, &str)> {
        match self {
            Error::Fault { code, message } => Some((*code, message.as_str())),
            Error::Failed { source, .. } => source.fault(),
            _ => None,
        }
    }

    /// True when the server rejected the session key. Callers react to this
    /// by calling `Session::renew` and retrying.
    pub fn is_auth_failure(&self) -> bool {
        match self.fault() {
            Some((code, message)) => {
                let message = message.to_lowercase();
                AUTH_FAULT_CODES.contains(&code)
                    || message.contains("could not find session")
                    || message.contains("session expired")
                    || message.contains("invalid session")
            }
            None => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed HTTP response: {0}")]
    MalformedResponse(String),
}

impl TransportError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: u16, body: &str) -> Self {
        TransportError::Status {
            status,
            body: Self::truncate_body(body),
        }
    }
}

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Credential file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Credential file could not be parsed: {0}")]
    Parse(String),

    #[error("Cannot store {0}: line breaks, surrounding whitespace and a trailing backslash are not kept by the file format")]
    Unrepresentable(&'static str),
}
