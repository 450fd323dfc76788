//! Client-side session handling for the RHN/Spacewalk XML-RPC API.
//!
//! A [`Session`] resolves credentials, opens a direct or proxied transport,
//! logs in and then serves as the handle every API call goes through:
//!
//! ```no_run
//! use rhnapi_core::{Session, SessionOptions, Value};
//!
//! # async fn run() -> rhnapi_core::Result<()> {
//! let options = SessionOptions::new()
//!     .credential_file(rhnapi_core::CredentialStore::default_path().unwrap_or_default());
//! let mut session = Session::connect("rhn.example.com", options).await?;
//!
//! let systems = match session.call_with_key("system.listSystems", &[]).await {
//!     Ok(systems) => systems,
//!     Err(e) => return session.fail(e, "list systems"),
//! };
//! println!("{:?}", systems.as_array().map(<[Value]>::len));
//!
//! session.logout().await
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod dates;
pub mod error;
pub mod rpc;
pub mod transport;

#[cfg(test)]
mod testing;

pub use auth::{CredentialStore, Prompter, Session, SessionOptions, SessionState};
pub use error::{CredentialError, Error, Result, TransportError};
pub use rpc::Value;
