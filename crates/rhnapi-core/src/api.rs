//! Typed wrappers for the remote methods the session itself relies on.
//!
//! The rest of the API catalog follows the same shape: a session key plus
//! positional arguments through `Session::call_with_key`.

use crate::error::{Error, Result};
use crate::rpc::{RpcClient, Value};

fn expect_string(method: &str, value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        Value::Double(d) => Ok(d.to_string()),
        other => Err(Error::Parse(format!(
            "{} returned {:?}, expected a string",
            method, other
        ))),
    }
}

/// `auth.login`: exchange credentials for a session key.
pub async fn login(
    rpc: &RpcClient,
    login: &str,
    password: &str,
    duration: Option<i32>,
) -> Result<String> {
    let mut params = vec![Value::from(login), Value::from(password)];
    if let Some(seconds) = duration {
        params.push(Value::Int(seconds));
    }
    let key = rpc.call("auth.login", &params).await?;
    expect_string("auth.login", key)
}

/// `auth.logout`: invalidate a session key server-side.
pub async fn logout(rpc: &RpcClient, key: &str) -> Result<bool> {
    let result = rpc.call("auth.logout", &[Value::from(key)]).await?;
    Ok(result.as_success().unwrap_or(false))
}

/// `api.getVersion`: version of the XML-RPC API.
pub async fn get_version(rpc: &RpcClient) -> Result<String> {
    let version = rpc.call("api.getVersion", &[]).await?;
    expect_string("api.getVersion", version)
}

/// `api.systemVersion`: version of the server product.
pub async fn system_version(rpc: &RpcClient) -> Result<String> {
    let version = rpc.call("api.systemVersion", &[]).await?;
    expect_string("api.systemVersion", version)
}
