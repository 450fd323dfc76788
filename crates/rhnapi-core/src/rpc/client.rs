use tracing::debug;

use super::{codec, Value};
use crate::error::Result;
use crate::transport::Transport;

/// Invokes named remote methods over exactly one transport.
pub struct RpcClient {
    transport: Box<dyn Transport>,
}

impl RpcClient {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Call `method` with positional `params` and decode the result.
    /// Remote faults come back as `Error::Fault`.
    pub async fn call(&self, method: &str, params: &[Value]) -> Result<Value> {
        debug!(method, params = params.len(), transport = %self.transport.describe(), "XML-RPC call");

        let body = codec::encode_call(method, params);
        let response = self.transport.post(body).await?;
        codec::decode_response(&response)
    }

    pub fn describe(&self) -> String {
        self.transport.describe()
    }
}
