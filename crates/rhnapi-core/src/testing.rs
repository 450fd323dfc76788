//! Test doubles for the transport, prompt and report seams, plus a
//! single-request HTTP proxy on a local port.

use std::collections::{HashMap, VecDeque};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::auth::Prompter;
use crate::error::TransportError;
use crate::rpc::{codec, Value};
use crate::transport::{ProxyAddress, Transport};

#[derive(Default)]
struct Script {
    replies: HashMap<String, VecDeque<String>>,
    requests: Vec<(String, String)>,
}

/// Transport answering each method from a queue of canned responses.
/// Clones share the same script so a test can inspect traffic afterwards.
#[derive(Clone, Default)]
pub(crate) struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    fn push(&self, method: &str, response: String) {
        self.script
            .lock()
            .unwrap()
            .replies
            .entry(method.to_string())
            .or_default()
            .push_back(response);
    }

    pub(crate) fn reply(&self, method: &str, value: Value) {
        self.push(method, codec::encode_response(&value));
    }

    pub(crate) fn fault(&self, method: &str, code: i32, message: &str) {
        self.push(method, codec::encode_fault(code, message));
    }

    /// Method names in the order they were called.
    pub(crate) fn methods(&self) -> Vec<String> {
        let script = self.script.lock().unwrap();
        script.requests.iter().map(|(m, _)| m.clone()).collect()
    }

    /// Request bodies sent for `method`.
    pub(crate) fn bodies(&self, method: &str) -> Vec<String> {
        let script = self.script.lock().unwrap();
        script
            .requests
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, b)| b.clone())
            .collect()
    }
}

fn method_name(body: &str) -> String {
    body.split_once("<methodName>")
        .and_then(|(_, rest)| rest.split_once("</methodName>"))
        .map(|(name, _)| name.to_string())
        .unwrap_or_default()
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn post(&self, body: String) -> Result<String, TransportError> {
        let method = method_name(&body);
        let mut script = self.script.lock().unwrap();
        script.requests.push((method.clone(), body));
        script
            .replies
            .get_mut(&method)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| TransportError::MalformedResponse(format!("no scripted reply for {}", method)))
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

/// Prompter returning fixed answers and counting how often it was asked.
#[derive(Default)]
pub(crate) struct ScriptedPrompter {
    pub login: Option<String>,
    pub password: Option<String>,
    pub login_prompts: usize,
    pub password_prompts: usize,
}

impl ScriptedPrompter {
    pub(crate) fn answering(login: &str, password: &str) -> Self {
        Self {
            login: Some(login.to_string()),
            password: Some(password.to_string()),
            ..Self::default()
        }
    }
}

impl Prompter for ScriptedPrompter {
    fn prompt_login(&mut self, _hostname: &str) -> io::Result<String> {
        self.login_prompts += 1;
        self.login
            .clone()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "no login scripted"))
    }

    fn prompt_password(&mut self, _login: &str, _hostname: &str) -> io::Result<String> {
        self.password_prompts += 1;
        self.password
            .clone()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "no password scripted"))
    }
}

/// In-memory `Write` sink shared between a reporter and the test.
#[derive(Clone, Default)]
pub(crate) struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// `200 OK` wrapping an XML-RPC response for `value`.
pub(crate) fn http_ok(value: &Value) -> String {
    let body = codec::encode_response(value);
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/xml\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    )
}

/// Accept one connection, capture the full request and answer with `reply`.
/// With `hold_open` the connection stays up until the client drops it.
pub(crate) async fn serve_once(reply: String, hold_open: bool) -> (ProxyAddress, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&request);
            if let Some((head, body)) = text.split_once("\r\n\r\n") {
                let len: usize = head
                    .lines()
                    .find_map(|l| l.strip_prefix("Content-Length: "))
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(0);
                if body.len() >= len {
                    break;
                }
            }
        }

        socket.write_all(reply.as_bytes()).await.unwrap();
        if hold_open {
            // returns once the client closes its end
            let _ = socket.read(&mut buf).await;
        } else {
            socket.shutdown().await.unwrap();
        }
        String::from_utf8(request).unwrap()
    });

    (
        ProxyAddress {
            host: "127.0.0.1".to_string(),
            port,
        },
        handle,
    )
}
