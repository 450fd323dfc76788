use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use super::{ProxyAddress, Transport, USER_AGENT};
use crate::error::TransportError;

/// Sends each request over a plain TCP connection to an HTTP proxy.
///
/// The request line and `Host` header name the real destination with an
/// `https` scheme, so the proxy opens the TLS leg to the server itself.
/// One connection per request.
pub struct ProxyTransport {
    proxy: ProxyAddress,
    destination: String,
    path: String,
}

impl ProxyTransport {
    pub fn new(proxy: ProxyAddress, destination: &str, path: &str) -> Self {
        Self {
            proxy,
            destination: destination.to_string(),
            path: path.to_string(),
        }
    }

    /// The request head sent to the proxy for a body of `content_length` bytes.
    fn request_head(&self, content_length: usize) -> String {
        format!(
            "POST https://{dest}{path} HTTP/1.1\r\n\
             Host: {dest}\r\n\
             User-Agent: {ua}\r\n\
             Content-Type: text/xml\r\n\
             Content-Length: {len}\r\n\
             Connection: close\r\n\
             \r\n",
            dest = self.destination,
            path = self.path,
            ua = USER_AGENT,
            len = content_length,
        )
    }
}

#[async_trait]
impl Transport for ProxyTransport {
    async fn post(&self, body: String) -> Result<String, TransportError> {
        let mut stream = TcpStream::connect((self.proxy.host.as_str(), self.proxy.port)).await?;
        debug!(proxy = %self.proxy, destination = %self.destination, "Connected to proxy");

        stream.write_all(self.request_head(body.len()).as_bytes()).await?;
        stream.write_all(body.as_bytes()).await?;
        stream.flush().await?;

        let (status, body) = read_response(&mut stream).await?;
        if !(200..300).contains(&status) {
            return Err(TransportError::from_status(status, &body));
        }
        Ok(body)
    }

    fn describe(&self) -> String {
        format!(
            "https://{}{} via proxy {}",
            self.destination, self.path, self.proxy
        )
    }
}

/// How the end of the response body is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    Length(usize),
    Chunked,
    UntilClose,
}

#[derive(Debug)]
struct ResponseHead {
    status: u16,
    framing: Framing,
    body_start: usize,
}

fn malformed(reason: &str) -> TransportError {
    TransportError::MalformedResponse(reason.to_string())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Read until the body is complete by its own framing, or the proxy closes
/// the connection. A proxy that keeps the connection open does not stall us
/// once `Content-Length` bytes or the last chunk have arrived.
async fn read_response<R>(reader: &mut R) -> Result<(u16, String), TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut raw = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return parse_response(&raw);
        }
        raw.extend_from_slice(&buf[..n]);

        if let Some(head) = parse_head(&raw)? {
            if let Some(body) = complete_body(head.framing, &raw[head.body_start..])? {
                return Ok((head.status, into_text(body)?));
            }
        }
    }
}

/// Status and framing once the full header block has arrived.
fn parse_head(raw: &[u8]) -> Result<Option<ResponseHead>, TransportError> {
    let Some(head_end) = find(raw, b"\r\n\r\n") else {
        return Ok(None);
    };
    let head = std::str::from_utf8(&raw[..head_end]).map_err(|_| malformed("non-UTF-8 headers"))?;

    let mut lines = head.split("\r\n");
    let status_line = lines.next().unwrap_or_default();
    let mut parts = status_line.split_whitespace();
    let status = match (parts.next(), parts.next()) {
        (Some(version), Some(code)) if version.starts_with("HTTP/") => code
            .parse::<u16>()
            .map_err(|_| malformed("invalid status code"))?,
        _ => return Err(malformed("invalid status line")),
    };

    let mut content_length = None;
    let mut chunked = false;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = Some(
                value
                    .parse::<usize>()
                    .map_err(|_| malformed("invalid Content-Length"))?,
            );
        } else if name.eq_ignore_ascii_case("transfer-encoding") {
            chunked = value.to_ascii_lowercase().contains("chunked");
        }
    }

    let framing = match (chunked, content_length) {
        (true, _) => Framing::Chunked,
        (false, Some(len)) => Framing::Length(len),
        (false, None) => Framing::UntilClose,
    };
    Ok(Some(ResponseHead {
        status,
        framing,
        body_start: head_end + 4,
    }))
}

/// The body, if `payload` already holds all of it.
fn complete_body(framing: Framing, payload: &[u8]) -> Result<Option<Vec<u8>>, TransportError> {
    match framing {
        Framing::Length(len) if payload.len() >= len => Ok(Some(payload[..len].to_vec())),
        Framing::Length(_) | Framing::UntilClose => Ok(None),
        Framing::Chunked => decode_chunked(payload),
    }
}

fn into_text(body: Vec<u8>) -> Result<String, TransportError> {
    String::from_utf8(body).map_err(|_| malformed("non-UTF-8 body"))
}

/// Split a response read up to connection close into status code and body text.
fn parse_response(raw: &[u8]) -> Result<(u16, String), TransportError> {
    let head = parse_head(raw)?.ok_or_else(|| malformed("missing end of headers"))?;
    let payload = &raw[head.body_start..];

    let body = match head.framing {
        Framing::UntilClose => payload.to_vec(),
        Framing::Length(_) => complete_body(head.framing, payload)?
            .ok_or_else(|| malformed("body shorter than Content-Length"))?,
        Framing::Chunked => {
            decode_chunked(payload)?.ok_or_else(|| malformed("truncated chunked body"))?
        }
    };
    Ok((head.status, into_text(body)?))
}

/// Decode a chunked body. `Ok(None)` means more input is needed.
fn decode_chunked(mut payload: &[u8]) -> Result<Option<Vec<u8>>, TransportError> {
    let mut body = Vec::new();
    loop {
        let Some(line_end) = find(payload, b"\r\n") else {
            return Ok(None);
        };
        let size_line = std::str::from_utf8(&payload[..line_end])
            .map_err(|_| malformed("invalid chunk size"))?;
        let size_hex = size_line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_hex, 16).map_err(|_| malformed("invalid chunk size"))?;
        payload = &payload[line_end + 2..];

        if size == 0 {
            // optional trailers, then an empty line
            let done = payload.starts_with(b"\r\n") || find(payload, b"\r\n\r\n").is_some();
            return Ok(done.then_some(body));
        }

        let chunk_end = size
            .checked_add(2)
            .ok_or_else(|| malformed("chunk size out of range"))?;
        if payload.len() < chunk_end {
            return Ok(None);
        }
        if &payload[size..chunk_end] != b"\r\n" {
            return Err(malformed("missing CRLF after chunk"));
        }
        body.extend_from_slice(&payload[..size]);
        payload = &payload[chunk_end..];
    }
}
