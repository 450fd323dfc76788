use async_trait::async_trait;
use reqwest::{header, Client};

use super::{Transport, RPC_PATH, USER_AGENT};
use crate::error::TransportError;

/// Direct connection to the server's XML-RPC handler.
pub struct HttpsTransport {
    client: Client,
    endpoint: String,
}

impl HttpsTransport {
    /// Transport for `https://<hostname>/rpc/api`.
    pub fn new(hostname: &str) -> Result<Self, TransportError> {
        Self::with_endpoint(format!("https://{}{}", hostname, RPC_PATH))
    }

    /// Transport for an arbitrary endpoint URL, e.g. a local mock server.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self, TransportError> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl Transport for HttpsTransport {
    async fn post(&self, body: String) -> Result<String, TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(header::CONTENT_TYPE, "text/xml")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(TransportError::from_status(status.as_u16(), &text));
        }
        Ok(text)
    }

    fn describe(&self) -> String {
        self.endpoint.clone()
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const VERSION_RESPONSE: &str = "<?xml version=\"1.0\"?><methodResponse><params><param>\
        <value><string>25</string></value></param></params></methodResponse>";

    #[tokio::test]
    async fn test_post_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc/api"))
            .and(header("content-type", "text/xml"))
            .and(body_string_contains("<methodName>api.getVersion</methodName>"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VERSION_RESPONSE))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpsTransport::with_endpoint(format!("{}/rpc/api", server.uri())).unwrap();
        let body = crate::rpc::codec::encode_call("api.getVersion", &[]);
        let response = transport.post(body).await.unwrap();
        assert_eq!(response, VERSION_RESPONSE);
    }

    #[tokio::test]
    async fn test_post_maps_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let transport = HttpsTransport::with_endpoint(format!("{}/rpc/api", server.uri())).unwrap();
        match transport.post(String::new()).await {
            Err(TransportError::Status { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "maintenance");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_propagates() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let transport =
            HttpsTransport::with_endpoint(format!("http://127.0.0.1:{}/rpc/api", port)).unwrap();
        assert!(matches!(
            transport.post(String::new()).await,
            Err(TransportError::Network(_))
        ));
    }
}
