//! HTTP transport implementation.
//!
//! This module provides an HTTP-based transport for the sync engine.
//! The actual HTTP client is abstracted via a trait so the same transport
//! runs over reqwest in production and over an in-process loopback in tests.

use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use textsync_protocol::{
    CloseSessionRequest, CreateSessionRequest, CreateSessionResponse, Endpoint,
    FetchDocumentRequest, Method, PushRequest, PushResponse, Session, SessionCredentials,
    SyncRequest, SyncResponse, UpdateSessionRequest,
};

/// An HTTP request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Request method.
    pub method: Method,
    /// Absolute URL without the query string.
    pub url: String,
    /// Query parameters.
    pub query: Vec<(String, String)>,
    /// JSON body for POST requests.
    pub body: Option<Value>,
}

/// An HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Raw body.
    pub body: String,
}

impl HttpResponse {
    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// Implementations return `Err` only when no response was received.
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// Sends a request.
    async fn send(&self, request: HttpRequest) -> SyncResult<HttpResponse>;
}

/// HTTP-based sync transport.
pub struct HttpTransport<C: HttpClient> {
    /// Base URL of the server (e.g., "https://cloud.example.com").
    base_url: String,
    /// HTTP client implementation.
    client: C,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the HTTP client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns the URL of `endpoint`.
    pub fn endpoint_url(&self, endpoint: Endpoint, public: bool) -> String {
        format!("{}{}", self.base_url, endpoint.url_path(public))
    }

    async fn send(
        &self,
        endpoint: Endpoint,
        public: bool,
        query: Vec<(String, String)>,
        body: Option<Value>,
    ) -> SyncResult<String> {
        let request = HttpRequest {
            method: endpoint.method(),
            url: self.endpoint_url(endpoint, public),
            query,
            body,
        };
        tracing::trace!(url = %request.url, "request");

        let response = self.client.send(request).await?;
        if response.is_success() {
            return Ok(response.body);
        }

        tracing::debug!(%endpoint, status = response.status, "request rejected");
        Err(SyncError::http(
            response.status,
            serde_json::from_str(&response.body).ok(),
        ))
    }

    async fn post_json<Req, Res>(
        &self,
        endpoint: Endpoint,
        public: bool,
        request: &Req,
    ) -> SyncResult<Res>
    where
        Req: Serialize + Sync,
        Res: DeserializeOwned,
    {
        let body = serde_json::to_value(request)?;
        let text = self.send(endpoint, public, Vec::new(), Some(body)).await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn get(
        &self,
        endpoint: Endpoint,
        credentials: &SessionCredentials,
    ) -> SyncResult<String> {
        let query = credentials
            .query_pairs()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        self.send(endpoint, credentials.token.is_some(), query, None)
            .await
    }
}

#[async_trait]
impl<C: HttpClient> SyncTransport for HttpTransport<C> {
    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> SyncResult<CreateSessionResponse> {
        self.post_json(Endpoint::Create, request.token.is_some(), request)
            .await
    }

    async fn fetch_document(&self, request: &FetchDocumentRequest) -> SyncResult<String> {
        self.get(Endpoint::Fetch, request).await
    }

    async fn sync(&self, request: &SyncRequest) -> SyncResult<SyncResponse> {
        let public = request.credentials.token.is_some();
        self.post_json(Endpoint::Sync, public, request).await
    }

    async fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        let public = request.credentials.token.is_some();
        self.post_json(Endpoint::Push, public, request).await
    }

    async fn update_session(&self, request: &UpdateSessionRequest) -> SyncResult<Session> {
        let public = request.credentials.token.is_some();
        self.post_json(Endpoint::UpdateSession, public, request)
            .await
    }

    async fn close_session(&self, request: &CloseSessionRequest) -> SyncResult<()> {
        self.get(Endpoint::Close, request).await.map(|_| ())
    }
}

/// An [`HttpClient`] backed by reqwest.
#[cfg(feature = "reqwest")]
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

#[cfg(feature = "reqwest")]
impl ReqwestClient {
    /// Creates a client with the given request timeout.
    pub fn new(timeout: std::time::Duration) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::InvalidConfig(e.to_string()))?;
        Ok(Self { client })
    }

    /// Creates a client from the sync configuration.
    pub fn from_config(config: &crate::config::SyncConfig) -> SyncResult<Self> {
        Self::new(config.timeout)
    }
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(err: reqwest::Error) -> SyncError {
    if err.is_timeout() {
        SyncError::Timeout
    } else {
        SyncError::transport(err.to_string())
    }
}

#[cfg(feature = "reqwest")]
#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(&self, request: HttpRequest) -> SyncResult<HttpResponse> {
        let builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        let builder = builder.query(&request.query);
        let builder = match request.body {
            Some(ref body) => builder.json(body),
            None => builder,
        };

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_reqwest_error)?;
        Ok(HttpResponse { status, body })
    }
}

/// Trait for servers that can handle loopback requests.
pub trait LoopbackServer: Send + Sync + 'static {
    /// Handles a request for `endpoint` and returns the status and body.
    fn handle(
        &self,
        endpoint: Endpoint,
        public: bool,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> HttpResponse;
}

/// A loopback HTTP client that routes requests directly to a server.
///
/// Useful for testing without actual network overhead. Going offline makes
/// every request fail as unreachable.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
    offline: AtomicBool,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self {
            server,
            offline: AtomicBool::new(false),
        }
    }

    /// Returns the server.
    pub fn server(&self) -> &S {
        &self.server
    }

    /// Simulates losing or regaining the network.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    async fn send(&self, request: HttpRequest) -> SyncResult<HttpResponse> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SyncError::transport("network unreachable"));
        }
        match Endpoint::from_url_path(&request.url) {
            Some((endpoint, public)) => Ok(self.server.handle(
                endpoint,
                public,
                &request.query,
                request.body.as_ref(),
            )),
            None => Ok(HttpResponse {
                status: 404,
                body: String::new(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use textsync_protocol::Document;

    struct TestClient {
        response: Mutex<Option<HttpResponse>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl TestClient {
        fn new() -> Self {
            Self {
                response: Mutex::new(None),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn set_response(&self, status: u16, body: impl Into<String>) {
            *self.response.lock() = Some(HttpResponse {
                status,
                body: body.into(),
            });
        }
    }

    #[async_trait]
    impl HttpClient for TestClient {
        async fn send(&self, request: HttpRequest) -> SyncResult<HttpResponse> {
            self.requests.lock().push(request);
            self.response
                .lock()
                .clone()
                .ok_or_else(|| SyncError::transport("no response set"))
        }
    }

    fn credentials(token: Option<&str>) -> SessionCredentials {
        SessionCredentials {
            document_id: 1,
            session_id: 2,
            session_token: "abc".into(),
            token: token.map(String::from),
        }
    }

    #[test]
    fn transport_creation() {
        let transport = HttpTransport::new("https://cloud.example.com/", TestClient::new());
        assert_eq!(transport.base_url(), "https://cloud.example.com");
        assert_eq!(
            transport.endpoint_url(Endpoint::Sync, false),
            "https://cloud.example.com/apps/text/session/sync"
        );
        assert_eq!(
            transport.endpoint_url(Endpoint::Sync, true),
            "https://cloud.example.com/apps/text/public/session/sync"
        );
    }

    #[tokio::test]
    async fn fetch_sends_credentials_as_query() {
        let transport = HttpTransport::new("https://cloud.example.com", TestClient::new());
        transport.client.set_response(200, "# Hello");

        let source = transport
            .fetch_document(&credentials(Some("share")))
            .await
            .unwrap();
        assert_eq!(source, "# Hello");

        let requests = transport.client.requests.lock();
        assert_eq!(requests[0].method, Method::Get);
        assert!(requests[0].url.ends_with("/apps/text/public/session/fetch"));
        assert!(requests[0]
            .query
            .contains(&("sessionToken".to_string(), "abc".to_string())));
        assert!(requests[0].body.is_none());
    }

    #[tokio::test]
    async fn sync_decodes_response() {
        let transport = HttpTransport::new("https://cloud.example.com", TestClient::new());
        transport.client.set_response(
            200,
            json!({"document": {"id": 1, "currentVersion": 3}, "sessions": [], "steps": []})
                .to_string(),
        );
        let request = SyncRequest {
            credentials: credentials(None),
            version: 3,
            autosave_content: None,
            force: false,
            manual_save: false,
            file_path: None,
        };

        let response = transport.sync(&request).await.unwrap();
        assert_eq!(response.document.current_version, 3);

        let requests = transport.client.requests.lock();
        assert_eq!(requests[0].method, Method::Post);
        assert_eq!(requests[0].body.as_ref().unwrap()["version"], 3);
    }

    #[tokio::test]
    async fn error_status_keeps_json_body() {
        let transport = HttpTransport::new("https://cloud.example.com", TestClient::new());
        let mut document = Document::new(1, "etag");
        document.current_version = 5;
        transport
            .client
            .set_response(409, json!({ "document": document }).to_string());

        let push = PushRequest {
            credentials: credentials(None),
            steps: vec![json!({"insert": "x"})],
            version: 5,
            file_path: None,
        };
        let err = transport.push(&push).await.unwrap_err();
        assert_eq!(err.status(), Some(409));
        assert!(err.conflict().unwrap().at_version(5));
    }

    #[tokio::test]
    async fn error_status_with_html_body() {
        let transport = HttpTransport::new("https://cloud.example.com", TestClient::new());
        transport.client.set_response(503, "<html>maintenance</html>");
        let err = transport.close_session(&credentials(None)).await.unwrap_err();
        assert!(matches!(err, SyncError::Http { status: 503, body: None }));
        assert!(!err.is_network());
    }

    #[tokio::test]
    async fn no_response_is_network_error() {
        let transport = HttpTransport::new("https://cloud.example.com", TestClient::new());
        let err = transport
            .create_session(&CreateSessionRequest::default())
            .await
            .unwrap_err();
        assert!(err.is_network());
    }

    struct EchoServer;

    impl LoopbackServer for EchoServer {
        fn handle(
            &self,
            endpoint: Endpoint,
            public: bool,
            _query: &[(String, String)],
            _body: Option<&Value>,
        ) -> HttpResponse {
            HttpResponse {
                status: 200,
                body: format!("{}:{}", endpoint, public),
            }
        }
    }

    #[tokio::test]
    async fn loopback_routes_by_path() {
        let transport = HttpTransport::new("http://localhost", LoopbackClient::new(EchoServer));
        let body = transport
            .fetch_document(&credentials(Some("share")))
            .await
            .unwrap();
        assert_eq!(body, "session/fetch:true");

        transport.client.set_offline(true);
        let err = transport.fetch_document(&credentials(None)).await.unwrap_err();
        assert!(err.is_network());
    }
}
