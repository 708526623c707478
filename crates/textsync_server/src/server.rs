//! The reference text server.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, RequestHandler};
use crate::store::{FileRecord, Share};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use textsync_protocol::{Document, Endpoint, Method, SessionCredentials, StepEntry};

/// Status and body of a handled request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerResponse {
    /// HTTP status.
    pub status: u16,
    /// Response body. JSON for everything but `session/fetch`.
    pub body: String,
}

impl ServerResponse {
    fn ok(body: String) -> Self {
        Self { status: 200, body }
    }
}

impl From<ServerError> for ServerResponse {
    fn from(err: ServerError) -> Self {
        Self {
            status: err.status(),
            body: err.body(),
        }
    }
}

/// The reference text server.
///
/// Keeps files, documents and sessions in memory and answers the session
/// endpoints. Test helpers simulate edits made outside a session and
/// inject failures.
///
/// # Example
///
/// ```
/// use textsync_server::{ServerConfig, TextServer};
///
/// let server = TextServer::new(ServerConfig::default());
/// let file_id = server.add_file("notes.md", "# Notes\n");
///
/// // An HTTP front end routes every request through `server.handle()`.
/// assert_eq!(server.file(file_id).unwrap().content, "# Notes\n");
/// ```
pub struct TextServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
}

impl TextServer {
    /// Creates a new server.
    pub fn new(config: ServerConfig) -> Self {
        let context = Arc::new(HandlerContext::new(config));
        let handler = RequestHandler::new(Arc::clone(&context));

        Self { handler, context }
    }

    /// Returns the request handler.
    pub fn handler(&self) -> &RequestHandler {
        &self.handler
    }

    /// Handles a request for `endpoint`.
    ///
    /// GET endpoints read the session credentials from `query`; POST
    /// endpoints decode `body`.
    pub fn handle(
        &self,
        endpoint: Endpoint,
        public: bool,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> ServerResponse {
        match self.dispatch(endpoint, public, query, body) {
            Ok(response) => response,
            Err(err) => {
                if err.is_server_error() {
                    tracing::error!(%endpoint, %err, "request failed");
                } else {
                    tracing::debug!(%endpoint, %err, "request rejected");
                }
                err.into()
            }
        }
    }

    fn dispatch(
        &self,
        endpoint: Endpoint,
        public: bool,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> ServerResult<ServerResponse> {
        let handler = &self.handler;
        match endpoint.method() {
            Method::Get => {
                let credentials = SessionCredentials::from_query(
                    query.iter().map(|(k, v)| (k.as_str(), v.as_str())),
                )?;
                match endpoint {
                    Endpoint::Fetch => handler
                        .handle_fetch(credentials, public)
                        .map(ServerResponse::ok),
                    _ => {
                        handler.handle_close(credentials, public)?;
                        json(&serde_json::json!({}))
                    }
                }
            }
            Method::Post => match endpoint {
                Endpoint::Create => json(&handler.handle_create(decode(body)?, public)?),
                Endpoint::Sync => json(&handler.handle_sync(decode(body)?, public)?),
                Endpoint::Push => json(&handler.handle_push(decode(body)?, public)?),
                _ => json(&handler.handle_update_session(decode(body)?, public)?),
            },
        }
    }

    /// Stores a new file and returns its ID.
    pub fn add_file(&self, path: impl Into<String>, content: impl Into<String>) -> i64 {
        self.context
            .store
            .write()
            .add_file(path.into(), content.into())
    }

    /// Shares a file under `token`.
    pub fn add_share(&self, token: impl Into<String>, file_id: i64, read_only: bool) {
        self.context
            .store
            .write()
            .shares
            .insert(token.into(), Share { file_id, read_only });
    }

    /// Returns a stored file.
    pub fn file(&self, file_id: i64) -> Option<FileRecord> {
        self.context.store.read().files.get(&file_id).cloned()
    }

    /// Returns the document of an open file.
    pub fn document(&self, file_id: i64) -> Option<Document> {
        self.context
            .store
            .read()
            .documents
            .get(&file_id)
            .map(|record| record.document.clone())
    }

    /// Returns the accepted steps of an open file.
    pub fn steps(&self, file_id: i64) -> Vec<StepEntry> {
        self.context
            .store
            .read()
            .documents
            .get(&file_id)
            .map(|record| record.steps.clone())
            .unwrap_or_default()
    }

    /// Returns the number of open sessions.
    pub fn session_count(&self) -> usize {
        self.context.store.read().sessions.len()
    }

    /// Changes the stored file as if edited outside any session.
    ///
    /// The next save without `force` is rejected with a conflict.
    pub fn external_edit(&self, file_id: i64, content: impl Into<String>) -> bool {
        self.context
            .store
            .write()
            .write_file(file_id, content.into())
            .is_some()
    }

    /// Replaces the stored file and recreates its document.
    ///
    /// Open sessions see a new `baseVersionEtag` on their next sync.
    pub fn replace_base(&self, file_id: i64, content: impl Into<String>) -> bool {
        let mut store = self.context.store.write();
        if store.write_file(file_id, content.into()).is_none() {
            return false;
        }
        store.open_document(file_id, true).is_some()
    }

    /// Makes the next request to `endpoint` fail with `status`.
    pub fn fail_next(&self, endpoint: Endpoint, status: u16) {
        self.context.fail_next(endpoint, status);
    }
}

fn decode<T: DeserializeOwned>(body: Option<&Value>) -> ServerResult<T> {
    let body = body.ok_or_else(|| ServerError::InvalidRequest("missing body".into()))?;
    Ok(T::deserialize(body)?)
}

fn json<T: Serialize>(value: &T) -> ServerResult<ServerResponse> {
    serde_json::to_string(value)
        .map(ServerResponse::ok)
        .map_err(|e| ServerError::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use textsync_protocol::{CreateSessionResponse, ProtocolError};

    fn create(server: &TextServer, file_id: i64) -> CreateSessionResponse {
        let response = server.handle(
            Endpoint::Create,
            false,
            &[],
            Some(&json!({ "fileId": file_id })),
        );
        assert_eq!(response.status, 200);
        serde_json::from_str(&response.body).unwrap()
    }

    fn query(credentials: &SessionCredentials) -> Vec<(String, String)> {
        credentials
            .query_pairs()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    #[test]
    fn server_lifecycle() {
        let server = TextServer::new(ServerConfig::default());
        let file_id = server.add_file("a.md", "hello");
        let opened = create(&server, file_id);
        assert_eq!(server.session_count(), 1);
        assert_eq!(opened.document.id, file_id);

        let credentials = SessionCredentials::new(&opened.document, &opened.session, None);
        let fetched = server.handle(Endpoint::Fetch, false, &query(&credentials), None);
        assert_eq!(fetched, ServerResponse::ok("hello".into()));

        let closed = server.handle(Endpoint::Close, false, &query(&credentials), None);
        assert_eq!(closed.status, 200);
        assert_eq!(server.session_count(), 0);
    }

    #[test]
    fn full_sync_flow() {
        let server = TextServer::new(ServerConfig::default());
        let file_id = server.add_file("a.md", "");
        let opened = create(&server, file_id);
        let credentials = SessionCredentials::new(&opened.document, &opened.session, None);

        let pushed = server.handle(
            Endpoint::Push,
            false,
            &[],
            Some(&json!({
                "documentId": file_id,
                "sessionId": opened.session.id,
                "sessionToken": opened.session.token,
                "steps": [{ "insert": "a" }, { "insert": "b" }],
                "version": 0,
            })),
        );
        assert_eq!(pushed.status, 200);
        assert_eq!(server.document(file_id).unwrap().current_version, 2);

        let synced = server.handle(
            Endpoint::Sync,
            false,
            &[],
            Some(&serde_json::to_value(textsync_protocol::SyncRequest {
                credentials,
                version: 0,
                autosave_content: Some("ab".into()),
                force: false,
                manual_save: false,
                file_path: None,
            })
            .unwrap()),
        );
        assert_eq!(synced.status, 200);
        let body: Value = serde_json::from_str(&synced.body).unwrap();
        assert_eq!(body["steps"].as_array().unwrap().len(), 1);
        assert_eq!(server.file(file_id).unwrap().content, "ab");
        assert_eq!(server.steps(file_id).len(), 1);
    }

    #[test]
    fn replace_base_changes_etag() {
        let server = TextServer::new(ServerConfig::default());
        let file_id = server.add_file("a.md", "old");
        let opened = create(&server, file_id);

        assert!(server.replace_base(file_id, "new"));
        let document = server.document(file_id).unwrap();
        assert_ne!(
            document.base_version_etag,
            opened.document.base_version_etag
        );
        assert!(!server.replace_base(99, "x"));
    }

    #[test]
    fn bad_requests() {
        let server = TextServer::new(ServerConfig::default());
        let response = server.handle(Endpoint::Fetch, false, &[], None);
        assert_eq!(response.status, 400);
        assert!(response
            .body
            .contains(&ProtocolError::MissingField("documentId").to_string()));

        let response = server.handle(Endpoint::Sync, false, &[], None);
        assert_eq!(response.status, 400);
    }

    #[test]
    fn injected_failures_carry_document() {
        let server = TextServer::new(ServerConfig::default());
        let file_id = server.add_file("a.md", "");
        let opened = create(&server, file_id);
        let credentials = SessionCredentials::new(&opened.document, &opened.session, None);

        server.fail_next(Endpoint::Close, 500);
        let response = server.handle(Endpoint::Close, false, &query(&credentials), None);
        assert_eq!(response.status, 500);
        let body: Value = serde_json::from_str(&response.body).unwrap();
        assert_eq!(body["document"]["id"], file_id);
    }
}
