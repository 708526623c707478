//! Request handlers for the session endpoints.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::store::{new_etag, SessionRecord, Store};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use textsync_protocol::{
    CloseSessionRequest, ConflictPayload, CreateSessionRequest, CreateSessionResponse, Endpoint,
    FetchDocumentRequest, PushRequest, PushResponse, Session, SessionCredentials, StepEntry,
    SyncRequest, SyncResponse, UpdateSessionRequest,
};

/// User ID reported for sessions opened without a share token.
pub const LOCAL_USER: &str = "admin";

/// Context for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    pub(crate) store: RwLock<Store>,
    failures: Mutex<Vec<(Endpoint, u16)>>,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            store: RwLock::new(Store::default()),
            failures: Mutex::new(Vec::new()),
        }
    }

    /// Makes the next request to `endpoint` fail with `status`.
    pub fn fail_next(&self, endpoint: Endpoint, status: u16) {
        self.failures.lock().push((endpoint, status));
    }

    fn take_failure(&self, endpoint: Endpoint) -> Option<u16> {
        let mut failures = self.failures.lock();
        let index = failures.iter().position(|(e, _)| *e == endpoint)?;
        Some(failures.remove(index).1)
    }

    /// Fails with an injected status, attaching the current document.
    fn injected(&self, endpoint: Endpoint, document_id: Option<i64>) -> ServerResult<()> {
        let Some(status) = self.take_failure(endpoint) else {
            return Ok(());
        };
        tracing::debug!(%endpoint, status, "injecting failure");
        let payload = document_id.and_then(|id| {
            self.store
                .read()
                .documents
                .get(&id)
                .map(|record| ConflictPayload::version_race(record.document.clone()))
        });
        Err(ServerError::Injected { status, payload })
    }
}

/// Handler for session requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    fn cutoff(&self, now: i64) -> i64 {
        now - self.context.config.session_expiry.as_secs() as i64
    }

    /// Handles `session/create`.
    pub fn handle_create(
        &self,
        request: CreateSessionRequest,
        public: bool,
    ) -> ServerResult<CreateSessionResponse> {
        self.context.injected(Endpoint::Create, request.file_id)?;
        let mut store = self.context.store.write();

        let (file_id, read_only) = if public {
            let token = request
                .token
                .as_deref()
                .ok_or_else(|| ServerError::NotAuthorized("share token required".into()))?;
            let share = *store
                .shares
                .get(token)
                .ok_or_else(|| ServerError::NotAuthorized("unknown share".into()))?;
            if let Some(ref path) = request.file_path {
                if store.file_by_path(path) != Some(share.file_id) {
                    return Err(ServerError::NotFound(path.clone()));
                }
            }
            (share.file_id, share.read_only)
        } else {
            let file_id = match (request.file_id, request.file_path.as_deref()) {
                (Some(id), _) => id,
                (None, Some(path)) => store
                    .file_by_path(path)
                    .ok_or_else(|| ServerError::NotFound(path.to_string()))?,
                (None, None) => {
                    return Err(ServerError::InvalidRequest(
                        "fileId or filePath required".into(),
                    ))
                }
            };
            (file_id, false)
        };

        let document = store
            .open_document(file_id, request.force_recreate)
            .map(|record| record.document.clone())
            .ok_or_else(|| ServerError::NotFound(format!("file {}", file_id)))?;

        let guest_name = public.then(|| request.guest_name.unwrap_or_else(|| "Guest".into()));
        let session = store.add_session(SessionRecord {
            session: Session {
                id: 0,
                token: new_etag(),
                guest_name,
            },
            document_id: file_id,
            user_id: (!public).then(|| LOCAL_USER.to_string()),
            share_token: request.token.filter(|_| public),
            read_only,
            last_contact: now_unix(),
        });
        tracing::info!(document = file_id, session = session.id, public, "session created");

        Ok(CreateSessionResponse {
            document,
            session,
            read_only,
        })
    }

    /// Checks the credentials and records contact. Returns the session.
    fn authorize(
        &self,
        store: &mut Store,
        credentials: &SessionCredentials,
        public: bool,
    ) -> ServerResult<SessionRecord> {
        let record = store
            .sessions
            .get_mut(&credentials.session_id)
            .filter(|r| {
                r.session.token == credentials.session_token
                    && r.document_id == credentials.document_id
            })
            .ok_or_else(|| {
                ServerError::NotAuthorized(format!("session {}", credentials.session_id))
            })?;
        if public && (credentials.token.is_none() || record.share_token != credentials.token) {
            return Err(ServerError::NotAuthorized("share token mismatch".into()));
        }
        record.last_contact = now_unix();
        Ok(record.clone())
    }

    /// Handles `session/fetch`, returning the content the document was
    /// created from.
    pub fn handle_fetch(&self, request: FetchDocumentRequest, public: bool) -> ServerResult<String> {
        self.context
            .injected(Endpoint::Fetch, Some(request.document_id))?;
        let mut store = self.context.store.write();
        self.authorize(&mut store, &request, public)?;
        store
            .documents
            .get(&request.document_id)
            .map(|record| record.base_content.clone())
            .ok_or_else(|| ServerError::NotFound(format!("document {}", request.document_id)))
    }

    /// Handles `session/sync`: saves autosave content and returns the steps
    /// the client has not seen.
    pub fn handle_sync(&self, request: SyncRequest, public: bool) -> ServerResult<SyncResponse> {
        let document_id = request.credentials.document_id;
        self.context.injected(Endpoint::Sync, Some(document_id))?;
        let mut store = self.context.store.write();
        let session = self.authorize(&mut store, &request.credentials, public)?;
        let now = now_unix();

        if let Some(content) = request.autosave_content.filter(|_| !session.read_only) {
            let file_etag = store
                .files
                .get(&document_id)
                .map(|file| (file.etag.clone(), file.content.clone()));
            let record = store
                .documents
                .get(&document_id)
                .ok_or_else(|| ServerError::NotFound(format!("document {}", document_id)))?;

            if let Some((etag, stored)) = file_etag {
                if etag != record.saved_etag && !request.force {
                    tracing::warn!(document = document_id, "file changed outside the session");
                    return Err(ServerError::Conflict(ConflictPayload::outside_change(
                        record.document.clone(),
                        stored,
                    )));
                }
            }

            let wants_save = request.version > record.document.last_saved_version
                || request.manual_save
                || request.force;
            if wants_save && request.version <= record.document.current_version {
                let etag = store
                    .write_file(document_id, content)
                    .ok_or_else(|| ServerError::NotFound(format!("file {}", document_id)))?;
                if let Some(record) = store.documents.get_mut(&document_id) {
                    record.saved_etag = etag;
                    record.document.last_saved_version = request.version;
                    record.document.last_saved_version_time = now;
                }
                tracing::debug!(document = document_id, version = request.version, "saved");
            }
        }

        let record = store
            .documents
            .get(&document_id)
            .ok_or_else(|| ServerError::NotFound(format!("document {}", document_id)))?;
        Ok(SyncResponse {
            document: record.document.clone(),
            steps: record.steps_since(request.version),
            sessions: store.collaborators(document_id, self.cutoff(now)),
        })
    }

    /// Handles `session/push`.
    pub fn handle_push(&self, request: PushRequest, public: bool) -> ServerResult<PushResponse> {
        let document_id = request.credentials.document_id;
        self.context.injected(Endpoint::Push, Some(document_id))?;
        if request.steps.len() > self.context.config.max_push_steps {
            return Err(ServerError::InvalidRequest(format!(
                "too many steps: {} > {}",
                request.steps.len(),
                self.context.config.max_push_steps
            )));
        }

        let mut store = self.context.store.write();
        let session = self.authorize(&mut store, &request.credentials, public)?;
        let record = store
            .documents
            .get_mut(&document_id)
            .ok_or_else(|| ServerError::NotFound(format!("document {}", document_id)))?;

        if session.read_only {
            return Err(ServerError::ReadOnly(ConflictPayload::version_race(
                record.document.clone(),
            )));
        }
        if request.version != record.document.current_version {
            tracing::debug!(
                expected = record.document.current_version,
                actual = request.version,
                "push behind server"
            );
            return Err(ServerError::Conflict(ConflictPayload::version_race(
                record.document.clone(),
            )));
        }
        if request.steps.is_empty() {
            return Ok(PushResponse::default());
        }

        let version = record.document.current_version + request.steps.len() as u64;
        record
            .steps
            .push(StepEntry::new(session.session.id, version, request.steps));
        record.document.current_version = version;
        tracing::debug!(document = document_id, version, "steps accepted");
        Ok(PushResponse::default())
    }

    /// Handles `session`, renaming a guest.
    pub fn handle_update_session(
        &self,
        request: UpdateSessionRequest,
        public: bool,
    ) -> ServerResult<Session> {
        self.context
            .injected(Endpoint::UpdateSession, Some(request.credentials.document_id))?;
        let mut store = self.context.store.write();
        let session = self.authorize(&mut store, &request.credentials, public)?;
        if session.share_token.is_none() {
            return Err(ServerError::NotAuthorized(
                "only guests can change their name".into(),
            ));
        }
        let record = store
            .sessions
            .get_mut(&session.session.id)
            .ok_or_else(|| ServerError::Internal("session vanished".into()))?;
        record.session.guest_name = Some(request.guest_name);
        Ok(record.session.clone())
    }

    /// Handles `session/close`.
    pub fn handle_close(&self, request: CloseSessionRequest, public: bool) -> ServerResult<()> {
        self.context
            .injected(Endpoint::Close, Some(request.document_id))?;
        let mut store = self.context.store.write();
        self.authorize(&mut store, &request, public)?;
        store.sessions.remove(&request.session_id);
        tracing::info!(session = request.session_id, "session closed");
        Ok(())
    }
}

pub(crate) fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
