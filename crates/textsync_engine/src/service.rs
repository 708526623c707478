//! The sync service: session lifecycle, authoritative state and events.

use crate::config::{SessionOptions, SyncConfig};
use crate::error::{SyncError, SyncResult};
use crate::event::{ErrorData, ErrorType, EventBus, EventKind, SyncEvent};
use crate::polling::PollingTransport;
use crate::surface::{EditingSurface, LogNotifier, Notifier, Sendable};
use crate::transport::SyncTransport;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use textsync_protocol::{
    CollaboratorSession, CreateSessionRequest, CreateSessionResponse, Document, PushRequest,
    ReceivedStep, SendableSteps, Session, SessionCredentials, StepEntry, StepLog, StepsSince,
    SyncRequest, UpdateSessionRequest,
};
use tokio::sync::Notify;

/// What to open a session on.
#[derive(Debug, Clone, PartialEq)]
pub enum OpenTarget {
    /// A file by ID.
    FileId(i64),
    /// A file by path (relative to the share for public sessions).
    FilePath(String),
    /// A session the caller already created.
    Existing(CreateSessionResponse),
}

/// Persistence status of the local document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
    /// Everything is pushed and saved.
    Clean,
    /// Local steps have not been pushed.
    Dirty,
    /// Pushed, but the server has not saved this version.
    Unsaved,
}

#[derive(Debug, Default)]
pub(crate) struct ServiceState {
    document: Option<Document>,
    session: Option<Session>,
    sessions: Vec<CollaboratorSession>,
    steps: StepLog,
    read_only: bool,
    conflicted: bool,
}

/// State shared between the service handle and its polling transport.
pub(crate) struct ServiceCore<T: SyncTransport, S: EditingSurface> {
    config: SyncConfig,
    options: RwLock<SessionOptions>,
    pub(crate) transport: T,
    pub(crate) surface: Arc<S>,
    events: EventBus,
    notifier: RwLock<Arc<dyn Notifier>>,
    state: RwLock<ServiceState>,
    pub(crate) backend: PollingTransport<T, S>,
    /// Woken when the server reports a newer saved version.
    pub(crate) saved: Notify,
    rebuilding: AtomicBool,
    target: Mutex<Option<OpenTarget>>,
}

impl<T: SyncTransport, S: EditingSurface> ServiceCore<T, S> {
    pub(crate) fn emit(&self, event: SyncEvent) {
        self.events.emit(event);
    }

    pub(crate) fn notify(&self, message: &str) {
        let notifier = Arc::clone(&*self.notifier.read());
        notifier.notify(message);
    }

    pub(crate) fn document(&self) -> Option<Document> {
        self.state.read().document.clone()
    }

    fn credentials_for(&self, state: &ServiceState) -> Option<SessionCredentials> {
        Some(SessionCredentials::new(
            state.document.as_ref()?,
            state.session.as_ref()?,
            self.options.read().share_token.clone(),
        ))
    }

    fn credentials(&self) -> Option<SessionCredentials> {
        self.credentials_for(&self.state.read())
    }

    pub(crate) fn has_unpushed_steps(&self) -> bool {
        self.surface
            .sendable_steps()
            .map_or(false, |steps| !steps.is_empty())
    }

    pub(crate) fn sync_request(&self, manual_save: bool, force: bool) -> Option<SyncRequest> {
        let (credentials, last_saved_version, conflicted) = {
            let state = self.state.read();
            let document = state.document.as_ref()?;
            (
                self.credentials_for(&state)?,
                document.last_saved_version,
                state.conflicted,
            )
        };

        let version = self.surface.version();
        // A conflicted document only saves on explicit request.
        let autosave =
            force || manual_save || (!conflicted && version != last_saved_version);

        Some(SyncRequest {
            credentials,
            version,
            autosave_content: autosave.then(|| self.surface.serialize()),
            force,
            manual_save,
            file_path: self.options.read().file_path.clone(),
        })
    }

    pub(crate) fn push_request(&self, steps: SendableSteps) -> Option<PushRequest> {
        let credentials = self.credentials()?;
        Some(PushRequest {
            credentials,
            steps: steps.steps,
            version: steps.version,
            file_path: self.options.read().file_path.clone(),
        })
    }

    pub(crate) fn replace_document(&self, document: Document, sessions: Vec<CollaboratorSession>) {
        let mut state = self.state.write();
        state.document = Some(document);
        state.sessions = sessions;
    }

    pub(crate) fn mark_conflicted(&self) {
        self.state.write().conflicted = true;
    }

    /// Appends received steps to the log, hands them to the surface and
    /// emits `sync`.
    pub(crate) fn receive_steps(&self, entries: &[StepEntry], document: &Document) {
        let mut received = Vec::new();
        for entry in entries {
            match entry.steps() {
                Ok(steps) => received.extend(steps.iter().map(|step| ReceivedStep {
                    step: step.clone(),
                    client_id: entry.session_id,
                })),
                Err(err) => tracing::error!(%err, "invalid step data, skipping entry"),
            }
        }

        let version = {
            let mut state = self.state.write();
            state.steps.extend(&received);
            state.steps.version()
        };
        self.surface
            .apply_remote_steps(document.current_version, &received);
        tracing::debug!(steps = received.len(), version, "received steps");

        self.emit(SyncEvent::Sync {
            steps: received,
            document: document.clone(),
        });
    }
}

/// Client-side sync service for one document.
///
/// Owns the document and session state, drives a [`PollingTransport`] and
/// reports everything through typed [`SyncEvent`]s. Cloning yields another
/// handle to the same service.
///
/// # Example
///
/// ```rust,ignore
/// let service = SyncService::new(config, options, transport, surface)?;
/// service.on(EventKind::Error, |event| eprintln!("{:?}", event));
/// service.open(OpenTarget::FileId(42)).await?;
/// service.start_sync()?;
/// ```
pub struct SyncService<T: SyncTransport, S: EditingSurface> {
    core: Arc<ServiceCore<T, S>>,
}

impl<T: SyncTransport, S: EditingSurface> Clone for SyncService<T, S> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T: SyncTransport, S: EditingSurface> SyncService<T, S> {
    /// Creates a service. Nothing is sent until `open()`.
    pub fn new(
        config: SyncConfig,
        options: SessionOptions,
        transport: T,
        surface: Arc<S>,
    ) -> SyncResult<Self> {
        config.validate()?;
        let core = Arc::new_cyclic(|weak| ServiceCore {
            backend: PollingTransport::new(
                weak.clone(),
                config.polling.clone(),
                config.retry.clone(),
            ),
            config,
            options: RwLock::new(options),
            transport,
            surface,
            events: EventBus::new(),
            notifier: RwLock::new(Arc::new(LogNotifier)),
            state: RwLock::new(ServiceState::default()),
            saved: Notify::new(),
            rebuilding: AtomicBool::new(false),
            target: Mutex::new(None),
        });
        Ok(Self { core })
    }

    /// Replaces the notifier used for user-visible notices.
    pub fn with_notifier(self, notifier: impl Notifier) -> Self {
        *self.core.notifier.write() = Arc::new(notifier);
        self
    }

    /// Creates or resumes a session and loads the document.
    ///
    /// Emits `opened` and then `loaded`. Polling does not start until
    /// [`start_sync`](Self::start_sync).
    ///
    /// # Errors
    ///
    /// Emits `CONNECTION_FAILED` when the server is unreachable and
    /// `LOAD_ERROR` with the HTTP status otherwise, then returns the error.
    pub async fn open(&self, target: OpenTarget) -> SyncResult<()> {
        match self.try_open(target).await {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::error!(%err, "failed to open session");
                let error = if err.is_network() {
                    ErrorType::ConnectionFailed
                } else {
                    ErrorType::LoadError
                };
                let data = err.status().map(ErrorData::status).unwrap_or_default();
                self.emit(SyncEvent::error(error, data));
                Err(err)
            }
        }
    }

    async fn try_open(&self, target: OpenTarget) -> SyncResult<()> {
        let core = &self.core;
        let options = core.options.read().clone();

        let reopen = match &target {
            OpenTarget::FileId(id) => OpenTarget::FileId(*id),
            OpenTarget::FilePath(path) => OpenTarget::FilePath(path.clone()),
            OpenTarget::Existing(response) => match options.file_path {
                Some(ref path) if options.is_public() => OpenTarget::FilePath(path.clone()),
                _ => OpenTarget::FileId(response.document.id),
            },
        };

        let response = match target {
            OpenTarget::Existing(response) => response,
            OpenTarget::FileId(id) => {
                let request = create_request(&options, Some(id), None);
                core.transport.create_session(&request).await?
            }
            OpenTarget::FilePath(path) => {
                let request = create_request(&options, None, Some(path));
                core.transport.create_session(&request).await?
            }
        };
        let CreateSessionResponse {
            document,
            session,
            read_only,
        } = response;

        *core.target.lock() = Some(reopen);
        *core.state.write() = ServiceState {
            document: Some(document.clone()),
            session: Some(session.clone()),
            read_only,
            ..ServiceState::default()
        };
        tracing::info!(
            document = document.id,
            session = session.id,
            read_only,
            "session opened"
        );
        self.emit(SyncEvent::Opened {
            document: document.clone(),
            session: session.clone(),
        });

        let credentials = core.credentials().ok_or(SyncError::NoSession)?;
        let document_source = core.transport.fetch_document(&credentials).await?;
        core.surface
            .load(&document_source, document.initial_version, session.id);
        self.emit(SyncEvent::Loaded {
            document,
            session,
            document_source,
        });
        Ok(())
    }

    /// Starts polling.
    pub fn start_sync(&self) -> SyncResult<()> {
        if self.core.state.read().session.is_none() {
            return Err(SyncError::NoSession);
        }
        self.core.backend.connect();
        Ok(())
    }

    /// Pushes local steps.
    ///
    /// Accepts a ready batch, a [`Sendable::provider`] evaluated once the
    /// request can go out, or [`Sendable::Surface`].
    pub async fn send_steps(&self, sendable: impl Into<Sendable>) {
        self.core.backend.send_steps(sendable.into()).await;
    }

    /// Returns the received steps from `version` onward.
    pub fn steps_since(&self, version: u64) -> StepsSince {
        self.core.state.read().steps.since(version)
    }

    /// Asks the server to save with the next fetch.
    pub fn save(&self) {
        self.core.backend.save();
    }

    /// Asks the server to save even if the file changed outside the session.
    pub fn force_save(&self) {
        self.core.backend.force_save();
    }

    /// Closes the session.
    ///
    /// Unsaved changes get one final save. The wait for it is bounded by
    /// the configured close timeout, after which polling stops and the
    /// server is told the session is gone. A failing close request is
    /// ignored.
    pub async fn close(&self) {
        let core = &self.core;
        if self.is_connected() && self.save_status() != SaveStatus::Clean {
            let saved = core.saved.notified();
            tokio::pin!(saved);
            saved.as_mut().enable();
            self.save();
            if tokio::time::timeout(core.config.close_timeout, saved)
                .await
                .is_err()
            {
                tracing::warn!("no save confirmed before closing");
            }
        }
        self.close_session().await;
    }

    async fn close_session(&self) {
        let core = &self.core;
        core.backend.disconnect();
        let credentials = {
            let mut state = core.state.write();
            let credentials = core.credentials_for(&state);
            state.session = None;
            credentials
        };
        if let Some(credentials) = credentials {
            match core.transport.close_session(&credentials).await {
                Ok(()) => tracing::debug!(session = credentials.session_id, "session closed"),
                Err(err) => tracing::debug!(%err, "failed to close session"),
            }
        }
    }

    /// Changes the guest name of a public session.
    ///
    /// Returns `None` for sessions of logged-in users.
    pub async fn update_session(
        &self,
        guest_name: impl Into<String>,
    ) -> SyncResult<Option<Session>> {
        if !self.is_public() {
            return Ok(None);
        }
        let credentials = self.core.credentials().ok_or(SyncError::NoSession)?;
        let request = UpdateSessionRequest {
            credentials,
            guest_name: guest_name.into(),
        };
        let session = self.core.transport.update_session(&request).await?;
        self.core.options.write().guest_name = Some(request.guest_name);
        self.core.state.write().session = Some(session.clone());
        Ok(Some(session))
    }

    /// Keeps the local version after a save collision.
    ///
    /// Clears the conflict and overwrites the stored file.
    pub fn resolve_use_local_version(&self) {
        self.core.state.write().conflicted = false;
        self.force_save();
    }

    /// Discards local changes and reloads the server version.
    pub async fn resolve_use_server_version(&self) -> SyncResult<()> {
        if self.core.rebuilding.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.rebuild().await
    }

    /// Closes the session and opens a new one on the same file.
    pub async fn reconnect(&self) -> SyncResult<()> {
        let target = self
            .core
            .target
            .lock()
            .clone()
            .ok_or(SyncError::NoSession)?;
        self.close().await;
        self.open(target).await?;
        self.start_sync()
    }

    /// Starts a rebuild unless one is already running.
    pub(crate) fn spawn_rebuild(core: &Arc<ServiceCore<T, S>>) {
        if core.rebuilding.swap(true, Ordering::SeqCst) {
            return;
        }
        core.backend.disconnect();
        let service = Self {
            core: Arc::clone(core),
        };
        tokio::spawn(async move {
            if let Err(err) = service.rebuild().await {
                tracing::error!(%err, "failed to rebuild session");
            }
        });
    }

    /// Recreates the session from the stored file, without a final save.
    async fn rebuild(&self) -> SyncResult<()> {
        let core = &self.core;
        tracing::info!("recreating session from server version");
        let target = core.target.lock().clone();
        let result = match target {
            Some(target) => {
                self.close_session().await;
                core.options.write().force_recreate = true;
                let opened = self.open(target).await;
                core.options.write().force_recreate = false;
                opened.and_then(|()| self.start_sync())
            }
            None => Err(SyncError::NoSession),
        };
        core.rebuilding.store(false, Ordering::SeqCst);
        result
    }

    /// Registers an event handler.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> &Self
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        self.core.events.on(kind, handler);
        self
    }

    /// Registers an event handler by name. Unknown names are logged.
    pub fn on_named<F>(&self, name: &str, handler: F) -> &Self
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        self.core.events.on_named(name, handler);
        self
    }

    /// Emits an event to the registered handlers.
    pub fn emit(&self, event: SyncEvent) {
        self.core.emit(event);
    }

    /// Returns true for sessions opened through a share link.
    pub fn is_public(&self) -> bool {
        self.core.options.read().is_public()
    }

    /// Returns true if edits must not be made.
    ///
    /// This covers read-only shares and unresolved save collisions.
    pub fn is_read_only(&self) -> bool {
        let state = self.core.state.read();
        state.read_only
            || state.conflicted
            || state.document.as_ref().map_or(false, |d| d.read_only)
    }

    /// Returns true while a save collision is unresolved.
    pub fn has_conflict(&self) -> bool {
        self.core.state.read().conflicted
    }

    /// Returns the persistence status of the local document.
    pub fn save_status(&self) -> SaveStatus {
        if self.core.has_unpushed_steps() {
            return SaveStatus::Dirty;
        }
        match self.core.document() {
            Some(document) if self.core.surface.version() != document.last_saved_version => {
                SaveStatus::Unsaved
            }
            _ => SaveStatus::Clean,
        }
    }

    /// Returns true while polling.
    pub fn is_connected(&self) -> bool {
        self.core.backend.is_connected()
    }

    /// Returns the current document.
    pub fn document(&self) -> Option<Document> {
        self.core.document()
    }

    /// Returns this client's session.
    pub fn session(&self) -> Option<Session> {
        self.core.state.read().session.clone()
    }

    /// Returns the collaborator sessions from the last sync.
    pub fn sessions(&self) -> Vec<CollaboratorSession> {
        self.core.state.read().sessions.clone()
    }

    /// Returns the session options.
    pub fn options(&self) -> SessionOptions {
        self.core.options.read().clone()
    }

    /// Returns the polling transport.
    pub fn polling(&self) -> &PollingTransport<T, S> {
        &self.core.backend
    }

    /// Returns the editing surface.
    pub fn surface(&self) -> &Arc<S> {
        &self.core.surface
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.core.transport
    }
}

fn create_request(
    options: &SessionOptions,
    file_id: Option<i64>,
    file_path: Option<String>,
) -> CreateSessionRequest {
    CreateSessionRequest {
        file_id,
        file_path,
        token: options.share_token.clone(),
        guest_name: options.guest_name.clone(),
        force_recreate: options.force_recreate,
    }
}
