//! Transport layer abstraction for the session endpoints.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use textsync_protocol::{
    CloseSessionRequest, CreateSessionRequest, CreateSessionResponse, Endpoint,
    FetchDocumentRequest, PushRequest, PushResponse, Session, SyncRequest, SyncResponse,
    UpdateSessionRequest,
};

/// A sync transport handles network communication with the text server.
///
/// Requests that carry a share token go to the public endpoints. This trait
/// abstracts the network layer, allowing for different implementations
/// (HTTP, in-process loopback, mock for testing).
#[async_trait]
pub trait SyncTransport: Send + Sync + 'static {
    /// Creates or resumes a session.
    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> SyncResult<CreateSessionResponse>;

    /// Fetches the raw document source.
    async fn fetch_document(&self, request: &FetchDocumentRequest) -> SyncResult<String>;

    /// Sends the client version (and optional autosave content), receiving new steps.
    async fn sync(&self, request: &SyncRequest) -> SyncResult<SyncResponse>;

    /// Pushes local steps.
    async fn push(&self, request: &PushRequest) -> SyncResult<PushResponse>;

    /// Updates the guest name of a public session.
    async fn update_session(&self, request: &UpdateSessionRequest) -> SyncResult<Session>;

    /// Closes the session.
    async fn close_session(&self, request: &CloseSessionRequest) -> SyncResult<()>;
}

#[async_trait]
impl<T: SyncTransport + ?Sized> SyncTransport for Arc<T> {
    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> SyncResult<CreateSessionResponse> {
        (**self).create_session(request).await
    }

    async fn fetch_document(&self, request: &FetchDocumentRequest) -> SyncResult<String> {
        (**self).fetch_document(request).await
    }

    async fn sync(&self, request: &SyncRequest) -> SyncResult<SyncResponse> {
        (**self).sync(request).await
    }

    async fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        (**self).push(request).await
    }

    async fn update_session(&self, request: &UpdateSessionRequest) -> SyncResult<Session> {
        (**self).update_session(request).await
    }

    async fn close_session(&self, request: &CloseSessionRequest) -> SyncResult<()> {
        (**self).close_session(request).await
    }
}

/// A request recorded by [`MockTransport`].
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    /// `session/create`
    Create(CreateSessionRequest),
    /// `session/fetch`
    Fetch(FetchDocumentRequest),
    /// `session/sync`
    Sync(SyncRequest),
    /// `session/push`
    Push(PushRequest),
    /// `session`
    UpdateSession(UpdateSessionRequest),
    /// `session/close`
    Close(CloseSessionRequest),
}

impl MockCall {
    /// Returns the endpoint that was called.
    pub fn endpoint(&self) -> Endpoint {
        match self {
            MockCall::Create(_) => Endpoint::Create,
            MockCall::Fetch(_) => Endpoint::Fetch,
            MockCall::Sync(_) => Endpoint::Sync,
            MockCall::Push(_) => Endpoint::Push,
            MockCall::UpdateSession(_) => Endpoint::UpdateSession,
            MockCall::Close(_) => Endpoint::Close,
        }
    }
}

#[derive(Debug)]
struct Script<T> {
    queue: VecDeque<SyncResult<T>>,
    fallback: Option<SyncResult<T>>,
}

impl<T: Clone> Script<T> {
    fn new(fallback: Option<SyncResult<T>>) -> Self {
        Self {
            queue: VecDeque::new(),
            fallback,
        }
    }

    fn next(&mut self, endpoint: Endpoint) -> SyncResult<T> {
        self.queue
            .pop_front()
            .or_else(|| self.fallback.clone())
            .unwrap_or_else(|| {
                Err(SyncError::Protocol(format!(
                    "no mock response for {}",
                    endpoint
                )))
            })
    }
}

/// A scripted transport for testing.
///
/// Each endpoint answers from a queue of scripted results, then from its
/// fallback. Every request is recorded.
#[derive(Debug)]
pub struct MockTransport {
    create: Mutex<Script<CreateSessionResponse>>,
    fetch: Mutex<Script<String>>,
    sync: Mutex<Script<SyncResponse>>,
    push: Mutex<Script<PushResponse>>,
    update: Mutex<Script<Session>>,
    close: Mutex<Script<()>>,
    delays: Mutex<Vec<(Endpoint, Duration)>>,
    calls: Mutex<Vec<MockCall>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Creates a mock whose push and close endpoints succeed by default.
    pub fn new() -> Self {
        Self {
            create: Mutex::new(Script::new(None)),
            fetch: Mutex::new(Script::new(Some(Ok(String::new())))),
            sync: Mutex::new(Script::new(None)),
            push: Mutex::new(Script::new(Some(Ok(PushResponse::default())))),
            update: Mutex::new(Script::new(None)),
            close: Mutex::new(Script::new(Some(Ok(())))),
            delays: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queues a `session/create` result.
    pub fn push_create(&self, result: SyncResult<CreateSessionResponse>) {
        self.create.lock().queue.push_back(result);
    }

    /// Sets the `session/fetch` fallback.
    pub fn set_document_source(&self, source: impl Into<String>) {
        self.fetch.lock().fallback = Some(Ok(source.into()));
    }

    /// Queues a `session/sync` result.
    pub fn push_sync(&self, result: SyncResult<SyncResponse>) {
        self.sync.lock().queue.push_back(result);
    }

    /// Sets the `session/sync` fallback.
    pub fn set_sync_fallback(&self, result: SyncResult<SyncResponse>) {
        self.sync.lock().fallback = Some(result);
    }

    /// Queues a `session/push` result.
    pub fn push_push(&self, result: SyncResult<PushResponse>) {
        self.push.lock().queue.push_back(result);
    }

    /// Sets the `session/push` fallback.
    pub fn set_push_fallback(&self, result: SyncResult<PushResponse>) {
        self.push.lock().fallback = Some(result);
    }

    /// Queues a `session` result.
    pub fn push_update(&self, result: SyncResult<Session>) {
        self.update.lock().queue.push_back(result);
    }

    /// Sets the `session/close` fallback.
    pub fn set_close_fallback(&self, result: SyncResult<()>) {
        self.close.lock().fallback = Some(result);
    }

    /// Delays every response of `endpoint` by `delay`.
    pub fn set_delay(&self, endpoint: Endpoint, delay: Duration) {
        let mut delays = self.delays.lock();
        delays.retain(|(e, _)| *e != endpoint);
        delays.push((endpoint, delay));
    }

    /// Returns every recorded request.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// Returns the number of requests made to `endpoint`.
    pub fn call_count(&self, endpoint: Endpoint) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.endpoint() == endpoint)
            .count()
    }

    /// Returns the recorded sync requests.
    pub fn sync_requests(&self) -> Vec<SyncRequest> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                MockCall::Sync(r) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    /// Returns the recorded push requests.
    pub fn push_requests(&self) -> Vec<PushRequest> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                MockCall::Push(r) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    async fn record(&self, call: MockCall) {
        let endpoint = call.endpoint();
        self.calls.lock().push(call);
        let delay = self
            .delays
            .lock()
            .iter()
            .find(|(e, _)| *e == endpoint)
            .map(|(_, d)| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl SyncTransport for MockTransport {
    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> SyncResult<CreateSessionResponse> {
        self.record(MockCall::Create(request.clone())).await;
        self.create.lock().next(Endpoint::Create)
    }

    async fn fetch_document(&self, request: &FetchDocumentRequest) -> SyncResult<String> {
        self.record(MockCall::Fetch(request.clone())).await;
        self.fetch.lock().next(Endpoint::Fetch)
    }

    async fn sync(&self, request: &SyncRequest) -> SyncResult<SyncResponse> {
        self.record(MockCall::Sync(request.clone())).await;
        self.sync.lock().next(Endpoint::Sync)
    }

    async fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        self.record(MockCall::Push(request.clone())).await;
        self.push.lock().next(Endpoint::Push)
    }

    async fn update_session(&self, request: &UpdateSessionRequest) -> SyncResult<Session> {
        self.record(MockCall::UpdateSession(request.clone())).await;
        self.update.lock().next(Endpoint::UpdateSession)
    }

    async fn close_session(&self, request: &CloseSessionRequest) -> SyncResult<()> {
        self.record(MockCall::Close(request.clone())).await;
        self.close.lock().next(Endpoint::Close)
    }
}
