//! Adaptive polling and retry engine.
//!
//! `PollingTransport` drives the fetch/push exchanges of one sync service.
//! A single recurring timer spawns fetch cycles. Pushes are started by the
//! editor and share the same single-flight lock, so at most one request is
//! outstanding per service at any time.
//!
//! Two independent retry ladders run side by side:
//! - the fetch interval, which adapts to collaborator presence and widens on
//!   service errors
//! - the careful retry delay, which only grows on failed pushes
//!
//! A failing push never stops the timer and a failing fetch never blocks a
//! later push.

use crate::config::{PollingConfig, RetryConfig};
use crate::error::SyncError;
use crate::event::{ErrorData, ErrorType, StateChange, SyncEvent};
use crate::service::{ServiceCore, SyncService};
use crate::surface::{EditingSurface, Sendable};
use crate::transport::SyncTransport;
use parking_lot::Mutex;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use textsync_protocol::{active_collaborators, SyncResponse};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Notice shown when local changes keep failing to reach the server.
pub const PUSH_RETRY_NOTICE: &str = "Changes could not be sent yet";

const UNLOCKED: u64 = 0;

/// Observable state of the polling transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollingState {
    /// No timer is running.
    Idle,
    /// The timer is running and no request is in flight.
    Polling,
    /// A fetch or push is in flight.
    InFlight,
}

impl PollingState {
    /// Returns true if the timer is running.
    pub fn is_active(&self) -> bool {
        !matches!(self, PollingState::Idle)
    }
}

#[derive(Debug)]
struct Schedule {
    fetch_interval: Duration,
    retry_time: Duration,
    fetch_retry_counter: u32,
    manual_save: bool,
    forced_save: bool,
    /// A push is waiting for the lock to be released.
    push_deferred: bool,
    /// A careful retry re-push is scheduled.
    retry_pending: bool,
    fetcher: Option<JoinHandle<()>>,
}

/// Where a push attempt comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PushOrigin {
    Editor,
    Deferred,
    Retry,
}

/// Periodic fetch/push driver for a [`SyncService`].
///
/// # Invariants
///
/// - At most one fetch or push request is in flight
/// - Changing the interval cancels the timer and starts a new one
/// - A response that arrives after `disconnect()` is ignored and never
///   re-arms the timer
pub struct PollingTransport<T: SyncTransport, S: EditingSurface> {
    core: Weak<ServiceCore<T, S>>,
    polling: PollingConfig,
    retry: RetryConfig,
    connected: AtomicBool,
    /// Bumped on every connect and disconnect.
    generation: AtomicU64,
    /// Generation of the request holding the lock, or `UNLOCKED`.
    lock: AtomicU64,
    schedule: Mutex<Schedule>,
}

impl<T: SyncTransport, S: EditingSurface> PollingTransport<T, S> {
    pub(crate) fn new(
        core: Weak<ServiceCore<T, S>>,
        polling: PollingConfig,
        retry: RetryConfig,
    ) -> Self {
        Self {
            core,
            schedule: Mutex::new(Schedule {
                fetch_interval: polling.fetch_interval,
                retry_time: retry.min_delay,
                fetch_retry_counter: 0,
                manual_save: false,
                forced_save: false,
                push_deferred: false,
                retry_pending: false,
                fetcher: None,
            }),
            polling,
            retry,
            connected: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            lock: AtomicU64::new(UNLOCKED),
        }
    }

    /// Starts the timer. The first fetch runs immediately.
    pub fn connect(&self) {
        if self.connected.swap(true, Ordering::SeqCst) {
            return;
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mut schedule = self.schedule.lock();
        schedule.push_deferred = false;
        schedule.retry_pending = false;
        let period = schedule.fetch_interval;
        self.arm(&mut schedule, period, Duration::ZERO);
        tracing::debug!(?period, "polling connected");
    }

    /// Stops the timer. In-flight responses are discarded.
    pub fn disconnect(&self) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.lock.store(UNLOCKED, Ordering::SeqCst);
        if let Some(fetcher) = self.schedule.lock().fetcher.take() {
            fetcher.abort();
        }
        tracing::debug!("polling disconnected");
    }

    /// Requests a manual save with the next fetch, which starts now.
    pub fn save(&self) {
        self.schedule.lock().manual_save = true;
        self.fetch_now();
    }

    /// Requests a forced save with the next fetch, which starts now.
    pub fn force_save(&self) {
        self.schedule.lock().forced_save = true;
        self.fetch_now();
    }

    /// Returns true while the timer is running.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Returns true while a request is in flight.
    pub fn is_locked(&self) -> bool {
        self.lock.load(Ordering::SeqCst) != UNLOCKED
    }

    /// Returns the current state.
    pub fn state(&self) -> PollingState {
        if !self.is_connected() {
            PollingState::Idle
        } else if self.is_locked() {
            PollingState::InFlight
        } else {
            PollingState::Polling
        }
    }

    /// Returns the current fetch interval.
    pub fn fetch_interval(&self) -> Duration {
        self.schedule.lock().fetch_interval
    }

    /// Returns the delay before the next push retry.
    pub fn careful_retry_delay(&self) -> Duration {
        self.schedule.lock().retry_time
    }

    /// Returns the number of consecutive network failures while fetching.
    pub fn fetch_retry_count(&self) -> u32 {
        self.schedule.lock().fetch_retry_counter
    }

    /// Resets the fetch interval to the fast interval.
    pub fn reset_refetch_timer(&self) {
        let fast = self.polling.fetch_interval;
        self.rearm(|_| fast);
    }

    /// Doubles the fetch interval up to the maximum.
    pub fn increase_refetch_timer(&self) {
        let max = self.polling.fetch_interval_max;
        self.rearm(|current| current.saturating_mul(2).min(max));
    }

    /// Sets the fetch interval to the single-editor interval.
    pub fn maximum_refetch_timer(&self) {
        let single = self.polling.fetch_interval_single_editor;
        self.rearm(|_| single);
    }

    fn rearm(&self, next: impl FnOnce(Duration) -> Duration) {
        let mut schedule = self.schedule.lock();
        if !self.is_connected() {
            return;
        }
        schedule.fetch_interval = next(schedule.fetch_interval);
        let period = schedule.fetch_interval;
        self.arm(&mut schedule, period, period);
        tracing::trace!(?period, "refetch timer armed");
    }

    fn arm(&self, schedule: &mut Schedule, period: Duration, first: Duration) {
        let core = self.core.clone();
        let start = Instant::now() + first;
        let fetcher = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match core.upgrade() {
                    Some(core) => Self::spawn_fetch(core),
                    None => break,
                }
            }
        });
        if let Some(old) = schedule.fetcher.replace(fetcher) {
            old.abort();
        }
    }

    fn fetch_now(&self) {
        if let Some(core) = self.core.upgrade() {
            Self::spawn_fetch(core);
        }
    }

    fn spawn_fetch(core: Arc<ServiceCore<T, S>>) {
        tokio::spawn(async move {
            core.backend.fetch_steps().await;
        });
    }

    fn try_lock(&self, generation: u64) -> bool {
        self.lock
            .compare_exchange(UNLOCKED, generation, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn unlock(&self, generation: u64) {
        let _ = self
            .lock
            .compare_exchange(generation, UNLOCKED, Ordering::SeqCst, Ordering::SeqCst);
    }

    fn is_stale(&self, generation: u64) -> bool {
        !self.is_connected() || self.generation.load(Ordering::SeqCst) != generation
    }

    /// Runs one fetch cycle.
    ///
    /// A no-op while disconnected or while another request is in flight.
    pub async fn fetch_steps(&self) {
        let Some(core) = self.core.upgrade() else {
            return;
        };
        if !self.is_connected() {
            return;
        }
        let generation = self.generation.load(Ordering::SeqCst);
        if !self.try_lock(generation) {
            tracing::trace!("fetch skipped, request in flight");
            return;
        }

        // Save requests are consumed by exactly one cycle.
        let (manual_save, forced_save) = {
            let mut schedule = self.schedule.lock();
            (
                mem::take(&mut schedule.manual_save),
                mem::take(&mut schedule.forced_save),
            )
        };
        let Some(request) = core.sync_request(manual_save, forced_save) else {
            self.unlock(generation);
            return;
        };
        tracing::trace!(
            version = request.version,
            autosave = request.autosave_content.is_some(),
            "fetching steps"
        );

        let result = core.transport.sync(&request).await;
        if self.is_stale(generation) {
            tracing::debug!("dropping fetch response after disconnect");
            return;
        }

        match result {
            Ok(response) => self.handle_sync(&core, generation, response),
            Err(err) => {
                self.unlock(generation);
                self.handle_fetch_error(&core, err);
            }
        }
    }

    fn handle_sync(&self, core: &Arc<ServiceCore<T, S>>, generation: u64, response: SyncResponse) {
        self.schedule.lock().fetch_retry_counter = 0;

        let Some(held) = core.document() else {
            self.unlock(generation);
            return;
        };

        if held.saved_since(&response.document) {
            tracing::debug!(
                version = response.document.last_saved_version,
                "document saved"
            );
            core.emit(SyncEvent::Save {
                document: response.document.clone(),
                sessions: response.sessions.clone(),
            });
            core.saved.notify_waiters();
        }

        core.emit(SyncEvent::Change {
            document: response.document.clone(),
            sessions: response.sessions.clone(),
        });

        if held.has_outside_change(&response.document) {
            tracing::warn!(
                held = %held.base_version_etag,
                server = %response.document.base_version_etag,
                "document changed outside the session"
            );
            self.unlock(generation);
            SyncService::spawn_rebuild(core);
            return;
        }

        let active = active_collaborators(
            &response.sessions,
            now_unix(),
            self.polling.collaborator_disconnect_time.as_secs() as i64,
        );
        let SyncResponse {
            document,
            sessions,
            steps,
        } = response;
        core.replace_document(document.clone(), sessions);

        if steps.is_empty() {
            self.unlock(generation);
            if active < 2 {
                self.maximum_refetch_timer();
            } else {
                self.increase_refetch_timer();
            }
            core.emit(SyncEvent::StateChange(StateChange::Dirty(
                core.has_unpushed_steps(),
            )));
            core.emit(SyncEvent::StateChange(StateChange::InitialLoading(true)));
            return;
        }

        core.receive_steps(&steps, &document);
        self.unlock(generation);
        self.reset_refetch_timer();
    }

    fn handle_fetch_error(&self, core: &ServiceCore<T, S>, err: SyncError) {
        if err.is_network() {
            let attempts = {
                let mut schedule = self.schedule.lock();
                let prior = schedule.fetch_retry_counter;
                schedule.fetch_retry_counter += 1;
                prior
            };
            if attempts >= self.polling.max_fetch_retries {
                tracing::error!(%err, "network error when fetching steps, giving up");
                core.emit(SyncEvent::error(
                    ErrorType::ConnectionFailed,
                    ErrorData::default(),
                ));
            } else {
                tracing::warn!(%err, retry = attempts + 1, "network error when fetching steps");
            }
            return;
        }

        let conflict = err.conflict();
        let collided = match (&conflict, core.document()) {
            (Some(conflict), Some(held)) => conflict.at_version(held.current_version),
            _ => false,
        };

        match err.status() {
            Some(409) if collided => {
                tracing::error!("conflict during file save, please resolve");
                core.mark_conflicted();
                core.emit(SyncEvent::error(
                    ErrorType::SaveCollision,
                    ErrorData {
                        outside_change: conflict.and_then(|c| c.outside_change),
                        ..ErrorData::default()
                    },
                ));
            }
            Some(403) => {
                core.emit(SyncEvent::error(
                    ErrorType::ConnectionFailed,
                    ErrorData::default(),
                ));
            }
            Some(404) => {
                core.emit(SyncEvent::error(
                    ErrorType::SourceNotFound,
                    ErrorData::default(),
                ));
            }
            Some(503) => {
                tracing::error!(%err, "failed to fetch steps, service unavailable");
                self.increase_refetch_timer();
                core.emit(SyncEvent::error(
                    ErrorType::ConnectionFailed,
                    ErrorData::retry(true),
                ));
            }
            _ => {
                tracing::error!(%err, "failed to fetch steps");
                self.increase_refetch_timer();
                core.emit(SyncEvent::error(
                    ErrorType::ConnectionFailed,
                    ErrorData::retry(false),
                ));
            }
        }
    }

    /// Pushes local steps.
    ///
    /// If a request is in flight the push is retried after a short delay
    /// with whatever the surface has to send by then. While a careful retry
    /// is pending the edits ride along with it instead.
    pub async fn send_steps(&self, sendable: Sendable) {
        self.push(sendable, PushOrigin::Editor).await;
    }

    async fn push(&self, sendable: Sendable, origin: PushOrigin) {
        let Some(core) = self.core.upgrade() else {
            return;
        };
        // Re-pushes only report dirty when the surface still has steps.
        if origin == PushOrigin::Editor || core.has_unpushed_steps() {
            core.emit(SyncEvent::StateChange(StateChange::Dirty(true)));
        }

        if !self.is_connected() {
            tracing::debug!("push skipped, not connected");
            return;
        }
        if origin != PushOrigin::Retry && self.schedule.lock().retry_pending {
            tracing::trace!("push joins pending retry");
            return;
        }
        let generation = self.generation.load(Ordering::SeqCst);
        if !self.try_lock(generation) {
            self.defer_push(core, generation);
            return;
        }

        let request = sendable
            .resolve(core.surface.as_ref())
            .and_then(|steps| core.push_request(steps));
        let Some(request) = request else {
            self.unlock(generation);
            if origin == PushOrigin::Retry {
                self.careful_retry_reset();
            }
            return;
        };
        tracing::debug!(
            version = request.version,
            steps = request.steps.len(),
            ?origin,
            "pushing steps"
        );

        let result = core.transport.push(&request).await;
        if self.is_stale(generation) {
            tracing::debug!("dropping push response after disconnect");
            return;
        }
        self.unlock(generation);

        match result {
            Ok(_) => {
                self.careful_retry_reset();
                self.fetch_steps().await;
            }
            Err(err) => self.handle_push_error(&core, generation, err),
        }
    }

    fn handle_push_error(&self, core: &Arc<ServiceCore<T, S>>, generation: u64, err: SyncError) {
        tracing::warn!(%err, "failed to push steps");
        if err.is_network() {
            core.emit(SyncEvent::error(
                ErrorType::ConnectionFailed,
                ErrorData::default(),
            ));
            return;
        }

        let collided = match (err.conflict(), core.document()) {
            (Some(conflict), Some(held)) => conflict.at_version(held.current_version),
            _ => false,
        };
        if err.status() == Some(403) && collided {
            core.emit(SyncEvent::error(
                ErrorType::PushFailure,
                ErrorData::default(),
            ));
            core.notify(PUSH_RETRY_NOTICE);
        }

        Self::spawn_fetch(Arc::clone(core));
        self.schedule_retry(core, generation);
    }

    /// Retries a push once the lock is free. At most one deferred push
    /// waits at a time.
    fn defer_push(&self, core: Arc<ServiceCore<T, S>>, generation: u64) {
        let deferred = mem::replace(&mut self.schedule.lock().push_deferred, true);
        if deferred {
            tracing::trace!("push already deferred");
            return;
        }
        tracing::trace!("push deferred, request in flight");
        let delay = self.polling.push_defer_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let backend = &core.backend;
            if backend.generation.load(Ordering::SeqCst) != generation {
                tracing::debug!("dropping deferred push after disconnect");
                return;
            }
            backend.schedule.lock().push_deferred = false;
            backend.push(Sendable::Surface, PushOrigin::Deferred).await;
        });
    }

    /// Schedules the next re-push on the careful retry ladder. At most one
    /// re-push is pending at a time.
    fn schedule_retry(&self, core: &Arc<ServiceCore<T, S>>, generation: u64) {
        let pending = mem::replace(&mut self.schedule.lock().retry_pending, true);
        if pending {
            tracing::trace!("careful retry already pending");
            return;
        }
        let delay = self.careful_retry(core);
        let core = Arc::clone(core);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let backend = &core.backend;
            if backend.generation.load(Ordering::SeqCst) != generation {
                tracing::debug!("dropping careful retry after disconnect");
                return;
            }
            backend.schedule.lock().retry_pending = false;
            backend.push(Sendable::Surface, PushOrigin::Retry).await;
        });
    }

    /// Escalates the careful retry ladder and returns the delay to wait now.
    fn careful_retry(&self, core: &ServiceCore<T, S>) -> Duration {
        let (delay, warn) = {
            let mut schedule = self.schedule.lock();
            let delay = schedule.retry_time;
            let next = self.retry.next_delay(delay);
            schedule.retry_time = next;
            (delay, self.retry.crosses_warning(delay, next))
        };
        if warn {
            core.notify(PUSH_RETRY_NOTICE);
            core.emit(SyncEvent::error(
                ErrorType::PushFailure,
                ErrorData::default(),
            ));
        }
        tracing::debug!(?delay, "retrying push");
        delay
    }

    fn careful_retry_reset(&self) {
        self.schedule.lock().retry_time = self.retry.min_delay;
    }
}

impl<T: SyncTransport, S: EditingSurface> std::fmt::Debug for PollingTransport<T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let schedule = self.schedule.lock();
        f.debug_struct("PollingTransport")
            .field("state", &self.state())
            .field("fetch_interval", &schedule.fetch_interval)
            .field("retry_time", &schedule.retry_time)
            .finish()
    }
}

pub(crate) fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SessionOptions, SyncConfig};
    use crate::service::OpenTarget;
    use crate::surface::MemorySurface;
    use crate::transport::MockTransport;
    use proptest::prelude::*;
    use crate::event::EventKind;
    use textsync_protocol::{
        CollaboratorSession, CreateSessionResponse, Document, Endpoint, ReceivedStep, Session,
    };

    fn service() -> SyncService<Arc<MockTransport>, MemorySurface> {
        service_on(Arc::new(MockTransport::new()))
    }

    fn service_on(transport: Arc<MockTransport>) -> SyncService<Arc<MockTransport>, MemorySurface> {
        SyncService::new(
            SyncConfig::default(),
            SessionOptions::default(),
            transport,
            Arc::new(MemorySurface::new()),
        )
        .unwrap()
    }

    /// Opens a synced service whose fetches succeed with no steps.
    async fn syncing(
        transport: &Arc<MockTransport>,
    ) -> SyncService<Arc<MockTransport>, MemorySurface> {
        transport.set_sync_fallback(Ok(SyncResponse {
            document: Document::new(1, "etag"),
            sessions: vec![],
            steps: vec![],
        }));
        let service = service_on(Arc::clone(transport));
        service.open(OpenTarget::Existing(opened())).await.unwrap();
        service.start_sync().unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        service
    }

    fn opened() -> CreateSessionResponse {
        CreateSessionResponse {
            document: Document::new(1, "etag"),
            session: Session {
                id: 9,
                token: "t".into(),
                guest_name: None,
            },
            read_only: false,
        }
    }

    fn collaborators(n: usize) -> Vec<CollaboratorSession> {
        (0..n)
            .map(|i| CollaboratorSession {
                id: i as i64,
                user_id: None,
                guest_name: None,
                display_name: None,
                last_contact: now_unix(),
            })
            .collect()
    }

    #[tokio::test]
    async fn idle_until_connected() {
        let service = service();
        let polling = service.polling();
        assert_eq!(polling.state(), PollingState::Idle);
        assert!(!polling.state().is_active());
        assert_eq!(polling.fetch_interval(), Duration::from_millis(300));
        assert_eq!(polling.careful_retry_delay(), Duration::from_millis(500));

        // Interval changes are ignored while idle.
        polling.increase_refetch_timer();
        assert_eq!(polling.fetch_interval(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn interval_policy() {
        let service = service();
        service.open(OpenTarget::Existing(opened())).await.unwrap();
        let polling = service.polling();
        polling.connect();
        assert_eq!(polling.state(), PollingState::Polling);

        polling.increase_refetch_timer();
        assert_eq!(polling.fetch_interval(), Duration::from_millis(600));
        polling.maximum_refetch_timer();
        assert_eq!(polling.fetch_interval(), Duration::from_millis(5000));
        polling.increase_refetch_timer();
        assert_eq!(polling.fetch_interval(), Duration::from_millis(5000));
        polling.reset_refetch_timer();
        assert_eq!(polling.fetch_interval(), Duration::from_millis(300));

        polling.disconnect();
        assert_eq!(polling.state(), PollingState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_pushes_share_one_retry_ladder() {
        let transport = Arc::new(MockTransport::new());
        transport.set_push_fallback(Err(SyncError::http(500, None)));
        let service = syncing(&transport).await;

        for text in ["a", "b", "c", "d", "e"] {
            service.surface().insert(text);
            service.send_steps(Sendable::Surface).await;
        }
        assert_eq!(transport.call_count(Endpoint::Push), 1);

        // Retries at +0.5, 1.5, 3.5, 7.5, 15.5, 25.5, 35.5, 45.5 and 55.5 s.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.call_count(Endpoint::Push), 10);
        let pushes = transport.push_requests();
        assert_eq!(pushes[0].steps.len(), 1);
        assert_eq!(pushes[9].steps.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_chain_ends_on_success() {
        let transport = Arc::new(MockTransport::new());
        transport.push_push(Err(SyncError::http(500, None)));
        let service = syncing(&transport).await;

        service.surface().insert("a");
        service.send_steps(Sendable::Surface).await;
        service.surface().insert("b");
        service.send_steps(Sendable::Surface).await;

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(transport.call_count(Endpoint::Push), 2);
        assert_eq!(transport.push_requests()[1].steps.len(), 2);
        assert_eq!(service.polling().careful_retry_delay(), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_retry_leaves_document_clean() {
        let transport = Arc::new(MockTransport::new());
        transport.push_push(Err(SyncError::http(500, None)));
        let service = syncing(&transport).await;

        service.surface().insert("a");
        service.send_steps(Sendable::Surface).await;

        // The step reaches the server another way before the retry fires.
        service.surface().apply_remote_steps(
            1,
            &[ReceivedStep {
                step: MemorySurface::insert_step("a"),
                client_id: 9,
            }],
        );
        let dirty = Arc::new(parking_lot::Mutex::new(0));
        let sink = Arc::clone(&dirty);
        service.on(EventKind::StateChange, move |event| {
            if *event == SyncEvent::StateChange(StateChange::Dirty(true)) {
                *sink.lock() += 1;
            }
        });

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(*dirty.lock(), 0);
        assert_eq!(transport.call_count(Endpoint::Push), 1);
        assert_eq!(service.polling().careful_retry_delay(), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn deferred_pushes_coalesce() {
        let transport = Arc::new(MockTransport::new());
        transport.set_delay(Endpoint::Sync, Duration::from_millis(1000));
        let service = syncing(&transport).await;
        assert!(service.polling().is_locked());

        for text in ["a", "b", "c"] {
            service.surface().insert(text);
            service.send_steps(Sendable::Surface).await;
        }
        tokio::time::sleep(Duration::from_millis(1100)).await;
        let pushes = transport.push_requests();
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0].steps.len(), 3);
    }

    #[test]
    fn active_collaborator_window() {
        let now = now_unix();
        let mut sessions = collaborators(3);
        sessions[0].last_contact = now - 60;
        assert_eq!(active_collaborators(&sessions, now, 20), 2);
    }

    proptest! {
        #[test]
        fn backoff_never_decreases(steps in 1usize..20) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();
            runtime.block_on(async {
                let service = service();
                service.open(OpenTarget::Existing(opened())).await.unwrap();
                let polling = service.polling();
                polling.connect();
                let mut previous = polling.fetch_interval();
                for _ in 0..steps {
                    polling.increase_refetch_timer();
                    let current = polling.fetch_interval();
                    assert!(current >= previous);
                    assert!(current <= Duration::from_millis(5000));
                    previous = current;
                }
                polling.disconnect();
            });
        }
    }
}
