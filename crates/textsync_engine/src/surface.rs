//! Seams to the editing surface and the user notification area.

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::fmt;
use textsync_protocol::{ReceivedStep, SendableSteps};

/// The editor that produces local steps and merges remote ones.
///
/// The merge algorithm lives entirely behind this trait. The sync engine
/// only forwards steps and reads versions.
pub trait EditingSurface: Send + Sync + 'static {
    /// Loads the fetched document source at `version` for session `client_id`.
    fn load(&self, document_source: &str, version: u64, client_id: i64);

    /// Returns the number of steps the surface has applied.
    fn version(&self) -> u64;

    /// Returns local steps not yet confirmed by the server.
    fn sendable_steps(&self) -> Option<SendableSteps>;

    /// Merges remote steps that bring the document to `version`.
    fn apply_remote_steps(&self, version: u64, steps: &[ReceivedStep]);

    /// Serializes the current document for autosave.
    fn serialize(&self) -> String;
}

/// A batch of steps handed to `send_steps`.
pub enum Sendable {
    /// A batch computed by the caller.
    Ready(SendableSteps),
    /// Computed lazily once the push acquires the lock.
    Provider(Box<dyn FnOnce() -> Option<SendableSteps> + Send>),
    /// Ask the editing surface at push time.
    Surface,
}

impl Sendable {
    /// Creates a lazy batch.
    pub fn provider<F>(f: F) -> Self
    where
        F: FnOnce() -> Option<SendableSteps> + Send + 'static,
    {
        Sendable::Provider(Box::new(f))
    }

    pub(crate) fn resolve<S: EditingSurface + ?Sized>(self, surface: &S) -> Option<SendableSteps> {
        let steps = match self {
            Sendable::Ready(steps) => Some(steps),
            Sendable::Provider(f) => f(),
            Sendable::Surface => surface.sendable_steps(),
        };
        steps.filter(|steps| !steps.is_empty())
    }
}

impl From<SendableSteps> for Sendable {
    fn from(steps: SendableSteps) -> Self {
        Sendable::Ready(steps)
    }
}

impl fmt::Debug for Sendable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sendable::Ready(steps) => f.debug_tuple("Ready").field(steps).finish(),
            Sendable::Provider(_) => f.write_str("Provider"),
            Sendable::Surface => f.write_str("Surface"),
        }
    }
}

/// Delivers user-visible notices.
pub trait Notifier: Send + Sync + 'static {
    /// Shows `message` to the user.
    fn notify(&self, message: &str);
}

/// Writes notices to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        tracing::warn!(target: "textsync::notice", "{}", message);
    }
}

/// A plain-text editing surface.
///
/// Each step appends text: `{"insert": "..."}`. Local steps stay pending
/// until the server echoes them back with this client's session id. Since
/// every step is an append, rebasing pending steps over remote ones is
/// just keeping them at the end.
#[derive(Debug, Default)]
pub struct MemorySurface {
    inner: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    client_id: i64,
    version: u64,
    confirmed: String,
    pending: Vec<Value>,
}

impl MemorySurface {
    /// Creates an empty surface.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an `insert` step.
    pub fn insert_step(text: &str) -> Value {
        json!({ "insert": text })
    }

    /// Appends `text` as a local edit.
    pub fn insert(&self, text: &str) {
        self.inner.lock().pending.push(Self::insert_step(text));
    }

    /// Returns the current text including pending edits.
    pub fn content(&self) -> String {
        let state = self.inner.lock();
        let mut content = state.confirmed.clone();
        for step in &state.pending {
            push_step_text(&mut content, step);
        }
        content
    }

    /// Returns the number of local steps awaiting confirmation.
    pub fn pending(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Returns the session id the surface was loaded for.
    pub fn client_id(&self) -> i64 {
        self.inner.lock().client_id
    }
}

fn push_step_text(content: &mut String, step: &Value) {
    match step.get("insert").and_then(Value::as_str) {
        Some(text) => content.push_str(text),
        None => tracing::warn!(%step, "ignoring unknown step"),
    }
}

impl EditingSurface for MemorySurface {
    fn load(&self, document_source: &str, version: u64, client_id: i64) {
        let mut state = self.inner.lock();
        *state = MemoryState {
            client_id,
            version,
            confirmed: document_source.to_string(),
            pending: Vec::new(),
        };
    }

    fn version(&self) -> u64 {
        self.inner.lock().version
    }

    fn sendable_steps(&self) -> Option<SendableSteps> {
        let state = self.inner.lock();
        if state.pending.is_empty() {
            return None;
        }
        Some(SendableSteps::new(state.version, state.pending.clone()))
    }

    fn apply_remote_steps(&self, version: u64, steps: &[ReceivedStep]) {
        let mut state = self.inner.lock();
        for received in steps {
            if received.client_id == state.client_id && !state.pending.is_empty() {
                let own = state.pending.remove(0);
                push_step_text(&mut state.confirmed, &own);
            } else {
                push_step_text(&mut state.confirmed, &received.step);
            }
            state.version += 1;
        }
        if state.version != version {
            tracing::debug!(local = state.version, remote = version, "surface version differs");
        }
    }

    fn serialize(&self) -> String {
        self.content()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn received(text: &str, client_id: i64) -> ReceivedStep {
        ReceivedStep {
            step: MemorySurface::insert_step(text),
            client_id,
        }
    }

    #[test]
    fn local_edits_are_sendable() {
        let surface = MemorySurface::new();
        surface.load("# notes\n", 0, 7);
        assert!(surface.sendable_steps().is_none());

        surface.insert("hello");
        let sendable = surface.sendable_steps().unwrap();
        assert_eq!(sendable.version, 0);
        assert_eq!(sendable.steps.len(), 1);
        assert_eq!(surface.content(), "# notes\nhello");
    }

    #[test]
    fn own_steps_are_confirmed() {
        let surface = MemorySurface::new();
        surface.load("", 0, 7);
        surface.insert("a");
        surface.insert("b");

        surface.apply_remote_steps(1, &[received("a", 7)]);
        assert_eq!(surface.pending(), 1);
        assert_eq!(surface.version(), 1);
        assert_eq!(surface.sendable_steps().unwrap().version, 1);
        assert_eq!(surface.content(), "ab");
    }

    #[test]
    fn remote_steps_land_before_pending() {
        let surface = MemorySurface::new();
        surface.load("", 0, 7);
        surface.insert("mine");

        surface.apply_remote_steps(2, &[received("x", 3), received("y", 3)]);
        assert_eq!(surface.version(), 2);
        assert_eq!(surface.serialize(), "xymine");
    }

    #[test]
    fn sendable_resolution() {
        let surface = MemorySurface::new();
        surface.load("", 0, 1);

        assert!(Sendable::Surface.resolve(&surface).is_none());
        assert!(Sendable::from(SendableSteps::default()).resolve(&surface).is_none());

        let lazy = Sendable::provider(|| Some(SendableSteps::new(3, vec![json!({"insert": "z"})])));
        assert_eq!(lazy.resolve(&surface).unwrap().version, 3);

        surface.insert("q");
        assert_eq!(Sendable::Surface.resolve(&surface).unwrap().steps.len(), 1);
    }

    #[test]
    fn load_resets_state() {
        let surface = MemorySurface::new();
        surface.load("old", 4, 1);
        surface.insert("x");
        surface.load("new", 0, 2);
        assert_eq!(surface.content(), "new");
        assert_eq!(surface.client_id(), 2);
        assert_eq!(surface.version(), 0);
    }
}
