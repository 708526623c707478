//! Typed events emitted by the sync service.

use parking_lot::RwLock;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use textsync_protocol::{CollaboratorSession, Document, ReceivedStep, Session};

/// Error classes reported through [`SyncEvent::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    /// The stored file changed outside this session.
    SaveCollision,
    /// Local steps were rejected by a version race.
    PushFailure,
    /// The session could not be created.
    LoadError,
    /// The server is unreachable or refused access.
    ConnectionFailed,
    /// The underlying file is gone.
    SourceNotFound,
}

impl ErrorType {
    /// Returns the numeric code used by the editor UI.
    pub fn code(self) -> u8 {
        match self {
            ErrorType::SaveCollision => 0,
            ErrorType::PushFailure => 1,
            ErrorType::LoadError => 2,
            ErrorType::ConnectionFailed => 3,
            ErrorType::SourceNotFound => 4,
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorType::SaveCollision => "SAVE_COLLISSION",
            ErrorType::PushFailure => "PUSH_FAILURE",
            ErrorType::LoadError => "LOAD_ERROR",
            ErrorType::ConnectionFailed => "CONNECTION_FAILED",
            ErrorType::SourceNotFound => "SOURCE_NOT_FOUND",
        };
        f.write_str(name)
    }
}

/// Metadata attached to an error event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorData {
    /// Whether the UI should retry automatically.
    pub retry: Option<bool>,
    /// Content of the stored file when it changed outside the session.
    pub outside_change: Option<String>,
    /// HTTP status of the failed request.
    pub status: Option<u16>,
}

impl ErrorData {
    /// Error data carrying a retry hint.
    pub fn retry(retry: bool) -> Self {
        Self {
            retry: Some(retry),
            ..Self::default()
        }
    }

    /// Error data carrying an HTTP status.
    pub fn status(status: u16) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// Flags reported through [`SyncEvent::StateChange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    /// Local edits exist that the server has not saved.
    Dirty(bool),
    /// The first sync round after loading has completed.
    InitialLoading(bool),
}

/// An event emitted by the sync service.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A session was created.
    Opened {
        /// Document at open time.
        document: Document,
        /// This client's session.
        session: Session,
    },
    /// The initial document body was fetched.
    Loaded {
        /// Document at open time.
        document: Document,
        /// This client's session.
        session: Session,
        /// Raw document source.
        document_source: String,
    },
    /// Remote steps were appended to the step log.
    Sync {
        /// Steps with their authoring session ids.
        steps: Vec<ReceivedStep>,
        /// Document after the sync round.
        document: Document,
    },
    /// Document or collaborator metadata was refreshed.
    Change {
        /// Server document.
        document: Document,
        /// Known collaborator sessions.
        sessions: Vec<CollaboratorSession>,
    },
    /// A dirty or loading flag changed.
    StateChange(StateChange),
    /// The server persisted a newer version.
    Save {
        /// Server document.
        document: Document,
        /// Known collaborator sessions.
        sessions: Vec<CollaboratorSession>,
    },
    /// A classified failure.
    Error {
        /// Error class.
        error: ErrorType,
        /// Additional metadata.
        data: ErrorData,
    },
}

impl SyncEvent {
    /// Returns the kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            SyncEvent::Opened { .. } => EventKind::Opened,
            SyncEvent::Loaded { .. } => EventKind::Loaded,
            SyncEvent::Sync { .. } => EventKind::Sync,
            SyncEvent::Change { .. } => EventKind::Change,
            SyncEvent::StateChange(_) => EventKind::StateChange,
            SyncEvent::Save { .. } => EventKind::Save,
            SyncEvent::Error { .. } => EventKind::Error,
        }
    }

    /// Creates an error event.
    pub fn error(error: ErrorType, data: ErrorData) -> Self {
        SyncEvent::Error { error, data }
    }
}

/// Discriminant of [`SyncEvent`], used to subscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `opened`
    Opened,
    /// `loaded`
    Loaded,
    /// `sync`
    Sync,
    /// `change`
    Change,
    /// `stateChange`
    StateChange,
    /// `save`
    Save,
    /// `error`
    Error,
}

impl EventKind {
    /// All event kinds.
    pub const ALL: [EventKind; 7] = [
        EventKind::Opened,
        EventKind::Loaded,
        EventKind::Sync,
        EventKind::Change,
        EventKind::StateChange,
        EventKind::Save,
        EventKind::Error,
    ];

    /// Returns the wire name of the event.
    pub fn name(self) -> &'static str {
        match self {
            EventKind::Opened => "opened",
            EventKind::Loaded => "loaded",
            EventKind::Sync => "sync",
            EventKind::Change => "change",
            EventKind::StateChange => "stateChange",
            EventKind::Save => "save",
            EventKind::Error => "error",
        }
    }
}

/// Returned when subscribing to an unknown event name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEvent(pub String);

impl fmt::Display for UnknownEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event '{}'", self.0)
    }
}

impl std::error::Error for UnknownEvent {}

impl FromStr for EventKind {
    type Err = UnknownEvent;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "opened" => Ok(EventKind::Opened),
            "loaded" => Ok(EventKind::Loaded),
            "sync" => Ok(EventKind::Sync),
            "change" => Ok(EventKind::Change),
            "stateChange" => Ok(EventKind::StateChange),
            "save" => Ok(EventKind::Save),
            "error" => Ok(EventKind::Error),
            other => Err(UnknownEvent(other.to_string())),
        }
    }
}

type Handler = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

/// Handler registry keyed by event kind.
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<Vec<(EventKind, Handler)>>,
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for `kind`.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> &Self
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        self.handlers.write().push((kind, Arc::new(handler)));
        self
    }

    /// Registers a handler by event name.
    ///
    /// Unknown names are logged and ignored.
    pub fn on_named<F>(&self, name: &str, handler: F) -> &Self
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        match name.parse::<EventKind>() {
            Ok(kind) => self.on(kind, handler),
            Err(err) => {
                tracing::error!(event = name, "{}", err);
                self
            }
        }
    }

    /// Dispatches `event` to its handlers in registration order.
    pub fn emit(&self, event: SyncEvent) {
        let kind = event.kind();
        // Handlers may subscribe or emit from inside a callback.
        let handlers: Vec<Handler> = self
            .handlers
            .read()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, h)| Arc::clone(h))
            .collect();
        tracing::trace!(event = kind.name(), handlers = handlers.len(), "emit");
        for handler in handlers {
            handler(&event);
        }
    }

    /// Returns the number of handlers registered for `kind`.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.read().iter().filter(|(k, _)| *k == kind).count()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handlers.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn event_names_roundtrip() {
        for kind in [
            EventKind::Opened,
            EventKind::Loaded,
            EventKind::Sync,
            EventKind::Change,
            EventKind::StateChange,
            EventKind::Save,
            EventKind::Error,
        ] {
            assert_eq!(kind.name().parse::<EventKind>().unwrap(), kind);
        }
        assert!("bogus".parse::<EventKind>().is_err());
    }

    #[test]
    fn error_codes() {
        assert_eq!(ErrorType::SaveCollision.code(), 0);
        assert_eq!(ErrorType::SourceNotFound.code(), 4);
        assert_eq!(ErrorType::ConnectionFailed.to_string(), "CONNECTION_FAILED");
    }

    #[test]
    fn handlers_receive_matching_events() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        bus.on(EventKind::StateChange, move |event| {
            sink.lock().push(event.clone());
        });
        let sink = Arc::clone(&seen);
        bus.on_named("error", move |event| {
            sink.lock().push(event.clone());
        });

        bus.emit(SyncEvent::StateChange(StateChange::Dirty(true)));
        bus.emit(SyncEvent::Save {
            document: Document::default(),
            sessions: vec![],
        });
        bus.emit(SyncEvent::error(
            ErrorType::PushFailure,
            ErrorData::default(),
        ));

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], SyncEvent::StateChange(StateChange::Dirty(true)));
        assert_eq!(seen[1].kind(), EventKind::Error);
    }

    #[test]
    fn unknown_name_is_ignored() {
        let bus = EventBus::new();
        bus.on_named("changed", |_| {});
        assert_eq!(bus.handler_count(EventKind::Change), 0);
    }

    #[test]
    fn handler_may_subscribe_during_emit() {
        let bus = Arc::new(EventBus::new());
        let inner = Arc::clone(&bus);
        bus.on(EventKind::Save, move |_| {
            inner.on(EventKind::Save, |_| {});
        });
        bus.emit(SyncEvent::Save {
            document: Document::default(),
            sessions: vec![],
        });
        assert_eq!(bus.handler_count(EventKind::Save), 2);
    }
}
