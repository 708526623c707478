//! # TextSync Engine
//!
//! Client-side sync engine for collaborative text documents.
//!
//! This crate provides:
//! - A sync service owning the session, document and step log
//! - Adaptive polling with a single-flight request lock
//! - Careful push retries with exponential backoff
//! - Save, save-collision and outside-change handling
//! - Typed events for the editor
//! - HTTP transport abstraction (reqwest or in-process loopback)
//!
//! ## Architecture
//!
//! The engine runs a **fetch-then-push** model against an authoritative
//! step server:
//! 1. A timer fetches new steps and collaborator sessions
//! 2. Received steps are appended to the log and handed to the editor
//! 3. Local steps are pushed and immediately followed by a fetch
//!
//! ## Key Invariants
//!
//! - The server assigns versions; the client never renumbers steps
//! - At most one fetch or push is in flight per service
//! - Nothing is sent after `close()`
//! - A push is never dropped silently: it is deferred, retried or reported

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod event;
mod http;
mod polling;
mod service;
mod surface;
mod transport;

pub use config::{random_guest_name, PollingConfig, RetryConfig, SessionOptions, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use event::{ErrorData, ErrorType, EventBus, EventKind, StateChange, SyncEvent, UnknownEvent};
#[cfg(feature = "reqwest")]
pub use http::ReqwestClient;
pub use http::{HttpClient, HttpRequest, HttpResponse, HttpTransport, LoopbackClient, LoopbackServer};
pub use polling::{PollingState, PollingTransport, PUSH_RETRY_NOTICE};
pub use service::{OpenTarget, SaveStatus, SyncService};
pub use surface::{EditingSurface, LogNotifier, MemorySurface, Notifier, Sendable};
pub use transport::{MockCall, MockTransport, SyncTransport};
