//! # textsync Protocol
//!
//! Wire types for the textsync collaborative editing protocol.
//!
//! This crate provides:
//! - `Document`, `Session` and `CollaboratorSession` state records
//! - Step entries and the append-only `StepLog`
//! - Request/response messages for the session endpoints
//! - The conflict payload returned when a push or save collides
//! - The endpoint table shared by clients and the reference server
//!
//! All messages are JSON with camelCase keys. This is a pure protocol crate
//! with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod conflict;
mod document;
mod endpoint;
mod error;
mod messages;
mod step;
mod steplog;

pub use conflict::ConflictPayload;
pub use document::{active_collaborators, CollaboratorSession, Document, Session};
pub use endpoint::{Endpoint, Method};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    CloseSessionRequest, CreateSessionRequest, CreateSessionResponse, FetchDocumentRequest,
    PushRequest, PushResponse, SessionCredentials, SyncRequest, SyncResponse,
    UpdateSessionRequest,
};
pub use step::{ReceivedStep, SendableSteps, StepEntry};
pub use steplog::{StepLog, StepsSince};
