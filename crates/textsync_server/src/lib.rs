//! # textsync Server
//!
//! In-memory reference server for the textsync session protocol.
//!
//! This crate provides:
//! - The six session endpoints (create, fetch, sync, push, update, close)
//! - Step history with server-assigned versions
//! - Autosave with outside-change detection
//! - Share tokens for public and read-only access
//! - Failure injection for tests
//!
//! # Protocol
//!
//! Clients follow a fetch-then-push model:
//! 1. `session/create` returns the document and a session token
//! 2. `session/fetch` returns the content the document was created from
//! 3. `session/sync` returns steps newer than the client version and saves
//!    the attached content
//! 4. `session/push` appends steps if the client is at the current version
//!
//! The server keeps no state on disk. It exists to drive integration tests
//! and demos; an HTTP front end only has to route requests to
//! [`TextServer::handle`].

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod server;
mod store;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler, LOCAL_USER};
pub use server::{ServerResponse, TextServer};
pub use store::FileRecord;
