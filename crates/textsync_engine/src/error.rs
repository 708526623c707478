//! Error types for the sync engine.

use serde_json::Value;
use textsync_protocol::{ConflictPayload, ProtocolError};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug, Clone)]
pub enum SyncError {
    /// Network or transport error (no response received).
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
    },

    /// The request timed out.
    #[error("operation timed out")]
    Timeout,

    /// The server answered with a non-success status.
    #[error("http error: status {status}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Decoded JSON body, if the body was JSON.
        body: Option<Value>,
    },

    /// Protocol error (invalid message format).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An operation needs an open session.
    #[error("no open session")]
    NoSession,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SyncError {
    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates an HTTP status error with a JSON body.
    pub fn http(status: u16, body: Option<Value>) -> Self {
        Self::Http { status, body }
    }

    /// Returns true if no response was received (unreachable or timed out).
    pub fn is_network(&self) -> bool {
        matches!(self, SyncError::Transport { .. } | SyncError::Timeout)
    }

    /// Returns the HTTP status, if the server responded.
    pub fn status(&self) -> Option<u16> {
        match self {
            SyncError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Decodes the conflict payload carried by a rejected request.
    pub fn conflict(&self) -> Option<ConflictPayload> {
        match self {
            SyncError::Http {
                body: Some(body), ..
            } => serde_json::from_value(body.clone()).ok(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Protocol(err.to_string())
    }
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        SyncError::Protocol(err.to_string())
    }
}
