//! Error types for the reference server.

use textsync_protocol::{ConflictPayload, ProtocolError};
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the reference server.
///
/// Every variant maps to an HTTP status; conflicts carry the body the
/// client uses to classify them.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Unknown session or wrong session token.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// The session may not perform this request.
    #[error("read-only session")]
    ReadOnly(ConflictPayload),

    /// File or document does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Push or save collided with the server state.
    #[error("conflict at version {}", .0.document.current_version)]
    Conflict(ConflictPayload),

    /// Failure injected by a test.
    #[error("injected failure {status}")]
    Injected {
        /// HTTP status to answer with.
        status: u16,
        /// Body to answer with.
        payload: Option<ConflictPayload>,
    },

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Returns the HTTP status for this error.
    pub fn status(&self) -> u16 {
        match self {
            ServerError::InvalidRequest(_) => 400,
            ServerError::NotAuthorized(_) | ServerError::ReadOnly(_) => 403,
            ServerError::NotFound(_) => 404,
            ServerError::Conflict(_) => 409,
            ServerError::Injected { status, .. } => *status,
            ServerError::Internal(_) => 500,
        }
    }

    /// Returns the JSON body for this error.
    pub fn body(&self) -> String {
        let payload = match self {
            ServerError::ReadOnly(payload) | ServerError::Conflict(payload) => Some(payload),
            ServerError::Injected { payload, .. } => payload.as_ref(),
            _ => None,
        };
        match payload {
            Some(payload) => serde_json::to_string(payload)
                .unwrap_or_else(|_| String::from("{}")),
            None => serde_json::json!({ "error": self.to_string() }).to_string(),
        }
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status())
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status() >= 500
    }
}

impl From<ProtocolError> for ServerError {
    fn from(err: ProtocolError) -> Self {
        ServerError::InvalidRequest(err.to_string())
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        ServerError::InvalidRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use textsync_protocol::Document;

    #[test]
    fn error_classification() {
        assert!(ServerError::InvalidRequest("bad".into()).is_client_error());
        assert!(ServerError::Internal("oops".into()).is_server_error());
        assert!(!ServerError::InvalidRequest("bad".into()).is_server_error());
        assert_eq!(
            ServerError::Injected {
                status: 503,
                payload: None
            }
            .status(),
            503
        );
    }

    #[test]
    fn conflict_body_carries_document() {
        let mut document = Document::new(4, "etag");
        document.current_version = 12;
        let err = ServerError::Conflict(ConflictPayload::version_race(document));
        assert_eq!(err.status(), 409);
        assert!(err.to_string().contains("12"));

        let body: ConflictPayload = serde_json::from_str(&err.body()).unwrap();
        assert_eq!(body.document.current_version, 12);
    }

    #[test]
    fn plain_errors_have_message_body() {
        let err = ServerError::NotFound("file 9".into());
        let body: serde_json::Value = serde_json::from_str(&err.body()).unwrap();
        assert_eq!(body["error"], "not found: file 9");
    }
}
