//! Error types for protocol decoding.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while decoding protocol messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// A required field was absent.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// A field was present but could not be parsed.
    #[error("invalid value for {field}: {value:?}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// Raw value.
        value: String,
    },

    /// A step entry whose `data` is not an array of steps.
    #[error("invalid step data from session {session_id}")]
    InvalidStepData {
        /// Authoring session.
        session_id: i64,
    },

    /// JSON (de)serialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ProtocolError::MissingField("documentId");
        assert_eq!(err.to_string(), "missing field: documentId");

        let err = ProtocolError::InvalidStepData { session_id: 7 };
        assert!(err.to_string().contains('7'));
    }
}
