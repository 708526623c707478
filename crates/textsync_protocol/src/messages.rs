//! Protocol messages for the session endpoints.
//!
//! POST bodies are JSON. The two GET endpoints (`session/fetch` and
//! `session/close`) carry `SessionCredentials` as query parameters.

use crate::document::{CollaboratorSession, Document, Session};
use crate::error::{ProtocolError, ProtocolResult};
use crate::step::StepEntry;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifies a session on every request after `session/create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCredentials {
    /// Document ID.
    pub document_id: i64,
    /// Session ID.
    pub session_id: i64,
    /// Session token.
    pub session_token: String,
    /// Share token for public (link) access.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl SessionCredentials {
    /// Creates credentials for `session` on `document`.
    pub fn new(document: &Document, session: &Session, share_token: Option<String>) -> Self {
        Self {
            document_id: document.id,
            session_id: session.id,
            session_token: session.token.clone(),
            token: share_token,
        }
    }

    /// Encodes the credentials as query parameters.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("documentId", self.document_id.to_string()),
            ("sessionId", self.session_id.to_string()),
            ("sessionToken", self.session_token.clone()),
        ];
        if let Some(ref token) = self.token {
            pairs.push(("token", token.clone()));
        }
        pairs
    }

    /// Decodes credentials from query parameters.
    pub fn from_query<'a, I>(pairs: I) -> ProtocolResult<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut document_id = None;
        let mut session_id = None;
        let mut session_token = None;
        let mut token = None;

        for (key, value) in pairs {
            match key {
                "documentId" => document_id = Some(parse_id("documentId", value)?),
                "sessionId" => session_id = Some(parse_id("sessionId", value)?),
                "sessionToken" => session_token = Some(value.to_string()),
                "token" if !value.is_empty() => token = Some(value.to_string()),
                _ => {}
            }
        }

        Ok(Self {
            document_id: document_id.ok_or(ProtocolError::MissingField("documentId"))?,
            session_id: session_id.ok_or(ProtocolError::MissingField("sessionId"))?,
            session_token: session_token.ok_or(ProtocolError::MissingField("sessionToken"))?,
            token,
        })
    }
}

fn parse_id(field: &'static str, value: &str) -> ProtocolResult<i64> {
    value.parse().map_err(|_| ProtocolError::InvalidField {
        field,
        value: value.to_string(),
    })
}

/// Query for `session/fetch`.
pub type FetchDocumentRequest = SessionCredentials;

/// Query for `session/close`.
pub type CloseSessionRequest = SessionCredentials;

/// Body of `session/create`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    /// File to open by ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<i64>,
    /// File to open by path (relative to the share for public access).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    /// Share token for public access.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Name to show for anonymous editors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guest_name: Option<String>,
    /// Discard the server's step history and reload from storage.
    #[serde(default)]
    pub force_recreate: bool,
}

/// Response of `session/create`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    /// The document.
    pub document: Document,
    /// The newly created session.
    pub session: Session,
    /// Whether this client may only read.
    #[serde(default)]
    pub read_only: bool,
}

/// Body of `session/sync`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    /// Session credentials.
    #[serde(flatten)]
    pub credentials: SessionCredentials,
    /// Version the client has applied.
    pub version: u64,
    /// Serialized document to persist, if the client has unsaved changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autosave_content: Option<String>,
    /// Overwrite the stored file even if it changed outside the session.
    #[serde(default)]
    pub force: bool,
    /// The user explicitly asked to save.
    #[serde(default)]
    pub manual_save: bool,
    /// File path for public access.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

/// Response of `session/sync`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    /// The server's current document.
    pub document: Document,
    /// All known sessions on the document.
    #[serde(default)]
    pub sessions: Vec<CollaboratorSession>,
    /// Step entries newer than the requested version.
    #[serde(default)]
    pub steps: Vec<StepEntry>,
}

/// Body of `session/push`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    /// Session credentials.
    #[serde(flatten)]
    pub credentials: SessionCredentials,
    /// Steps to append.
    pub steps: Vec<Value>,
    /// Version the steps were computed against.
    pub version: u64,
    /// File path for public access.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

/// Response of a successful `session/push`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PushResponse {}

/// Body of `session` (guest name update).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSessionRequest {
    /// Session credentials.
    #[serde(flatten)]
    pub credentials: SessionCredentials,
    /// New guest name.
    pub guest_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn credentials() -> SessionCredentials {
        SessionCredentials {
            document_id: 5,
            session_id: 9,
            session_token: "tok".into(),
            token: Some("share".into()),
        }
    }

    #[test]
    fn credentials_query_roundtrip() {
        let creds = credentials();
        let pairs = creds.query_pairs();
        let decoded =
            SessionCredentials::from_query(pairs.iter().map(|(k, v)| (*k, v.as_str()))).unwrap();
        assert_eq!(decoded, creds);
    }

    #[test]
    fn credentials_query_missing_field() {
        let result = SessionCredentials::from_query(vec![("documentId", "1")]);
        assert!(matches!(result, Err(ProtocolError::MissingField("sessionId"))));
    }

    #[test]
    fn credentials_query_bad_id() {
        let result = SessionCredentials::from_query(vec![
            ("documentId", "x"),
            ("sessionId", "1"),
            ("sessionToken", "t"),
        ]);
        assert!(matches!(
            result,
            Err(ProtocolError::InvalidField { field: "documentId", .. })
        ));
    }

    #[test]
    fn sync_request_is_flat() {
        let request = SyncRequest {
            credentials: credentials(),
            version: 3,
            autosave_content: None,
            force: false,
            manual_save: true,
            file_path: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["documentId"], 5);
        assert_eq!(json["sessionToken"], "tok");
        assert_eq!(json["token"], "share");
        assert_eq!(json["manualSave"], true);
        assert!(json.get("autosaveContent").is_none());
    }

    #[test]
    fn sync_response_defaults() {
        let response: SyncResponse =
            serde_json::from_value(json!({"document": {"id": 1, "currentVersion": 2}})).unwrap();
        assert!(response.sessions.is_empty());
        assert!(response.steps.is_empty());
        assert_eq!(response.document.current_version, 2);
    }

    #[test]
    fn push_request_decodes() {
        let request: PushRequest = serde_json::from_value(json!({
            "documentId": 1,
            "sessionId": 2,
            "sessionToken": "t",
            "steps": [{"stepType": "replace"}],
            "version": 4
        }))
        .unwrap();
        assert_eq!(request.credentials.token, None);
        assert_eq!(request.steps.len(), 1);
        assert_eq!(request.version, 4);
    }

    #[test]
    fn create_request_skips_absent_fields() {
        let request = CreateSessionRequest {
            file_id: Some(42),
            ..CreateSessionRequest::default()
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, json!({"fileId": 42, "forceRecreate": false}));
    }
}
