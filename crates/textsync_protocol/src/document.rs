//! Document and session records.

use serde::{Deserialize, Serialize};

/// Server-held state of a collaboratively edited document.
///
/// A `Document` is always replaced wholesale with the copy from the latest
/// server response; it is never patched field by field.
///
/// # Invariants
///
/// - `last_saved_version <= current_version`
/// - `base_version_etag` identifies the stored file snapshot the editing
///   session was opened against
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Document ID (the file ID on the server).
    pub id: i64,
    /// Number of steps applied on the server.
    #[serde(default)]
    pub current_version: u64,
    /// Version that was last persisted to storage.
    #[serde(default)]
    pub last_saved_version: u64,
    /// Unix timestamp of the last save.
    #[serde(default)]
    pub last_saved_version_time: i64,
    /// Fingerprint of the stored file the session was opened against.
    #[serde(default)]
    pub base_version_etag: String,
    /// Whether this client may edit.
    #[serde(default)]
    pub read_only: bool,
    /// Version the fetched document source corresponds to.
    #[serde(default)]
    pub initial_version: u64,
}

impl Document {
    /// Creates a fresh document at version zero.
    pub fn new(id: i64, base_version_etag: impl Into<String>) -> Self {
        Self {
            id,
            base_version_etag: base_version_etag.into(),
            ..Self::default()
        }
    }

    /// Returns true if `other` was opened against a different file snapshot.
    ///
    /// An empty etag on either side never reports a change; servers without
    /// etag support send an empty string.
    pub fn has_outside_change(&self, other: &Document) -> bool {
        !self.base_version_etag.is_empty()
            && !other.base_version_etag.is_empty()
            && other.base_version_etag != self.base_version_etag
    }

    /// Returns true if the server persisted a newer version than this copy knows.
    pub fn saved_since(&self, other: &Document) -> bool {
        other.last_saved_version > self.last_saved_version
    }
}

/// This client's identity towards the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Session ID, also used as the client ID of authored steps.
    pub id: i64,
    /// Secret token authenticating the session.
    pub token: String,
    /// Display name for anonymous (share link) editors.
    #[serde(default)]
    pub guest_name: Option<String>,
}

/// A participant in the editing session as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollaboratorSession {
    /// Session ID.
    pub id: i64,
    /// User ID for logged-in users.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Guest name for anonymous users.
    #[serde(default)]
    pub guest_name: Option<String>,
    /// Display name of the user.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Unix timestamp of the last request from this session.
    #[serde(default)]
    pub last_contact: i64,
}

impl CollaboratorSession {
    /// Returns true if the session contacted the server within `disconnect_secs`.
    pub fn is_active(&self, now: i64, disconnect_secs: i64) -> bool {
        self.last_contact > now - disconnect_secs
    }
}

/// Counts the collaborators that were in contact recently.
pub fn active_collaborators(
    sessions: &[CollaboratorSession],
    now: i64,
    disconnect_secs: i64,
) -> usize {
    sessions
        .iter()
        .filter(|s| s.is_active(now, disconnect_secs))
        .count()
}
