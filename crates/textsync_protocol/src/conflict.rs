//! Conflict payloads.

use crate::document::Document;
use serde::{Deserialize, Serialize};

/// Body of a rejected push or save.
///
/// The server attaches its current document so the client can tell whether
/// it is merely behind (`document.current_version` ahead of the client) or
/// whether the request collided at the version the client already knows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictPayload {
    /// The server's current document.
    pub document: Document,
    /// Content of the stored file when it was changed outside the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outside_change: Option<String>,
}

impl ConflictPayload {
    /// Creates a conflict payload for a version race.
    pub fn version_race(document: Document) -> Self {
        Self {
            document,
            outside_change: None,
        }
    }

    /// Creates a conflict payload for a file changed outside the session.
    pub fn outside_change(document: Document, content: impl Into<String>) -> Self {
        Self {
            document,
            outside_change: Some(content.into()),
        }
    }

    /// Returns true if the server reports the same version the client holds.
    pub fn at_version(&self, current_version: u64) -> bool {
        self.document.current_version == current_version
    }
}
