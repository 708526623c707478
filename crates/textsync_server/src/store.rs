//! In-memory files, documents and sessions.

use std::collections::HashMap;
use textsync_protocol::{CollaboratorSession, Document, Session, StepEntry};

/// A stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Path of the file.
    pub path: String,
    /// Stored content.
    pub content: String,
    /// Fingerprint of the stored content.
    pub etag: String,
}

/// A file opened for collaborative editing.
#[derive(Debug, Clone)]
pub(crate) struct DocumentRecord {
    pub document: Document,
    /// File content the document was created from.
    pub base_content: String,
    /// Accepted steps, one entry per push.
    pub steps: Vec<StepEntry>,
    /// Etag of the file as last written by this document.
    pub saved_etag: String,
}

impl DocumentRecord {
    fn new(file_id: i64, file: &FileRecord) -> Self {
        Self {
            document: Document::new(file_id, file.etag.clone()),
            base_content: file.content.clone(),
            steps: Vec::new(),
            saved_etag: file.etag.clone(),
        }
    }

    /// Returns the entries the client at `version` has not seen.
    pub fn steps_since(&self, version: u64) -> Vec<StepEntry> {
        self.steps
            .iter()
            .filter(|entry| entry.version.map_or(false, |v| v > version))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SessionRecord {
    pub session: Session,
    pub document_id: i64,
    pub user_id: Option<String>,
    /// Share token the session was opened with.
    pub share_token: Option<String>,
    pub read_only: bool,
    pub last_contact: i64,
}

impl SessionRecord {
    fn collaborator(&self) -> CollaboratorSession {
        CollaboratorSession {
            id: self.session.id,
            user_id: self.user_id.clone(),
            guest_name: self.session.guest_name.clone(),
            display_name: self
                .user_id
                .clone()
                .or_else(|| self.session.guest_name.clone()),
            last_contact: self.last_contact,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Share {
    pub file_id: i64,
    pub read_only: bool,
}

/// All server state.
#[derive(Debug, Default)]
pub(crate) struct Store {
    pub files: HashMap<i64, FileRecord>,
    pub documents: HashMap<i64, DocumentRecord>,
    pub sessions: HashMap<i64, SessionRecord>,
    pub shares: HashMap<String, Share>,
    next_file_id: i64,
    next_session_id: i64,
}

impl Store {
    pub fn add_file(&mut self, path: String, content: String) -> i64 {
        self.next_file_id += 1;
        let id = self.next_file_id;
        self.files.insert(
            id,
            FileRecord {
                path,
                content,
                etag: new_etag(),
            },
        );
        id
    }

    /// Replaces the stored content and returns the new etag.
    pub fn write_file(&mut self, file_id: i64, content: String) -> Option<String> {
        let file = self.files.get_mut(&file_id)?;
        file.content = content;
        file.etag = new_etag();
        Some(file.etag.clone())
    }

    pub fn file_by_path(&self, path: &str) -> Option<i64> {
        let path = path.trim_start_matches('/');
        self.files
            .iter()
            .find(|(_, file)| file.path.trim_start_matches('/') == path)
            .map(|(id, _)| *id)
    }

    /// Returns the document for `file_id`, creating it from the stored file
    /// if needed. `recreate` drops the step history.
    pub fn open_document(&mut self, file_id: i64, recreate: bool) -> Option<&mut DocumentRecord> {
        let file = self.files.get(&file_id)?;
        if recreate || !self.documents.contains_key(&file_id) {
            tracing::debug!(file_id, recreate, "creating document");
            self.documents
                .insert(file_id, DocumentRecord::new(file_id, file));
        }
        self.documents.get_mut(&file_id)
    }

    pub fn add_session(&mut self, mut record: SessionRecord) -> Session {
        self.next_session_id += 1;
        record.session.id = self.next_session_id;
        let session = record.session.clone();
        self.sessions.insert(session.id, record);
        session
    }

    /// Returns the sessions of `document_id` that were in contact since `cutoff`.
    pub fn collaborators(&self, document_id: i64, cutoff: i64) -> Vec<CollaboratorSession> {
        let mut sessions: Vec<_> = self
            .sessions
            .values()
            .filter(|s| s.document_id == document_id && s.last_contact >= cutoff)
            .map(SessionRecord::collaborator)
            .collect();
        sessions.sort_by_key(|s| s.id);
        sessions
    }
}

/// Creates a fresh etag.
pub(crate) fn new_etag() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session(document_id: i64, last_contact: i64) -> SessionRecord {
        SessionRecord {
            session: Session {
                id: 0,
                token: "t".into(),
                guest_name: None,
            },
            document_id,
            user_id: Some("alice".into()),
            share_token: None,
            read_only: false,
            last_contact,
        }
    }

    #[test]
    fn files_by_path() {
        let mut store = Store::default();
        let id = store.add_file("notes/a.md".into(), "# A".into());
        assert_eq!(store.file_by_path("/notes/a.md"), Some(id));
        assert_eq!(store.file_by_path("notes/b.md"), None);
    }

    #[test]
    fn write_changes_etag() {
        let mut store = Store::default();
        let id = store.add_file("a.md".into(), "a".into());
        let before = store.files[&id].etag.clone();
        let after = store.write_file(id, "b".into()).unwrap();
        assert_ne!(before, after);
        assert_eq!(store.files[&id].content, "b");
        assert_eq!(store.write_file(99, "x".into()), None);
    }

    #[test]
    fn recreate_drops_steps() {
        let mut store = Store::default();
        let id = store.add_file("a.md".into(), "a".into());
        let record = store.open_document(id, false).unwrap();
        record.steps.push(StepEntry::new(1, 1, vec![json!({"insert": "x"})]));
        record.document.current_version = 1;

        assert_eq!(store.open_document(id, false).unwrap().steps.len(), 1);
        let record = store.open_document(id, true).unwrap();
        assert!(record.steps.is_empty());
        assert_eq!(record.document.current_version, 0);
        assert!(store.open_document(42, false).is_none());
    }

    #[test]
    fn steps_since_filters_by_version() {
        let mut store = Store::default();
        let id = store.add_file("a.md".into(), String::new());
        let record = store.open_document(id, false).unwrap();
        record.steps.push(StepEntry::new(1, 2, vec![json!(1), json!(2)]));
        record.steps.push(StepEntry::new(2, 3, vec![json!(3)]));

        assert_eq!(record.steps_since(0).len(), 2);
        assert_eq!(record.steps_since(2).len(), 1);
        assert!(record.steps_since(3).is_empty());
    }

    #[test]
    fn collaborators_skip_idle_and_other_documents() {
        let mut store = Store::default();
        store.add_session(session(1, 100));
        store.add_session(session(1, 10));
        store.add_session(session(2, 100));

        let collaborators = store.collaborators(1, 50);
        assert_eq!(collaborators.len(), 1);
        assert_eq!(collaborators[0].display_name.as_deref(), Some("alice"));
    }
}
