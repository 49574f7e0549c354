//! Document snapshots.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The contents of a document that exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentState {
    /// Document ID.
    pub id: String,
    /// Revision marker, if the document has been through the remote.
    pub rev: Option<String>,
    /// Document fields.
    pub body: Map<String, Value>,
}

impl DocumentState {
    /// Creates a document without a revision.
    pub fn new(id: impl Into<String>, body: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            rev: None,
            body,
        }
    }

    /// Creates a document from a JSON object value.
    ///
    /// Non-object values produce an empty body.
    pub fn from_json(id: impl Into<String>, body: Value) -> Self {
        let body = match body {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self::new(id, body)
    }

    /// Sets the revision.
    pub fn with_rev(mut self, rev: impl Into<String>) -> Self {
        self.rev = Some(rev.into());
        self
    }

    /// Looks up a top-level field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.body.get(field)
    }
}

/// A point-in-time view of a single document.
///
/// `Deleted` is the sentinel for a document that does not exist (or no
/// longer exists) remotely.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Snapshot {
    /// The document exists.
    Present(DocumentState),
    /// The document does not exist.
    #[default]
    Deleted,
}

impl Snapshot {
    /// Creates a present snapshot from a JSON object.
    pub fn present(id: impl Into<String>, body: Value) -> Self {
        Snapshot::Present(DocumentState::from_json(id, body))
    }

    /// Returns true for the deleted sentinel.
    pub fn is_deleted(&self) -> bool {
        matches!(self, Snapshot::Deleted)
    }

    /// Returns the document if it exists.
    pub fn document(&self) -> Option<&DocumentState> {
        match self {
            Snapshot::Present(doc) => Some(doc),
            Snapshot::Deleted => None,
        }
    }

    /// Returns the revision marker of a present document.
    pub fn rev(&self) -> Option<&str> {
        self.document().and_then(|doc| doc.rev.as_deref())
    }

    /// Looks up a top-level field of a present document.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.document().and_then(|doc| doc.get(field))
    }

    /// Copies the revision marker of `previous` onto this snapshot.
    ///
    /// Only applies when both snapshots are present; used so that a
    /// revision-only difference does not count as a content change.
    pub fn carry_revision_from(&mut self, previous: &Snapshot) {
        if let (Snapshot::Present(current), Snapshot::Present(previous)) = (self, previous) {
            current.rev.clone_from(&previous.rev);
        }
    }
}

impl From<DocumentState> for Snapshot {
    fn from(doc: DocumentState) -> Self {
        Snapshot::Present(doc)
    }
}
