//! Document operations.

use crate::path::FieldPath;
use crate::snapshot::{DocumentState, Snapshot};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// A single field-level change inside a patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum PatchOp {
    /// Set a field, creating intermediate objects as needed.
    Set {
        /// Target field.
        path: FieldPath,
        /// New value.
        value: Value,
    },
    /// Set a field only when it is absent.
    SetIfMissing {
        /// Target field.
        path: FieldPath,
        /// Value to set.
        value: Value,
    },
    /// Remove a field.
    Unset {
        /// Target field.
        path: FieldPath,
    },
    /// Add to a numeric field.
    Inc {
        /// Target field.
        path: FieldPath,
        /// Amount to add.
        by: Number,
    },
    /// Subtract from a numeric field.
    Dec {
        /// Target field.
        path: FieldPath,
        /// Amount to subtract.
        by: Number,
    },
}

impl PatchOp {
    /// Returns the path this op touches.
    pub fn path(&self) -> &FieldPath {
        match self {
            PatchOp::Set { path, .. }
            | PatchOp::SetIfMissing { path, .. }
            | PatchOp::Unset { path }
            | PatchOp::Inc { path, .. }
            | PatchOp::Dec { path, .. } => path,
        }
    }

    /// Applies this op to a document body.
    ///
    /// Ops that cannot apply (incrementing a string, descending through a
    /// scalar) leave the body untouched.
    pub fn apply_to(&self, body: &mut Map<String, Value>) {
        match self {
            PatchOp::Set { path, value } => {
                if let Some((parent, key)) = path.parent_mut_or_create(body) {
                    parent.insert(key.to_string(), value.clone());
                }
            }
            PatchOp::SetIfMissing { path, value } => {
                if let Some((parent, key)) = path.parent_mut_or_create(body) {
                    parent
                        .entry(key.to_string())
                        .or_insert_with(|| value.clone());
                }
            }
            PatchOp::Unset { path } => {
                if let Some((parent, key)) = path.parent_mut(body) {
                    parent.remove(key);
                }
            }
            PatchOp::Inc { path, by } => add_to_number(body, path, by, false),
            PatchOp::Dec { path, by } => add_to_number(body, path, by, true),
        }
    }
}

fn add_to_number(body: &mut Map<String, Value>, path: &FieldPath, by: &Number, negate: bool) {
    let Some((parent, key)) = path.parent_mut(body) else {
        return;
    };
    let Some(Value::Number(current)) = parent.get_mut(key) else {
        return;
    };
    if let Some(sum) = add_numbers(current, by, negate) {
        *current = sum;
    }
}

fn add_numbers(current: &Number, by: &Number, negate: bool) -> Option<Number> {
    if let (Some(a), Some(b)) = (current.as_i64(), by.as_i64()) {
        let result = if negate {
            a.checked_sub(b)
        } else {
            a.checked_add(b)
        };
        if let Some(result) = result {
            return Some(Number::from(result));
        }
    }

    let a = current.as_f64()?;
    let b = by.as_f64()?;
    Number::from_f64(if negate { a - b } else { a + b })
}

/// A document-level operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Operation {
    /// Create the document; a no-op when it already exists.
    Create {
        /// Initial contents.
        document: DocumentState,
    },
    /// Create the document unless it exists.
    CreateIfNotExists {
        /// Initial contents.
        document: DocumentState,
    },
    /// Create the document, or replace its contents when it exists.
    CreateOrReplace {
        /// New contents.
        document: DocumentState,
    },
    /// Delete the document.
    Delete {
        /// Document ID.
        id: String,
    },
    /// Apply field-level changes to an existing document.
    Patch {
        /// Document ID.
        id: String,
        /// Field changes, applied in order.
        ops: Vec<PatchOp>,
    },
}

impl Operation {
    /// Builds a patch with a single op.
    pub fn patch(id: impl Into<String>, op: PatchOp) -> Self {
        Operation::Patch {
            id: id.into(),
            ops: vec![op],
        }
    }

    /// Returns the ID of the document this operation targets.
    pub fn document_id(&self) -> &str {
        match self {
            Operation::Create { document }
            | Operation::CreateIfNotExists { document }
            | Operation::CreateOrReplace { document } => &document.id,
            Operation::Delete { id } | Operation::Patch { id, .. } => id,
        }
    }

    /// Applies this operation to a snapshot.
    pub fn apply(&self, snapshot: Snapshot) -> Snapshot {
        if let Snapshot::Present(doc) = &snapshot {
            if doc.id != self.document_id() {
                return snapshot;
            }
        }

        match (self, snapshot) {
            (
                Operation::Create { document } | Operation::CreateIfNotExists { document },
                Snapshot::Deleted,
            ) => Snapshot::Present(fresh(document)),
            (Operation::Create { .. } | Operation::CreateIfNotExists { .. }, existing) => existing,
            (Operation::CreateOrReplace { document }, Snapshot::Present(existing)) => {
                Snapshot::Present(DocumentState {
                    rev: existing.rev,
                    ..fresh(document)
                })
            }
            (Operation::CreateOrReplace { document }, Snapshot::Deleted) => {
                Snapshot::Present(fresh(document))
            }
            (Operation::Delete { .. }, _) => Snapshot::Deleted,
            (Operation::Patch { ops, .. }, Snapshot::Present(mut doc)) => {
                for op in ops {
                    op.apply_to(&mut doc.body);
                }
                Snapshot::Present(doc)
            }
            (Operation::Patch { .. }, Snapshot::Deleted) => Snapshot::Deleted,
        }
    }
}

/// Contents of a created document never carry a caller-supplied revision.
fn fresh(document: &DocumentState) -> DocumentState {
    DocumentState {
        rev: None,
        ..document.clone()
    }
}
