//! Mutations: ordered groups of operations that travel as one transaction.

use crate::error::{MutationError, MutationResult};
use crate::operation::Operation;
use crate::snapshot::Snapshot;
use serde::{Deserialize, Serialize};

/// A group of operations applied atomically.
///
/// Locally produced mutations carry no transaction identity until they are
/// squashed for transmission. Remote mutations carry the revision they were
/// based on (`previous_rev`) and the revision they produce (`result_rev`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Mutation {
    /// Transaction ID assigned before transmission.
    pub transaction_id: Option<String>,
    /// Revision this mutation was based on.
    pub previous_rev: Option<String>,
    /// Revision the document has after this mutation.
    pub result_rev: Option<String>,
    /// Operations, applied in order.
    pub operations: Vec<Operation>,
}

impl Mutation {
    /// Creates a local mutation from operations.
    pub fn new(operations: Vec<Operation>) -> Self {
        Self {
            operations,
            ..Self::default()
        }
    }

    /// Creates a local mutation with a single operation.
    pub fn single(operation: Operation) -> Self {
        Self::new(vec![operation])
    }

    /// Sets the transaction ID.
    pub fn with_transaction_id(mut self, id: impl Into<String>) -> Self {
        self.transaction_id = Some(id.into());
        self
    }

    /// Sets the base revision.
    pub fn with_previous_rev(mut self, rev: impl Into<String>) -> Self {
        self.previous_rev = Some(rev.into());
        self
    }

    /// Sets the resulting revision.
    pub fn with_result_rev(mut self, rev: impl Into<String>) -> Self {
        self.result_rev = Some(rev.into());
        self
    }

    /// Returns true if this mutation has no operations.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Applies this mutation to a snapshot.
    ///
    /// When the mutation carries a `result_rev` and the result is present,
    /// the result takes that revision.
    pub fn apply(&self, snapshot: &Snapshot) -> Snapshot {
        let mut result = self
            .operations
            .iter()
            .fold(snapshot.clone(), |current, op| op.apply(current));

        if let (Snapshot::Present(doc), Some(rev)) = (&mut result, &self.result_rev) {
            doc.rev = Some(rev.clone());
        }
        result
    }

    /// Assigns a freshly generated transaction ID, which also becomes the
    /// resulting revision.
    pub fn assign_random_transaction_id(&mut self) {
        let id = uuid::Uuid::new_v4().simple().to_string();
        self.result_rev = Some(id.clone());
        self.transaction_id = Some(id);
    }

    /// Encodes to CBOR bytes.
    pub fn encode(&self) -> MutationResult<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes)
            .map_err(|e| MutationError::encoding_failed(e.to_string()))?;
        Ok(bytes)
    }

    /// Decodes from CBOR bytes.
    pub fn decode(bytes: &[u8]) -> MutationResult<Self> {
        ciborium::from_reader(bytes).map_err(|e| MutationError::decoding_failed(e.to_string()))
    }
}

/// Applies mutations to a snapshot in order.
pub fn apply_all<'a>(
    snapshot: &Snapshot,
    mutations: impl IntoIterator<Item = &'a Mutation>,
) -> Snapshot {
    mutations
        .into_iter()
        .fold(snapshot.clone(), |current, mutation| mutation.apply(&current))
}

/// Combines mutations into one equivalent mutation based on `snapshot`.
///
/// Operations keep their order. Consecutive patches on the same document are
/// merged into one patch. The result records the snapshot's revision as its
/// base and carries no transaction ID.
pub fn squash<'a>(
    snapshot: &Snapshot,
    mutations: impl IntoIterator<Item = &'a Mutation>,
) -> Mutation {
    let mut operations: Vec<Operation> = Vec::new();

    for op in mutations.into_iter().flat_map(|m| m.operations.iter()) {
        if let (
            Some(Operation::Patch {
                id: last_id,
                ops: last_ops,
            }),
            Operation::Patch { id, ops },
        ) = (operations.last_mut(), op)
        {
            if last_id == id {
                last_ops.extend(ops.iter().cloned());
                continue;
            }
        }
        operations.push(op.clone());
    }

    Mutation {
        transaction_id: None,
        previous_rev: snapshot.rev().map(str::to_string),
        result_rev: None,
        operations,
    }
}
