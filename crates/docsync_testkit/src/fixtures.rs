//! Snapshot and mutation fixtures.
//!
//! Provides short constructors for the documents and mutations used
//! throughout the engine tests.

use docsync_mutation::{DocumentState, FieldPath, Mutation, Operation, PatchOp, Snapshot};
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;

/// Revision given to fixture snapshots.
pub const INITIAL_REV: &str = "r0";

/// Installs a test subscriber that honors `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Creates a present snapshot with the given body at [`INITIAL_REV`].
pub fn document(id: &str, body: Value) -> Snapshot {
    DocumentState::from_json(id, body)
        .with_rev(INITIAL_REV)
        .into()
}

/// Creates a counter document `{ "count": count }`.
pub fn counter(id: &str, count: i64) -> Snapshot {
    document(id, serde_json::json!({ "count": count }))
}

fn path(field: &str) -> FieldPath {
    FieldPath::parse(field).expect("fixture paths are valid")
}

/// A mutation that sets `field` to `value`.
pub fn set(id: &str, field: &str, value: Value) -> Mutation {
    Mutation::single(Operation::patch(
        id,
        PatchOp::Set {
            path: path(field),
            value,
        },
    ))
}

/// A mutation that increments `field` by `by`.
pub fn inc(id: &str, field: &str, by: i64) -> Mutation {
    Mutation::single(Operation::patch(
        id,
        PatchOp::Inc {
            path: path(field),
            by: by.into(),
        },
    ))
}

/// A mutation that removes `field`.
pub fn unset(id: &str, field: &str) -> Mutation {
    Mutation::single(Operation::patch(id, PatchOp::Unset { path: path(field) }))
}

/// A mutation that deletes the document.
pub fn delete(id: &str) -> Mutation {
    Mutation::single(Operation::Delete { id: id.to_string() })
}

/// Returns the integer at `field`, if any.
pub fn int_at(snapshot: &Snapshot, field: &str) -> Option<i64> {
    snapshot.get(field).and_then(Value::as_i64)
}

/// Returns the document fields, ignoring the revision marker.
pub fn body(snapshot: &Snapshot) -> Option<&Map<String, Value>> {
    snapshot.document().map(|doc| &doc.body)
}
