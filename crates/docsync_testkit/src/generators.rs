//! Property-based test generators using proptest.
//!
//! Mutations are drawn over a small fixed set of fields so that generated
//! sequences interfere with each other often.

use docsync_mutation::{FieldPath, Mutation, Operation, PatchOp};
use proptest::prelude::*;
use serde_json::{json, Value};

/// Fields touched by generated mutations.
pub const FIELDS: [&str; 4] = ["count", "title", "meta.tag", "meta.score"];

/// Strategy for picking one of [`FIELDS`].
pub fn field_path_strategy() -> impl Strategy<Value = FieldPath> {
    prop::sample::select(FIELDS.to_vec())
        .prop_map(|field| FieldPath::parse(field).expect("generator fields are valid"))
}

/// Strategy for small JSON values.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        (-100i64..100).prop_map(|n| json!(n)),
        "[a-z]{0,8}".prop_map(Value::String),
        any::<bool>().prop_map(Value::Bool),
        Just(Value::Null),
    ]
}

/// Strategy for a single field-level operation.
pub fn patch_op_strategy() -> impl Strategy<Value = PatchOp> {
    prop_oneof![
        (field_path_strategy(), value_strategy())
            .prop_map(|(path, value)| PatchOp::Set { path, value }),
        (field_path_strategy(), value_strategy())
            .prop_map(|(path, value)| PatchOp::SetIfMissing { path, value }),
        field_path_strategy().prop_map(|path| PatchOp::Unset { path }),
        (field_path_strategy(), -10i64..10).prop_map(|(path, by)| PatchOp::Inc {
            path,
            by: by.into(),
        }),
        (field_path_strategy(), -10i64..10).prop_map(|(path, by)| PatchOp::Dec {
            path,
            by: by.into(),
        }),
    ]
}

/// Strategy for a patch mutation against document `id`.
pub fn patch_mutation_strategy(id: &'static str) -> impl Strategy<Value = Mutation> {
    prop::collection::vec(patch_op_strategy(), 1..4)
        .prop_map(move |ops| Mutation::single(Operation::Patch { id: id.to_string(), ops }))
}

/// Strategy for a sequence of patch mutations against document `id`.
pub fn mutation_sequence_strategy(
    id: &'static str,
    max_len: usize,
) -> impl Strategy<Value = Vec<Mutation>> {
    prop::collection::vec(patch_mutation_strategy(id), 0..=max_len)
}

/// Strategy for a sequence split into commit-sized groups.
pub fn commit_groups_strategy(
    id: &'static str,
    max_groups: usize,
) -> impl Strategy<Value = Vec<Vec<Mutation>>> {
    prop::collection::vec(mutation_sequence_strategy(id, 4), 0..=max_groups)
}
