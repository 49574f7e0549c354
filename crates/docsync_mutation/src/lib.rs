//! # docsync Mutation
//!
//! Document snapshots and the mutation algebra used by the docsync engine.
//!
//! This crate provides:
//! - `Snapshot`, an explicit present/deleted view of one document
//! - `Operation` and `PatchOp` for document-level and field-level changes
//! - `Mutation`, a transaction-sized group of operations
//! - `apply_all` and `squash` over sequences of mutations
//! - CBOR encoding of mutations for transmission
//!
//! This is a pure crate with no I/O operations.
//!
//! ## Usage
//!
//! ```
//! use docsync_mutation::{FieldPath, Mutation, Operation, PatchOp, Snapshot};
//! use serde_json::json;
//!
//! let snapshot = Snapshot::present("counter", json!({ "count": 0 }));
//! let mutation = Mutation::single(Operation::patch(
//!     "counter",
//!     PatchOp::Inc {
//!         path: FieldPath::parse("count").unwrap(),
//!         by: 1.into(),
//!     },
//! ));
//!
//! let result = mutation.apply(&snapshot);
//! assert_eq!(result.get("count"), Some(&json!(1)));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod mutation;
mod operation;
mod path;
mod snapshot;

pub use error::{MutationError, MutationResult};
pub use mutation::{apply_all, squash, Mutation};
pub use operation::{Operation, PatchOp};
pub use path::FieldPath;
pub use snapshot::{DocumentState, Snapshot};
