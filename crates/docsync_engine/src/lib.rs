//! # docsync Engine
//!
//! Client-side optimistic replication for a single document.
//!
//! This crate provides:
//! - `BufferedDocument`, which applies local mutations immediately and
//!   keeps them in a buffer until committed
//! - A single-flight committer that transmits one squashed commit at a time
//!   and retries failures after a fixed delay
//! - Rebase of local work whenever the authoritative snapshot moves
//! - The `AuthoritativeTracker` seam and an in-memory `Document` tracker
//! - A scripted `MockCommitHandler` for tests
//!
//! ## Architecture
//!
//! The optimistic snapshot is always derived from three inputs:
//! 1. The authoritative snapshot reported by the tracker
//! 2. The queue of commits not yet handed to the remote
//! 3. The buffer of mutations not yet committed
//!
//! Local edits only ever touch the buffer. Remote mutations only ever touch
//! the tracker. Everything else is a rebase.
//!
//! ## Key Invariants
//!
//! - At most one commit is in flight per document
//! - Commits reach the remote in the order they were created
//! - A commit is never applied twice to the optimistic snapshot
//! - Remote deletion discards local work and is reported exactly once

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod buffered;
mod commit;
mod committer;
mod config;
mod document;
mod error;
mod events;
mod tracker;
mod transport;

pub use buffered::{BufferedDocument, EngineStats};
pub use commit::Commit;
pub use config::{EngineConfig, RetryConfig, DEFAULT_RETRY_DELAY};
pub use document::Document;
pub use error::{CommitError, EngineError, EngineResult};
pub use events::{DeleteListener, MutationEvent, MutationListener, RebaseListener};
pub use tracker::{AuthoritativeTracker, Responder, StageOutcome, TrackerEvent};
pub use transport::{CommitFuture, CommitHandler, MockCommitHandler};
