//! # docsync Testkit
//!
//! Test utilities for docsync.
//!
//! This crate provides:
//! - Snapshot and mutation fixtures
//! - Property-based test generators using proptest
//! - `LoopbackRemote`, an in-process remote authority
//! - Tracing setup for tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docsync_engine::EngineConfig;
//! use docsync_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn test_round_trip() {
//!     let remote = LoopbackRemote::new(counter("doc1", 0));
//!     let (doc, mut subscription) = remote.client(EngineConfig::default());
//!     doc.add(inc("doc1", "count", 1));
//!     doc.commit().unwrap();
//!     doc.idle().await;
//!     subscription.deliver(&doc);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod remote;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::remote::*;
}

pub use fixtures::*;
pub use generators::*;
pub use remote::*;
