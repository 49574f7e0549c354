//! Error types for the engine.

use docsync_mutation::MutationError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced synchronously to the caller.
///
/// Commit failures never appear here; they are retried by the committer.
#[derive(Error, Debug)]
pub enum EngineError {
    /// No commit handler was configured before committing.
    #[error("no commit handler configured")]
    MissingCommitHandler,

    /// The committer was started outside a tokio runtime.
    #[error("committer requires a tokio runtime")]
    NoRuntime,

    /// A mutation could not be built or encoded.
    #[error("mutation error: {0}")]
    Mutation(#[from] MutationError),
}

/// Failure reported by a commit handler for one attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("commit failed: {message}")]
pub struct CommitError {
    /// Error message.
    pub message: String,
    /// Whether the transport believes a retry can succeed.
    pub retryable: bool,
}

impl CommitError {
    /// Creates a failure that may succeed on retry.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a failure that will not succeed on retry.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this failure can be retried.
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }
}
