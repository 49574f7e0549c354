//! Error types for the mutation crate.

use thiserror::Error;

/// Result type for mutation operations.
pub type MutationResult<T> = Result<T, MutationError>;

/// Errors that can occur while building or transmitting mutations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MutationError {
    /// A field path could not be parsed.
    #[error("invalid field path {path:?}: {reason}")]
    InvalidPath {
        /// The offending path text.
        path: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Failed to encode a mutation to its wire form.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode a mutation from its wire form.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },
}

impl MutationError {
    /// Create an invalid path error.
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Create a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }
}
