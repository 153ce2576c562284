//! Error types for wormhole-dag.

use thiserror::Error;

use crate::ContentId;

/// Result type for DAG and blockstore operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while encoding, decoding or storing blocks.
#[derive(Debug, Error)]
pub enum Error {
    /// Text did not parse as a content ID.
    #[error("invalid content id {input:?}: {reason}")]
    InvalidContentId { input: String, reason: &'static str },

    /// Node encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// Block bytes do not hash to the content ID they were stored under.
    #[error("block hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: ContentId, actual: ContentId },

    /// Block is not present in the store.
    #[error("block not found: {0}")]
    NotFound(ContentId),

    /// Builder was configured with unusable parameters.
    #[error("invalid builder configuration: {0}")]
    InvalidBuilder(&'static str),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
