//! Error types for storage operations.

use std::io;

use thiserror::Error;

use crate::SpooledMessageId;

/// Failures surfaced by a [`MessageStore`](crate::MessageStore)
/// implementation.
#[derive(Debug, Error)]
pub enum SpoolError {
    /// I/O against the backing medium failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The message is not (or no longer) in the store.
    #[error("message not found: {0}")]
    NotFound(SpooledMessageId),
}

/// Specialized `Result` type for storage operations.
pub type Result<T> = std::result::Result<T, SpoolError>;
