//! Rotation error types.

use thiserror::Error;

/// Result type for rotation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Rotation error variants.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or illegal request: unsupported CA type, unsupported
    /// target phase, illegal source-to-target transition, attempt to
    /// rotate the local CA through the external entry point, nil external
    /// input.
    #[error("bad parameter: {0}")]
    BadParameter(String),

    /// The CA record does not exist in the store.
    #[error("certificate authority not found: {0}")]
    NotFound(String),

    /// The store's compare-and-swap precondition failed; another writer
    /// moved the record first.
    #[error("conflicting update: {0}")]
    Conflict(String),

    /// Key generation, clock, or store I/O failure unrelated to the
    /// caller's input.
    #[error("internal error: {0}")]
    Internal(String),
}
