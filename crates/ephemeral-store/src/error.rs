//! Store error types.

use thiserror::Error;

/// Errors raised when writing to a store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store holds its maximum number of live entries.
    #[error("Store is full ({0} live entries)")]
    Full(usize),
}

/// Errors raised by single-use consumption.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeError {
    /// Never issued, or past its expiry.
    #[error("Record not found or expired")]
    NotFound,

    /// Issued and still live, but already used once.
    #[error("Record already consumed")]
    AlreadyConsumed,
}
