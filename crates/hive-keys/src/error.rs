//! Key and account error types.

use thiserror::Error;

/// Key handling error type.
#[derive(Error, Debug)]
pub enum KeyError {
    /// Public key string could not be decoded
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Signature is malformed, non-canonical or unrecoverable
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// Username does not follow Hive account naming rules
    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    /// The account does not exist on chain
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// The API node answered with an RPC error or an unexpected shape
    #[error("Account lookup failed: {0}")]
    Lookup(String),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using KeyError.
pub type KeyResult<T> = Result<T, KeyError>;
