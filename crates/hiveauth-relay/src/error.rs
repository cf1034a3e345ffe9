//! Relay error types.

use thiserror::Error;

/// Relay error type.
#[derive(Error, Debug)]
pub enum RelayError {
    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// HTTP request error (includes non-2xx responses)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The relay answered with something we cannot interpret
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The relay closed the channel
    #[error("Relay channel closed")]
    Closed,

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RelayError {
    /// Whether the relay itself was unreachable or failing, as opposed to
    /// answering with something malformed.
    pub fn is_unavailable(&self) -> bool {
        match self {
            RelayError::WebSocket(_) | RelayError::Closed => true,
            RelayError::Http(e) => {
                e.is_connect()
                    || e.is_timeout()
                    || e.status().map(|s| s.is_server_error()).unwrap_or(false)
            }
            _ => false,
        }
    }
}

/// Result type alias using RelayError.
pub type RelayResult<T> = Result<T, RelayError>;
