//! Authentication error types.

use thiserror::Error;

/// Authentication error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Challenge never issued, or past its expiry
    #[error("Challenge is invalid or expired")]
    ChallengeInvalid,

    /// Challenge or state already used once
    #[error("Challenge has already been used")]
    AlreadyConsumed,

    /// Signature does not match any posting key of the account
    #[error("Signature verification failed: {0}")]
    SignatureInvalid(String),

    /// Username does not resolve to an on-chain account
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Returned OAuth state is unknown, expired or already used
    #[error("OAuth state mismatch")]
    StateMismatch,

    /// Token endpoint refused the authorization code
    #[error("Token exchange failed: {0}")]
    TokenExchangeFailed(String),

    /// Relay could not be reached on any path
    #[error("HiveAuth relay unavailable: {0}")]
    RelayUnavailable(String),

    /// Wallet rejected the pairing
    #[error("Pairing rejected by wallet")]
    PairingRejected,

    /// No answer before the pairing deadline
    #[error("Pairing timed out")]
    PairingTimeout,

    /// Pairing uuid not known to this broker
    #[error("Unknown pairing: {0}")]
    UnknownPairing(String),

    /// Session token malformed, expired, forged or revoked
    #[error("Session invalid: {0}")]
    SessionInvalid(String),

    /// Ephemeral store at capacity
    #[error("Too many pending logins")]
    Capacity,

    /// Invalid state transition in the pairing FSM
    #[error("Invalid pairing state transition: {0}")]
    InvalidStateTransition(String),

    /// Account lookup failed for reasons other than a missing account
    #[error("Account lookup failed: {0}")]
    AccountLookup(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl AuthError {
    /// Returns true if this error is transient and a fresh attempt may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::RelayUnavailable(_) | AuthError::Capacity => true,
            AuthError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                if let Some(status) = e.status() {
                    return status.is_server_error();
                }
                false
            }
            _ => false,
        }
    }

    /// Stable snake_case code for logs and JSON bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::ChallengeInvalid => "challenge_invalid",
            AuthError::AlreadyConsumed => "already_consumed",
            AuthError::SignatureInvalid(_) => "signature_invalid",
            AuthError::AccountNotFound(_) => "account_not_found",
            AuthError::StateMismatch => "state_mismatch",
            AuthError::TokenExchangeFailed(_) => "token_exchange_failed",
            AuthError::RelayUnavailable(_) => "relay_unavailable",
            AuthError::PairingRejected => "pairing_rejected",
            AuthError::PairingTimeout => "pairing_timeout",
            AuthError::UnknownPairing(_) => "unknown_pairing",
            AuthError::SessionInvalid(_) => "session_invalid",
            AuthError::Capacity => "capacity",
            AuthError::InvalidStateTransition(_) => "invalid_state_transition",
            AuthError::AccountLookup(_) => "account_lookup",
            AuthError::Config(_) => "config",
            AuthError::Http(_) => "http",
            AuthError::Json(_) => "json",
            AuthError::InvalidUrl(_) => "invalid_url",
        }
    }

    /// Copy suitable for showing to the person logging in.
    ///
    /// `StateMismatch` deliberately reads like any other failed login.
    pub fn user_message(&self) -> &'static str {
        match self {
            AuthError::ChallengeInvalid => "Your login challenge expired. Please try again.",
            AuthError::AlreadyConsumed => "This login request was already used. Please start again.",
            AuthError::SignatureInvalid(_) => {
                "The signature could not be verified with your posting key."
            }
            AuthError::AccountNotFound(_) => "That Hive account does not exist.",
            AuthError::StateMismatch => "Login failed. Please try again.",
            AuthError::TokenExchangeFailed(_) => "HiveSigner did not confirm your login. Please try again.",
            AuthError::RelayUnavailable(_) => "HiveAuth is unreachable right now. Please try again later.",
            AuthError::PairingRejected => "The login request was rejected in your wallet.",
            AuthError::PairingTimeout => "The login request expired before it was approved.",
            AuthError::UnknownPairing(_) => "That login request is no longer available.",
            AuthError::SessionInvalid(_) => "Your session has ended. Please log in again.",
            AuthError::Capacity => "Too many logins in progress. Please try again shortly.",
            _ => "Login failed. Please try again.",
        }
    }
}

impl From<hive_keys::KeyError> for AuthError {
    fn from(err: hive_keys::KeyError) -> Self {
        use hive_keys::KeyError;
        match err {
            KeyError::AccountNotFound(name) | KeyError::InvalidUsername(name) => {
                AuthError::AccountNotFound(name)
            }
            KeyError::InvalidSignature(msg) | KeyError::InvalidPublicKey(msg) => {
                AuthError::SignatureInvalid(msg)
            }
            KeyError::Http(e) => AuthError::Http(e),
            KeyError::Json(e) => AuthError::Json(e),
            KeyError::Lookup(msg) => AuthError::AccountLookup(msg),
        }
    }
}

impl From<hiveauth_relay::RelayError> for AuthError {
    fn from(err: hiveauth_relay::RelayError) -> Self {
        AuthError::RelayUnavailable(err.to_string())
    }
}

impl From<ephemeral_store::StoreError> for AuthError {
    fn from(_: ephemeral_store::StoreError) -> Self {
        AuthError::Capacity
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;
