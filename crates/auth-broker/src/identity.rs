//! Verified identities.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a user proved control of their account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Hive Keychain signed a broker challenge in the browser.
    LocalSignature,
    /// HiveSigner redirect with authorization code.
    #[serde(rename = "oauth")]
    OAuth,
    /// HiveAuth mobile wallet approved a pairing.
    Pairing,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::LocalSignature => "local_signature",
            AuthMethod::OAuth => "oauth",
            AuthMethod::Pairing => "pairing",
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A username proven by one of the login methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    pub method: AuthMethod,
}

impl Identity {
    pub fn new(username: impl Into<String>, method: AuthMethod) -> Self {
        Self {
            username: username.into(),
            method,
        }
    }
}
