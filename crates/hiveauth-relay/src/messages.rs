//! HiveAuth wire messages.

use crate::RelayResult;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

/// Scheme and path a wallet recognizes as a login request.
pub const PAIRING_URI_PREFIX: &str = "has://auth_req/";

/// A message exchanged over the relay websocket, tagged by `cmd`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum HasMessage {
    /// Sent by us to subscribe to a pairing; echoed by the relay with the
    /// relay-side expiry.
    AuthWait {
        uuid: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expire: Option<i64>,
    },
    /// Wallet approved. `data` is a base64 envelope sealed to the pairing key.
    AuthAck { uuid: String, data: String },
    /// Wallet rejected.
    AuthNack {
        uuid: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<String>,
    },
    /// Relay-side failure for this pairing.
    AuthErr {
        uuid: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl HasMessage {
    /// Subscription for `uuid`.
    pub fn subscribe(uuid: &str) -> Self {
        HasMessage::AuthWait {
            uuid: uuid.to_string(),
            expire: None,
        }
    }

    /// The pairing this message belongs to.
    pub fn uuid(&self) -> &str {
        match self {
            HasMessage::AuthWait { uuid, .. }
            | HasMessage::AuthAck { uuid, .. }
            | HasMessage::AuthNack { uuid, .. }
            | HasMessage::AuthErr { uuid, .. } => uuid,
        }
    }

    pub fn to_json(&self) -> RelayResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> RelayResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Plaintext inside an `auth_ack` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckPayload {
    pub username: String,
    pub challenge: String,
}

/// Data a wallet needs to find and answer a pairing, usually shown as a QR code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingPayload {
    pub account: String,
    pub uuid: String,
    /// Base64 X25519 public key the wallet seals its answer to.
    pub key: String,
    /// Relay websocket the wallet should talk to.
    pub host: String,
}

impl PairingPayload {
    /// `has://auth_req/<base64(json)>`
    pub fn to_uri(&self) -> RelayResult<String> {
        let json = serde_json::to_vec(self)?;
        Ok(format!("{}{}", PAIRING_URI_PREFIX, STANDARD.encode(json)))
    }
}
