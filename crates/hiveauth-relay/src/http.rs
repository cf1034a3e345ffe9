//! HTTPS side of the relay.

use crate::{RelayError, RelayResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Relay client configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// HTTPS API base (e.g., https://hiveauth.com/api).
    pub api_url: String,
    /// Websocket endpoint (e.g., wss://hive-auth.arcange.eu).
    pub ws_url: String,
    /// Per-request timeout for HTTPS calls.
    pub request_timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            api_url: "https://hiveauth.com/api".to_string(),
            ws_url: "wss://hive-auth.arcange.eu".to_string(),
            request_timeout_secs: 10,
        }
    }
}

/// Body of a pairing registration.
#[derive(Debug, Clone, Serialize)]
pub struct PairingRegistration {
    pub uuid: String,
    pub account: String,
    pub client_id: String,
    /// Base64 X25519 public key of the pairing.
    pub key: String,
    pub challenge: String,
}

/// Relay answer to a registration.
#[derive(Debug, Clone, Deserialize)]
pub struct PairingMetadata {
    /// Short code the user compares between browser and wallet.
    pub pairing_code: String,
    /// Relay-side lifetime in seconds, if it reports one.
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

/// Result of a status poll.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusReport {
    #[serde(default)]
    pub authenticated: bool,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub rejected: bool,
}

/// HTTPS operations against the relay.
#[async_trait]
pub trait RelayApi: Send + Sync {
    /// Register a pairing and obtain its metadata.
    async fn register_pairing(&self, registration: &PairingRegistration) -> RelayResult<PairingMetadata>;

    /// Obtain the opaque token used to poll the status of `uuid`.
    async fn request_token(&self, uuid: &str) -> RelayResult<String>;

    /// Poll the status of `uuid`.
    async fn check_status(&self, uuid: &str, token: &str) -> RelayResult<StatusReport>;
}

/// reqwest-backed [`RelayApi`].
pub struct RelayHttpClient {
    http: reqwest::Client,
    config: RelayConfig,
}

impl RelayHttpClient {
    pub fn new(config: RelayConfig) -> RelayResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl RelayApi for RelayHttpClient {
    async fn register_pairing(&self, registration: &PairingRegistration) -> RelayResult<PairingMetadata> {
        debug!(uuid = %registration.uuid, account = %registration.account, "Registering pairing");

        let metadata: PairingMetadata = self
            .http
            .post(self.endpoint("auth_req"))
            .json(registration)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if metadata.pairing_code.is_empty() {
            return Err(RelayError::Protocol("empty pairing code".to_string()));
        }
        Ok(metadata)
    }

    async fn request_token(&self, uuid: &str) -> RelayResult<String> {
        debug!(uuid = %uuid, "Requesting poll token");

        let response: TokenResponse = self
            .http
            .post(self.endpoint("token"))
            .json(&serde_json::json!({ "uuid": uuid }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.token.is_empty() {
            return Err(RelayError::Protocol("empty poll token".to_string()));
        }
        Ok(response.token)
    }

    async fn check_status(&self, uuid: &str, token: &str) -> RelayResult<StatusReport> {
        let report = self
            .http
            .get(self.endpoint("auth_json"))
            .query(&[("uuid", uuid), ("token", token)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(report)
    }
}
