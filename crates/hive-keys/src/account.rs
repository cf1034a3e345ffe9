//! Account lookup against a Hive API node.

use crate::{HivePublicKey, KeyError, KeyResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

/// Normalize a user-supplied account name.
///
/// Trims whitespace, drops a leading `@` and lowercases, then checks Hive's
/// naming rules: 3 to 16 characters, dot-separated segments of at least
/// three characters that start with a letter, end with a letter or digit and
/// otherwise contain only letters, digits and dashes.
pub fn normalize_username(raw: &str) -> KeyResult<String> {
    let name = raw.trim().trim_start_matches('@').to_ascii_lowercase();

    if !(3..=16).contains(&name.len()) {
        return Err(KeyError::InvalidUsername(format!(
            "'{name}' must be 3 to 16 characters"
        )));
    }

    for segment in name.split('.') {
        let bytes = segment.as_bytes();
        let valid = bytes.len() >= 3
            && bytes[0].is_ascii_lowercase()
            && bytes[bytes.len() - 1].is_ascii_alphanumeric()
            && bytes
                .iter()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-');
        if !valid {
            return Err(KeyError::InvalidUsername(format!(
                "'{name}' is not a valid Hive account name"
            )));
        }
    }

    Ok(name)
}

/// Source of on-chain posting authorities.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Public keys currently holding posting authority for `username`.
    ///
    /// Returns `KeyError::AccountNotFound` when the account does not exist.
    async fn posting_keys(&self, username: &str) -> KeyResult<Vec<HivePublicKey>>;
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Vec<AccountRecord>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct AccountRecord {
    posting: Authority,
}

#[derive(Debug, Deserialize)]
struct Authority {
    /// `[[key, weight], ...]`
    key_auths: Vec<(String, u32)>,
}

/// JSON-RPC client for `condenser_api.get_accounts`.
pub struct HiveApiClient {
    http: reqwest::Client,
    api_url: String,
}

impl HiveApiClient {
    /// Create a client against the given API node.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.into(),
        }
    }

    /// Create a client sharing an existing HTTP connection pool.
    pub fn with_client(http: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            http,
            api_url: api_url.into(),
        }
    }
}

#[async_trait]
impl AccountDirectory for HiveApiClient {
    async fn posting_keys(&self, username: &str) -> KeyResult<Vec<HivePublicKey>> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": "condenser_api.get_accounts",
            "params": [[username]],
            "id": 1,
        });

        debug!(username = %username, api = %self.api_url, "Fetching posting authority");

        let response: RpcResponse = self
            .http
            .post(&self.api_url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        parse_posting_keys(username, response)
    }
}

fn parse_posting_keys(username: &str, response: RpcResponse) -> KeyResult<Vec<HivePublicKey>> {
    if let Some(error) = response.error {
        return Err(KeyError::Lookup(error.to_string()));
    }

    let account = response
        .result
        .and_then(|accounts| accounts.into_iter().next())
        .ok_or_else(|| KeyError::AccountNotFound(username.to_string()))?;

    let keys = account
        .posting
        .key_auths
        .into_iter()
        .filter_map(|(encoded, _weight)| match HivePublicKey::parse(&encoded) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(username = %username, error = %e, "Skipping undecodable posting key");
                None
            }
        })
        .collect();

    Ok(keys)
}
