//! HiveSigner redirect login.
//!
//! `build_auth_url` records a single-use `state` and returns the provider URL
//! to redirect to; `handle_callback` consumes that state before anything else
//! happens, then trades the authorization code for the account name.

use crate::challenge::{random_token, redact};
use crate::{AuthError, AuthMethod, AuthResult, Identity};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use ephemeral_store::{Clock, Consumable, ConsumeError, TtlStore};
use hivebuzz_config_and_utils::HiveSignerConfig;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Default lifetime of an OAuth state.
pub const DEFAULT_STATE_TTL_SECS: i64 = 600;

/// Accept `next` only when it is a path on this site.
pub fn safe_return_path(next: &str) -> Option<String> {
    let next = next.trim();
    let local = next.starts_with('/')
        && !next.starts_with("//")
        && !next.contains('\\')
        && !next.chars().any(char::is_control);
    local.then(|| next.to_string())
}

/// Pending redirect login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthState {
    pub token: String,
    pub username_hint: Option<String>,
    /// Local path to land on after login.
    pub return_to: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
}

impl Consumable for OAuthState {
    fn is_consumed(&self) -> bool {
        self.consumed
    }

    fn mark_consumed(&mut self) {
        self.consumed = true;
    }
}

/// Where to send the browser, and the state it will bring back.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
}

/// A completed redirect login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthLogin {
    pub identity: Identity,
    pub return_to: Option<String>,
}

/// What the token endpoint told us.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenGrant {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MeResponse {
    user: String,
}

/// The remote half of the code exchange.
#[async_trait]
pub trait AuthorizationServer: Send + Sync {
    /// Trade an authorization code for a grant. Any non-2xx answer is
    /// `TokenExchangeFailed`.
    async fn exchange_code(&self, code: &str) -> AuthResult<TokenGrant>;

    /// Resolve the account behind an access token.
    async fn fetch_username(&self, access_token: &str) -> AuthResult<String>;
}

/// reqwest-backed HiveSigner endpoints.
pub struct HiveSignerClient {
    http: reqwest::Client,
    config: HiveSignerConfig,
}

impl HiveSignerClient {
    pub fn new(config: HiveSignerConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(http: reqwest::Client, config: HiveSignerConfig) -> Self {
        Self { http, config }
    }

    fn token_form<'a>(&'a self, code: &'a str) -> Vec<(&'static str, &'a str)> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];
        if let Some(secret) = self.config.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }
        form
    }
}

#[async_trait]
impl AuthorizationServer for HiveSignerClient {
    async fn exchange_code(&self, code: &str) -> AuthResult<TokenGrant> {
        let response = self
            .http
            .post(&self.config.token_url)
            .form(&self.token_form(code))
            .send()
            .await
            .map_err(|e| AuthError::TokenExchangeFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::TokenExchangeFailed(format!(
                "token endpoint returned {}",
                status
            )));
        }

        response
            .json::<TokenGrant>()
            .await
            .map_err(|e| AuthError::TokenExchangeFailed(format!("unreadable token response: {e}")))
    }

    async fn fetch_username(&self, access_token: &str) -> AuthResult<String> {
        let response = self
            .http
            .get(&self.config.me_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::TokenExchangeFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::TokenExchangeFailed(format!(
                "profile endpoint returned {}",
                status
            )));
        }

        let me: MeResponse = response
            .json()
            .await
            .map_err(|e| AuthError::TokenExchangeFailed(format!("unreadable profile: {e}")))?;
        Ok(me.user)
    }
}

/// Drives the redirect method.
pub struct OAuthBroker {
    states: TtlStore<OAuthState>,
    server: Arc<dyn AuthorizationServer>,
    authorize_url: Url,
    client_id: String,
    redirect_uri: String,
    scope: String,
    ttl: Duration,
}

impl OAuthBroker {
    pub fn new(
        config: &HiveSignerConfig,
        server: Arc<dyn AuthorizationServer>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
        max_pending: usize,
    ) -> AuthResult<Self> {
        Ok(Self {
            states: TtlStore::new(clock, max_pending),
            server,
            authorize_url: Url::parse(&config.authorize_url)?,
            client_id: config.client_id.clone(),
            redirect_uri: config.redirect_uri.clone(),
            scope: config.scope.clone(),
            ttl,
        })
    }

    /// Issue a state and build the provider URL.
    pub fn build_auth_url(&self, username_hint: Option<&str>) -> AuthResult<AuthorizationRequest> {
        self.start(username_hint, None)
    }

    /// Like [`build_auth_url`](Self::build_auth_url), remembering a local
    /// path to return to after login. Non-local paths are dropped.
    pub fn start(
        &self,
        username_hint: Option<&str>,
        return_to: Option<&str>,
    ) -> AuthResult<AuthorizationRequest> {
        self.start_with_state(random_token(32), username_hint, return_to)
    }

    pub(crate) fn start_with_state(
        &self,
        token: String,
        username_hint: Option<&str>,
        return_to: Option<&str>,
    ) -> AuthResult<AuthorizationRequest> {
        let issued_at = self.states.now();
        let state = OAuthState {
            token: token.clone(),
            username_hint: username_hint
                .map(|h| h.trim().trim_start_matches('@').to_ascii_lowercase())
                .filter(|h| !h.is_empty()),
            return_to: return_to.and_then(safe_return_path),
            issued_at,
            expires_at: issued_at + self.ttl,
            consumed: false,
        };
        self.states.insert(token.clone(), state, self.ttl)?;

        let mut url = self.authorize_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.scope)
            .append_pair("state", &token);

        debug!(hint = ?username_hint, "Issued OAuth state");
        Ok(AuthorizationRequest {
            url: url.into(),
            state: token,
        })
    }

    /// Consume `returned_state`, then exchange `code`.
    ///
    /// An unknown, expired or reused state is `StateMismatch` whatever the
    /// code, and the token endpoint is never contacted in that case.
    pub async fn handle_callback(&self, code: &str, returned_state: &str) -> AuthResult<OAuthLogin> {
        let state = match self.states.consume(returned_state) {
            Ok(state) => state,
            Err(reason) => {
                warn!(
                    state = %redact(returned_state),
                    reason = match reason {
                        ConsumeError::NotFound => "unknown_or_expired",
                        ConsumeError::AlreadyConsumed => "replayed",
                    },
                    "OAuth state mismatch"
                );
                return Err(AuthError::StateMismatch);
            }
        };

        let grant = self.server.exchange_code(code).await?;

        let username = match (grant.username, grant.access_token) {
            (Some(username), _) if !username.trim().is_empty() => username,
            (_, Some(token)) => {
                debug!("Token response lacks username, asking profile endpoint");
                self.server.fetch_username(&token).await?
            }
            _ => {
                return Err(AuthError::TokenExchangeFailed(
                    "token response carried neither username nor access_token".to_string(),
                ))
            }
        };

        let username = hive_keys::normalize_username(&username)
            .map_err(|e| AuthError::TokenExchangeFailed(e.to_string()))?;

        if let Some(hint) = state.username_hint.as_deref() {
            if hint != username {
                info!(hint = %hint, username = %username, "Logged in as a different account than hinted");
            }
        }

        info!(username = %username, method = %AuthMethod::OAuth, "OAuth login verified");
        Ok(OAuthLogin {
            identity: Identity::new(username, AuthMethod::OAuth),
            return_to: state.return_to,
        })
    }

    /// Drop expired states.
    pub fn sweep(&self) -> usize {
        self.states.sweep()
    }
}
