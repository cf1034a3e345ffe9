//! Shared state of the HTTP surface.

use auth_broker::{random_token, AuthBroker, Session};
use axum::http::header::{AUTHORIZATION, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use chrono::Duration;
use ephemeral_store::{StoreError, SystemClock, TtlStore};
use hivebuzz_config_and_utils::Config;
use std::sync::Arc;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "hivebuzz_session";

pub type SharedState = Arc<AppState>;

/// Pending handover of a pairing session to the browser that started it.
pub struct Handoff {
    /// Returned only to the starting browser; the uuid itself is public.
    secret: String,
    session: Option<Session>,
}

pub struct AppState {
    pub broker: Arc<AuthBroker>,
    /// Sessions from approved pairings, held until the browser polls for them.
    pub handoffs: TtlStore<Handoff>,
    pub handoff_ttl: Duration,
    pub app_url: String,
    pub secure_cookies: bool,
}

impl AppState {
    pub fn new(broker: Arc<AuthBroker>, config: &Config) -> Self {
        Self {
            broker,
            handoffs: TtlStore::new(Arc::new(SystemClock), config.ttl.max_pending),
            handoff_ttl: Duration::seconds(config.ttl.pairing_secs.min(u32::MAX as u64) as i64),
            app_url: config.app_url.trim_end_matches('/').to_string(),
            secure_cookies: config.secure_cookies(),
        }
    }

    /// Open a handoff slot for pairing `uuid` and return its secret.
    pub fn begin_handoff(&self, uuid: &str, lifetime: Duration) -> Result<String, StoreError> {
        let secret = random_token(32);
        self.handoffs.insert(
            uuid,
            Handoff {
                secret: secret.clone(),
                session: None,
            },
            lifetime,
        )?;
        Ok(secret)
    }

    /// Park the approved session until the browser collects it.
    pub fn fill_handoff(&self, uuid: &str, session: Session) -> Result<(), StoreError> {
        let Some(mut handoff) = self.handoffs.remove(uuid) else {
            return Ok(());
        };
        handoff.session = Some(session);
        self.handoffs.insert(uuid, handoff, self.handoff_ttl)?;
        Ok(())
    }

    /// Take the parked session, once, if `secret` matches.
    pub fn take_handoff(&self, uuid: &str, secret: &str) -> Option<Session> {
        let session = self
            .handoffs
            .update(uuid, |h| {
                if h.secret == secret {
                    h.session.take()
                } else {
                    None
                }
            })
            .flatten()?;
        self.handoffs.remove(uuid);
        Some(session)
    }

    /// Absolute URL of a local path in the application.
    pub fn app_link(&self, path: &str) -> String {
        format!("{}{}", self.app_url, path)
    }

    /// `Set-Cookie` header carrying `session`.
    pub fn session_cookie(&self, session: &Session) -> HeaderMap {
        let max_age = (session.expires_at - session.issued_at).num_seconds().max(0);
        self.cookie_header(format!(
            "{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}",
            session.token
        ))
    }

    /// `Set-Cookie` header deleting the session cookie.
    pub fn cleared_cookie(&self) -> HeaderMap {
        self.cookie_header(format!(
            "{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"
        ))
    }

    fn cookie_header(&self, mut cookie: String) -> HeaderMap {
        if self.secure_cookies {
            cookie.push_str("; Secure");
        }
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            headers.insert(SET_COOKIE, value);
        }
        headers
    }
}

/// Session token from `Authorization: Bearer` or the session cookie.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    if bearer.is_some() {
        return bearer;
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}
