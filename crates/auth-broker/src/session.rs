//! Application sessions.
//!
//! A session token is `base64url(claims_json) "." base64url(hmac_sha256)`.
//! Tokens are self-contained; the only server-side state is the set of
//! revoked session ids, kept until the token would have expired anyway.

use crate::challenge::random_token;
use crate::{AuthError, AuthMethod, AuthResult, Identity};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use ephemeral_store::{Clock, TtlStore};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use tracing::{debug, info};

type HmacSha256 = Hmac<Sha256>;

/// Default session lifetime.
pub const DEFAULT_SESSION_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// Claims carried inside a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Session id.
    pub sid: String,
    pub username: String,
    pub method: AuthMethod,
    /// Issued at, unix seconds.
    pub iat: i64,
    /// Expires at, unix seconds.
    pub exp: i64,
}

impl SessionClaims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_default()
    }
}

/// The uniform result of every login method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub username: String,
    pub method: AuthMethod,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub token: String,
}

/// Mints and checks session tokens.
pub struct SessionIssuer {
    key: Vec<u8>,
    lifetime: Duration,
    clock: Arc<dyn Clock>,
    revoked: TtlStore<()>,
}

impl SessionIssuer {
    pub fn new(
        key: impl Into<Vec<u8>>,
        lifetime: Duration,
        clock: Arc<dyn Clock>,
        max_revoked: usize,
    ) -> AuthResult<Self> {
        let key = key.into();
        if key.len() < 16 {
            return Err(AuthError::Config(
                "session secret must be at least 16 bytes".to_string(),
            ));
        }
        Ok(Self {
            key,
            lifetime,
            revoked: TtlStore::new(clock.clone(), max_revoked),
            clock,
        })
    }

    /// Session lifetime.
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    fn mac(&self) -> AuthResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.key)
            .map_err(|e| AuthError::Config(format!("session secret: {e}")))
    }

    /// Stamp a session for `identity`.
    pub fn issue(&self, identity: &Identity) -> AuthResult<Session> {
        let now = self.clock.now();
        // Claims carry whole seconds; keep the returned session consistent.
        let issued_at = DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now);
        let expires_at = issued_at
            .checked_add_signed(self.lifetime)
            .ok_or_else(|| AuthError::Config("session lifetime out of range".to_string()))?;
        let claims = SessionClaims {
            sid: random_token(16),
            username: identity.username.clone(),
            method: identity.method,
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let tag = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        info!(username = %claims.username, method = %claims.method, "Session issued");
        Ok(Session {
            username: claims.username,
            method: claims.method,
            issued_at,
            expires_at,
            token: format!("{payload}.{tag}"),
        })
    }

    /// Verify a token's signature, expiry and revocation status.
    pub fn validate(&self, token: &str) -> AuthResult<SessionClaims> {
        let (payload, tag) = token
            .split_once('.')
            .ok_or_else(|| AuthError::SessionInvalid("malformed token".to_string()))?;

        let tag = URL_SAFE_NO_PAD
            .decode(tag)
            .map_err(|_| AuthError::SessionInvalid("malformed signature".to_string()))?;
        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&tag)
            .map_err(|_| AuthError::SessionInvalid("bad signature".to_string()))?;

        let claims: SessionClaims = URL_SAFE_NO_PAD
            .decode(payload)
            .ok()
            .and_then(|json| serde_json::from_slice(&json).ok())
            .ok_or_else(|| AuthError::SessionInvalid("malformed claims".to_string()))?;

        if self.clock.now().timestamp() >= claims.exp {
            return Err(AuthError::SessionInvalid("expired".to_string()));
        }
        if self.revoked.contains(&claims.sid) {
            return Err(AuthError::SessionInvalid("revoked".to_string()));
        }

        Ok(claims)
    }

    /// Revoke a valid token until its natural expiry.
    pub fn revoke(&self, token: &str) -> AuthResult<SessionClaims> {
        let claims = self.validate(token)?;
        let remaining = claims.expires_at() - self.clock.now();
        self.revoked.insert(claims.sid.clone(), (), remaining)?;
        debug!(username = %claims.username, "Session revoked");
        Ok(claims)
    }

    /// Drop revocations whose tokens have expired.
    pub fn sweep(&self) -> usize {
        self.revoked.sweep()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ephemeral_store::ManualClock;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn issuer(clock: Arc<ManualClock>) -> SessionIssuer {
        SessionIssuer::new(SECRET, Duration::seconds(DEFAULT_SESSION_TTL_SECS), clock, 100).unwrap()
    }

    #[test]
    fn test_issue_then_validate() {
        let clock = Arc::new(ManualClock::default());
        let sessions = issuer(clock);
        let session = sessions
            .issue(&Identity::new("alice", AuthMethod::LocalSignature))
            .unwrap();

        assert_eq!(session.expires_at - session.issued_at, Duration::days(7));
        let claims = sessions.validate(&session.token).unwrap();
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.method, AuthMethod::LocalSignature);
        assert_eq!(claims.expires_at(), session.expires_at);
    }

    #[test]
    fn test_distinct_tokens_per_issue() {
        let sessions = issuer(Arc::new(ManualClock::default()));
        let identity = Identity::new("bob", AuthMethod::OAuth);
        let a = sessions.issue(&identity).unwrap();
        let b = sessions.issue(&identity).unwrap();
        assert_ne!(a.token, b.token);
    }

    #[test]
    fn test_expired_session_rejected() {
        let clock = Arc::new(ManualClock::default());
        let sessions = issuer(clock.clone());
        let session = sessions.issue(&Identity::new("alice", AuthMethod::Pairing)).unwrap();

        clock.advance(Duration::days(7));
        let err = sessions.validate(&session.token).unwrap_err();
        assert_eq!(err.to_string(), "Session invalid: expired");
    }

    #[test]
    fn test_tampered_claims_rejected() {
        let sessions = issuer(Arc::new(ManualClock::default()));
        let session = sessions.issue(&Identity::new("alice", AuthMethod::OAuth)).unwrap();
        let (_, tag) = session.token.split_once('.').unwrap();

        let forged_claims = SessionClaims {
            sid: "x".to_string(),
            username: "mallory".to_string(),
            method: AuthMethod::OAuth,
            iat: 0,
            exp: i64::MAX,
        };
        let forged = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged_claims).unwrap()),
            tag
        );
        let err = sessions.validate(&forged).unwrap_err();
        assert_eq!(err.to_string(), "Session invalid: bad signature");
    }

    #[test]
    fn test_other_key_rejected() {
        let clock = Arc::new(ManualClock::default());
        let sessions = issuer(clock.clone());
        let other = SessionIssuer::new(
            b"another-secret-of-enough-length".to_vec(),
            Duration::days(7),
            clock,
            10,
        )
        .unwrap();

        let session = other.issue(&Identity::new("alice", AuthMethod::OAuth)).unwrap();
        assert!(sessions.validate(&session.token).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        let sessions = issuer(Arc::new(ManualClock::default()));
        for token in ["", "abc", "abc.def", "..."] {
            assert!(matches!(
                sessions.validate(token),
                Err(AuthError::SessionInvalid(_))
            ));
        }
    }

    #[test]
    fn test_revoked_session_rejected_until_swept() {
        let clock = Arc::new(ManualClock::default());
        let sessions = issuer(clock.clone());
        let session = sessions.issue(&Identity::new("alice", AuthMethod::OAuth)).unwrap();

        sessions.revoke(&session.token).unwrap();
        let err = sessions.validate(&session.token).unwrap_err();
        assert_eq!(err.to_string(), "Session invalid: revoked");
        assert!(sessions.revoke(&session.token).is_err());

        clock.advance(Duration::days(8));
        assert_eq!(sessions.sweep(), 1);
    }

    #[test]
    fn test_full_revocation_set_refuses_logout() {
        let clock = Arc::new(ManualClock::default());
        let sessions = SessionIssuer::new(SECRET, Duration::days(7), clock, 2).unwrap();
        let tokens: Vec<String> = ["a", "b", "c"]
            .iter()
            .map(|name| sessions.issue(&Identity::new(*name, AuthMethod::LocalSignature)).unwrap().token)
            .collect();

        sessions.revoke(&tokens[0]).unwrap();
        sessions.revoke(&tokens[1]).unwrap();
        assert!(matches!(sessions.revoke(&tokens[2]), Err(AuthError::Capacity)));
        // The caller learns the token is still live.
        assert!(sessions.validate(&tokens[2]).is_ok());
    }

    #[test]
    fn test_lifetime_overflow_is_an_error() {
        let sessions = SessionIssuer::new(
            SECRET,
            Duration::seconds(i64::MAX / 1000),
            Arc::new(ManualClock::default()),
            10,
        )
        .unwrap();
        let result = sessions.issue(&Identity::new("alice", AuthMethod::LocalSignature));
        assert!(matches!(result, Err(AuthError::Config(_))));
    }

    #[test]
    fn test_short_secret_refused() {
        let result = SessionIssuer::new(
            b"short".to_vec(),
            Duration::days(7),
            Arc::new(ManualClock::default()),
            10,
        );
        assert!(matches!(result, Err(AuthError::Config(_))));
    }
}
