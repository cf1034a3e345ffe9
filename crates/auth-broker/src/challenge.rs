//! Single-use login challenges.

use crate::{AuthMethod, AuthResult};
use chrono::{DateTime, Duration, Utc};
use ephemeral_store::{Clock, Consumable, ConsumeError, TtlStore};
use rand::RngCore;
use std::sync::Arc;
use tracing::{debug, warn};

/// Prefix of every challenge value.
pub const CHALLENGE_PREFIX: &str = "hivebuzz-auth-";

/// Default challenge lifetime.
pub const DEFAULT_CHALLENGE_TTL_SECS: i64 = 300;

/// Hex-encoded random token of `bytes` bytes from the OS-seeded CSPRNG.
pub fn random_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Fresh unpredictable challenge value.
pub fn new_challenge_value() -> String {
    format!("{}{}", CHALLENGE_PREFIX, random_token(16))
}

/// An issued challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub value: String,
    pub method: AuthMethod,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
}

impl Consumable for Challenge {
    fn is_consumed(&self) -> bool {
        self.consumed
    }

    fn mark_consumed(&mut self) {
        self.consumed = true;
    }
}

/// Issues challenges and accepts each one at most once.
pub struct ChallengeStore {
    store: TtlStore<Challenge>,
    ttl: Duration,
}

impl ChallengeStore {
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration, max_pending: usize) -> Self {
        Self {
            store: TtlStore::new(clock, max_pending),
            ttl,
        }
    }

    /// Issue a new challenge for `method`, keyed by its own value.
    pub fn issue(&self, method: AuthMethod) -> AuthResult<Challenge> {
        self.issue_value(new_challenge_value(), method)
    }

    pub(crate) fn issue_value(&self, value: String, method: AuthMethod) -> AuthResult<Challenge> {
        let issued_at = self.store.now();
        let challenge = Challenge {
            value: value.clone(),
            method,
            issued_at,
            expires_at: issued_at + self.ttl,
            consumed: false,
        };

        self.store.insert(value, challenge.clone(), self.ttl)?;
        debug!(method = %method, expires_at = %challenge.expires_at, "Issued challenge");
        Ok(challenge)
    }

    /// Atomically mark `value` consumed and return the record.
    pub fn consume(&self, value: &str) -> Result<Challenge, ConsumeError> {
        let result = self.store.consume(value);
        if let Err(ConsumeError::AlreadyConsumed) = result {
            warn!(challenge = %redact(value), "Challenge replay rejected");
        }
        result
    }

    /// Drop expired challenges.
    pub fn sweep(&self) -> usize {
        self.store.sweep()
    }

    pub fn pending(&self) -> usize {
        self.store.len()
    }
}

/// Leading characters of a secret, for logs.
pub(crate) fn redact(secret: &str) -> String {
    let shown: String = secret.chars().take(8).collect();
    format!("{shown}...")
}
