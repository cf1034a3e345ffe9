//! Hive Keychain challenge-signature login.

use crate::challenge::redact;
use crate::{AuthError, AuthMethod, AuthResult, ChallengeStore, Identity};
use ephemeral_store::ConsumeError;
use hive_keys::{normalize_username, AccountDirectory, CompactSignature};
use std::sync::Arc;
use tracing::{info, warn};

/// The exact text Keychain is asked to sign.
pub fn login_message(app_name: &str, challenge: &str) -> String {
    format!("Login to {}: {}", app_name, challenge)
}

/// Verifies signed challenges against on-chain posting keys.
pub struct SignatureVerifier {
    challenges: Arc<ChallengeStore>,
    accounts: Arc<dyn AccountDirectory>,
    app_name: String,
}

impl SignatureVerifier {
    pub fn new(
        challenges: Arc<ChallengeStore>,
        accounts: Arc<dyn AccountDirectory>,
        app_name: impl Into<String>,
    ) -> Self {
        Self {
            challenges,
            accounts,
            app_name: app_name.into(),
        }
    }

    /// Message to sign for `challenge`.
    pub fn message_for(&self, challenge: &str) -> String {
        login_message(&self.app_name, challenge)
    }

    /// Check a Keychain response.
    ///
    /// The challenge is consumed before anything else, so a failed attempt
    /// burns it as well.
    pub async fn verify(
        &self,
        username: &str,
        challenge_value: &str,
        signature: &str,
    ) -> AuthResult<Identity> {
        let challenge = self
            .challenges
            .consume(challenge_value)
            .map_err(|e| match e {
                ConsumeError::NotFound => AuthError::ChallengeInvalid,
                ConsumeError::AlreadyConsumed => AuthError::AlreadyConsumed,
            })?;

        if challenge.method != AuthMethod::LocalSignature {
            warn!(challenge = %redact(challenge_value), method = %challenge.method, "Challenge issued for another method");
            return Err(AuthError::ChallengeInvalid);
        }

        let username = normalize_username(username)?;
        let signature = CompactSignature::from_hex(signature)?;
        let keys = self.accounts.posting_keys(&username).await?;

        let message = self.message_for(&challenge.value);
        if !signature.verify_any(&message, &keys) {
            warn!(username = %username, keys = keys.len(), "Signature does not match any posting key");
            return Err(AuthError::SignatureInvalid(
                "not signed by a posting key of this account".to_string(),
            ));
        }

        info!(username = %username, method = %AuthMethod::LocalSignature, "Keychain signature verified");
        Ok(Identity::new(username, AuthMethod::LocalSignature))
    }
}
