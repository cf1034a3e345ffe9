//! The single entry point other subsystems call to log a user in.

use crate::oauth::{AuthorizationRequest, AuthorizationServer, HiveSignerClient, OAuthBroker};
use crate::pairing::{PairingClient, PairingConfig, PairingRequest};
use crate::session::{Session, SessionClaims, SessionIssuer};
use crate::signature::SignatureVerifier;
use crate::{AuthError, AuthMethod, AuthResult, ChallengeStore, Identity};
use chrono::{DateTime, Duration, Utc};
use ephemeral_store::{Clock, SystemClock};
use hive_keys::{AccountDirectory, HiveApiClient};
use hiveauth_relay::{PairingChannel, RelayApi, RelayConfig, RelayHttpClient, WebSocketChannel};
use hivebuzz_config_and_utils::Config;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Remote collaborators of the broker.
pub struct BrokerDeps {
    pub accounts: Arc<dyn AccountDirectory>,
    pub authorization_server: Arc<dyn AuthorizationServer>,
    pub relay_api: Arc<dyn RelayApi>,
    pub relay_channel: Arc<dyn PairingChannel>,
    pub clock: Arc<dyn Clock>,
}

/// What the browser needs to ask Keychain for a signature.
#[derive(Debug, Clone)]
pub struct KeychainChallenge {
    pub challenge: String,
    /// Exact text to pass to `requestSignBuffer`.
    pub message: String,
    pub expires_at: DateTime<Utc>,
}

/// Counts of records dropped by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub challenges: usize,
    pub oauth_states: usize,
    pub pairings: usize,
    pub revocations: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.challenges + self.oauth_states + self.pairings + self.revocations
    }
}

/// Authentication broker.
pub struct AuthBroker {
    challenges: Arc<ChallengeStore>,
    signatures: SignatureVerifier,
    oauth: OAuthBroker,
    pairing: PairingClient,
    sessions: SessionIssuer,
    pairing_timeout: std::time::Duration,
}

impl AuthBroker {
    /// Build a broker from configuration with injected collaborators.
    pub fn new(config: &Config, deps: BrokerDeps) -> AuthResult<Self> {
        let ttl = &config.ttl;
        let secret = match config.session_secret.as_deref() {
            Some(secret) => secret.as_bytes().to_vec(),
            None => {
                warn!("No session secret configured; sessions will not survive a restart");
                crate::challenge::random_token(32).into_bytes()
            }
        };

        let challenges = Arc::new(ChallengeStore::new(
            deps.clock.clone(),
            secs(ttl.challenge_secs),
            ttl.max_pending,
        ));
        let signatures = SignatureVerifier::new(
            challenges.clone(),
            deps.accounts,
            config.app_name.clone(),
        );
        let oauth = OAuthBroker::new(
            &config.hivesigner,
            deps.authorization_server,
            deps.clock.clone(),
            secs(ttl.oauth_state_secs),
            ttl.max_pending,
        )?;
        let pairing = PairingClient::new(
            deps.relay_api,
            deps.relay_channel,
            deps.clock.clone(),
            PairingConfig {
                client_id: config.app_name.clone(),
                relay_host: config.hiveauth.ws_url.clone(),
                poll_interval: std::time::Duration::from_millis(
                    config.hiveauth.poll_interval_ms.max(1),
                ),
                max_poll_failures: config.hiveauth.max_poll_failures.max(1),
                ttl: secs(ttl.pairing_secs),
                max_pending: ttl.max_pending,
            },
        );
        let sessions = SessionIssuer::new(
            secret,
            secs(ttl.session_secs),
            deps.clock,
            ttl.max_revoked,
        )?;

        Ok(Self {
            challenges,
            signatures,
            oauth,
            pairing,
            sessions,
            pairing_timeout: std::time::Duration::from_secs(config.hiveauth.timeout_secs),
        })
    }

    /// Build a broker talking to the real Hive API, HiveSigner and HiveAuth.
    pub fn from_config(config: &Config) -> AuthResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()?;

        let relay_api = RelayHttpClient::new(RelayConfig {
            api_url: config.hiveauth.api_url.clone(),
            ws_url: config.hiveauth.ws_url.clone(),
            ..RelayConfig::default()
        })?;

        info!(
            hive_api = %config.hive_api_url,
            hivesigner = %config.hivesigner.authorize_url,
            hiveauth = %config.hiveauth.api_url,
            "Creating auth broker"
        );

        Self::new(
            config,
            BrokerDeps {
                accounts: Arc::new(HiveApiClient::with_client(
                    http.clone(),
                    config.hive_api_url.clone(),
                )),
                authorization_server: Arc::new(HiveSignerClient::with_client(
                    http,
                    config.hivesigner.clone(),
                )),
                relay_api: Arc::new(relay_api),
                relay_channel: Arc::new(WebSocketChannel::new(config.hiveauth.ws_url.clone())),
                clock: Arc::new(SystemClock),
            },
        )
    }

    /// Default wait for a pairing approval.
    pub fn pairing_timeout(&self) -> std::time::Duration {
        self.pairing_timeout
    }

    /// Session lifetime, for cookie max-age.
    pub fn session_lifetime(&self) -> Duration {
        self.sessions.lifetime()
    }

    // Keychain

    /// Issue a challenge for the browser extension to sign.
    pub fn issue_challenge(&self) -> AuthResult<KeychainChallenge> {
        let challenge = self.challenges.issue(AuthMethod::LocalSignature)?;
        Ok(KeychainChallenge {
            message: self.signatures.message_for(&challenge.value),
            challenge: challenge.value,
            expires_at: challenge.expires_at,
        })
    }

    /// Verify a Keychain response and open a session.
    pub async fn login_with_signature(
        &self,
        username: &str,
        challenge: &str,
        signature: &str,
    ) -> AuthResult<Session> {
        let identity = self
            .signatures
            .verify(username, challenge, signature)
            .await
            .inspect_err(|e| log_failure(AuthMethod::LocalSignature, e))?;
        self.open_session(&identity)
    }

    // HiveSigner

    /// Begin a redirect login.
    pub fn start_oauth(
        &self,
        username_hint: Option<&str>,
        return_to: Option<&str>,
    ) -> AuthResult<AuthorizationRequest> {
        self.oauth.start(username_hint, return_to)
    }

    /// Finish a redirect login. Returns the session and the local path to
    /// land on, if one was requested.
    pub async fn complete_oauth(
        &self,
        code: &str,
        state: &str,
    ) -> AuthResult<(Session, Option<String>)> {
        let login = self
            .oauth
            .handle_callback(code, state)
            .await
            .inspect_err(|e| log_failure(AuthMethod::OAuth, e))?;
        Ok((self.open_session(&login.identity)?, login.return_to))
    }

    // HiveAuth

    /// Register a pairing for `username`.
    pub async fn start_pairing(&self, username: &str) -> AuthResult<PairingRequest> {
        self.pairing
            .register(username)
            .await
            .inspect_err(|e| log_failure(AuthMethod::Pairing, e))
    }

    /// Wait for the wallet and open a session once it approves.
    pub async fn complete_pairing(
        &self,
        uuid: &str,
        timeout: Option<std::time::Duration>,
    ) -> AuthResult<Session> {
        let identity = self
            .pairing
            .await_approval(uuid, timeout.unwrap_or(self.pairing_timeout))
            .await
            .inspect_err(|e| log_failure(AuthMethod::Pairing, e))?;
        self.open_session(&identity)
    }

    /// Current state of a pairing.
    pub fn pairing_status(&self, uuid: &str) -> AuthResult<PairingRequest> {
        self.pairing.status(uuid)
    }

    // Sessions

    fn open_session(&self, identity: &Identity) -> AuthResult<Session> {
        self.sessions.issue(identity)
    }

    /// Claims of a live session.
    pub fn validate_session(&self, token: &str) -> AuthResult<SessionClaims> {
        self.sessions.validate(token)
    }

    /// End a session.
    pub fn logout(&self, token: &str) -> AuthResult<()> {
        let claims = self.sessions.revoke(token)?;
        info!(username = %claims.username, method = %claims.method, "Logged out");
        Ok(())
    }

    /// Reclaim every expired ephemeral record.
    pub fn sweep(&self) -> SweepReport {
        SweepReport {
            challenges: self.challenges.sweep(),
            oauth_states: self.oauth.sweep(),
            pairings: self.pairing.sweep(),
            revocations: self.sessions.sweep(),
        }
    }
}

fn secs(value: u64) -> Duration {
    Duration::seconds(value.min(i64::MAX as u64 / 1_000) as i64)
}

fn log_failure(method: AuthMethod, err: &AuthError) {
    match err {
        AuthError::StateMismatch | AuthError::AlreadyConsumed => {
            warn!(method = %method, kind = err.kind(), "Rejected replayed or forged login");
        }
        _ => {
            warn!(method = %method, kind = err.kind(), error = %err, "Login failed");
        }
    }
}

/// Periodically sweep the broker's ephemeral stores.
pub fn spawn_sweeper(broker: Arc<AuthBroker>, every: std::time::Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let report = broker.sweep();
            if report.total() > 0 {
                debug!(
                    challenges = report.challenges,
                    oauth_states = report.oauth_states,
                    pairings = report.pairings,
                    revocations = report.revocations,
                    "Swept expired records"
                );
            }
        }
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::oauth::tests::FakeHiveSigner;
    use crate::pairing::tests::{nack, sealed_ack, FakeRelayApi, ScriptedChannel};
    use crate::pairing_fsm::PairingStatus;
    use crate::signature::tests::StaticAccounts;
    use ephemeral_store::ManualClock;
    use hive_keys::testing::sign;

    pub(crate) struct Harness {
        pub broker: AuthBroker,
        pub clock: Arc<ManualClock>,
        pub channel: Arc<ScriptedChannel>,
    }

    pub(crate) fn harness() -> Harness {
        let clock = Arc::new(ManualClock::default());
        let channel = Arc::new(ScriptedChannel::default());
        let mut config = Config::default();
        config.session_secret = Some("test-session-secret-0123456789".to_string());

        let broker = AuthBroker::new(
            &config,
            BrokerDeps {
                accounts: Arc::new(StaticAccounts::with("alice", &[1])),
                authorization_server: Arc::new(FakeHiveSigner::returning("good-code", "bob")),
                relay_api: Arc::new(FakeRelayApi::default()),
                relay_channel: channel.clone(),
                clock: clock.clone(),
            },
        )
        .unwrap();

        Harness {
            broker,
            clock,
            channel,
        }
    }

    #[tokio::test]
    async fn test_scenario_keychain_login_then_replay() {
        let h = harness();
        h.broker
            .challenges
            .issue_value("hivebuzz-auth-abc123".to_string(), AuthMethod::LocalSignature)
            .unwrap();
        let signature = sign(1, "Login to HiveBuzz: hivebuzz-auth-abc123");

        let session = h
            .broker
            .login_with_signature("alice", "hivebuzz-auth-abc123", &signature)
            .await
            .unwrap();
        assert_eq!(session.username, "alice");
        assert_eq!(session.method, AuthMethod::LocalSignature);

        let claims = h.broker.validate_session(&session.token).unwrap();
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.method, AuthMethod::LocalSignature);
        assert_eq!(claims.expires_at(), session.expires_at);

        let err = h
            .broker
            .login_with_signature("alice", "hivebuzz-auth-abc123", &signature)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AlreadyConsumed));
    }

    #[tokio::test]
    async fn test_issued_challenge_message() {
        let h = harness();
        let challenge = h.broker.issue_challenge().unwrap();
        assert_eq!(
            challenge.message,
            format!("Login to HiveBuzz: {}", challenge.challenge)
        );

        let signature = sign(1, &challenge.message);
        let session = h
            .broker
            .login_with_signature("@Alice", &challenge.challenge, &signature)
            .await
            .unwrap();
        assert_eq!(session.username, "alice");
    }

    #[tokio::test]
    async fn test_scenario_oauth_state_mismatch_then_login() {
        let h = harness();
        h.broker
            .oauth
            .start_with_state("s1".to_string(), Some("bob"), None)
            .unwrap();

        let err = h.broker.complete_oauth("good-code", "s2").await.unwrap_err();
        assert!(matches!(err, AuthError::StateMismatch));

        let (session, return_to) = h.broker.complete_oauth("good-code", "s1").await.unwrap();
        assert_eq!(session.username, "bob");
        assert_eq!(session.method, AuthMethod::OAuth);
        assert!(return_to.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scenario_pairing_rejected() {
        let h = harness();
        let request = h.broker.start_pairing("carol").await.unwrap();
        h.channel
            .push(std::time::Duration::from_secs(5), nack(&request.uuid));
        h.channel.push(
            std::time::Duration::from_secs(1),
            sealed_ack(&request, "carol", &request.challenge),
        );

        let err = h
            .broker
            .complete_pairing(&request.uuid, Some(std::time::Duration::from_secs(120)))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::PairingRejected));

        tokio::time::sleep(std::time::Duration::from_secs(10)).await;
        assert_eq!(
            h.broker.pairing_status(&request.uuid).unwrap().status,
            PairingStatus::Rejected
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_pairing_approval_opens_session() {
        let h = harness();
        let request = h.broker.start_pairing("carol").await.unwrap();
        h.channel.push(
            std::time::Duration::from_secs(2),
            sealed_ack(&request, "carol", &request.challenge),
        );

        let session = h.broker.complete_pairing(&request.uuid, None).await.unwrap();
        assert_eq!(session.username, "carol");
        assert_eq!(session.method, AuthMethod::Pairing);
    }

    #[tokio::test]
    async fn test_logout_revokes() {
        let h = harness();
        let request = h.broker.start_oauth(None, Some("/feed")).unwrap();
        let (session, return_to) = h
            .broker
            .complete_oauth("good-code", &request.state)
            .await
            .unwrap();
        assert_eq!(return_to.as_deref(), Some("/feed"));

        h.broker.logout(&session.token).unwrap();
        assert!(matches!(
            h.broker.validate_session(&session.token),
            Err(AuthError::SessionInvalid(_))
        ));
    }

    #[tokio::test]
    async fn test_sweep_reclaims_everything_expired() {
        let h = harness();
        h.broker.issue_challenge().unwrap();
        h.broker.start_oauth(None, None).unwrap();
        h.broker.start_pairing("carol").await.unwrap();

        h.clock.advance(Duration::minutes(11));
        let report = h.broker.sweep();
        assert_eq!(report.challenges, 1);
        assert_eq!(report.oauth_states, 1);
        assert_eq!(report.pairings, 1);
        assert_eq!(report.total(), 3);
    }
}
