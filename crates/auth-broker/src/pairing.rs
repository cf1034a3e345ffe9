//! HiveAuth mobile pairing.
//!
//! `register` creates a pairing with a fresh X25519 key, uuid and challenge
//! and announces it to the relay. `await_approval` then races two paths for
//! the wallet's answer: the relay websocket and a periodic status poll. The
//! first approval or rejection wins and the other path is aborted. A path
//! that fails is logged and dropped while the other one is still running.

use crate::challenge::new_challenge_value;
use crate::pairing_fsm::{PairingMachine, PairingMachineInput, PairingStatus};
use crate::{AuthError, AuthMethod, AuthResult, Identity};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use ephemeral_store::{Clock, TtlStore};
use hive_keys::normalize_username;
use hiveauth_relay::{
    AckPayload, HasMessage, PairingChannel, PairingPayload, PairingRegistration, RelayApi,
};
use hivebuzz_config_and_utils::{decrypt_for_key, generate_keypair};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Pairing client settings.
#[derive(Debug, Clone)]
pub struct PairingConfig {
    /// Application identifier announced to the wallet.
    pub client_id: String,
    /// Relay websocket the wallet should use, embedded in the pairing payload.
    pub relay_host: String,
    /// Interval of the status-poll path.
    pub poll_interval: Duration,
    /// Consecutive poll failures after which the poll path gives up.
    pub max_poll_failures: u32,
    /// Lifetime of a pairing request.
    pub ttl: chrono::Duration,
    pub max_pending: usize,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            client_id: "HiveBuzz".to_string(),
            relay_host: "wss://hive-auth.arcange.eu".to_string(),
            poll_interval: Duration::from_secs(2),
            max_poll_failures: 5,
            ttl: chrono::Duration::minutes(5),
            max_pending: 10_000,
        }
    }
}

/// Snapshot of a pairing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingRequest {
    pub uuid: String,
    /// Base64 X25519 public key the wallet seals its answer to.
    pub ephemeral_key: String,
    pub client_id: String,
    pub challenge: String,
    pub status: PairingStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub authenticated_username: Option<String>,
    /// Code shown next to the QR so the user can match it in the wallet.
    pub pairing_code: String,
    /// `has://auth_req/...` URI for the wallet.
    pub pairing_payload: String,
}

struct PairingRecord {
    machine: PairingMachine,
    account: String,
    secret: [u8; 32],
    ephemeral_key: String,
    poll_token: String,
    client_id: String,
    challenge: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    authenticated_username: Option<String>,
    pairing_code: String,
    pairing_payload: String,
}

impl PairingRecord {
    fn snapshot(&self, uuid: &str) -> PairingRequest {
        PairingRequest {
            uuid: uuid.to_string(),
            ephemeral_key: self.ephemeral_key.clone(),
            client_id: self.client_id.clone(),
            challenge: self.challenge.clone(),
            status: PairingStatus::from(self.machine.state()),
            created_at: self.created_at,
            expires_at: self.expires_at,
            authenticated_username: self.authenticated_username.clone(),
            pairing_code: self.pairing_code.clone(),
            pairing_payload: self.pairing_payload.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathKind {
    Channel,
    Poll,
}

impl fmt::Display for PathKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathKind::Channel => f.write_str("channel"),
            PathKind::Poll => f.write_str("poll"),
        }
    }
}

#[derive(Debug)]
enum PathEvent {
    Approved(PathKind, String),
    Rejected(PathKind),
    Failed(PathKind, String),
}

enum Outcome {
    Approved(String),
    Rejected,
    Unavailable(String),
}

/// Everything a path needs to judge the wallet's answer.
#[derive(Clone)]
struct Expectation {
    uuid: String,
    account: String,
    challenge: String,
    secret: [u8; 32],
}

/// Drives HiveAuth pairings.
pub struct PairingClient {
    api: Arc<dyn RelayApi>,
    channel: Arc<dyn PairingChannel>,
    records: TtlStore<PairingRecord>,
    config: PairingConfig,
}

impl PairingClient {
    pub fn new(
        api: Arc<dyn RelayApi>,
        channel: Arc<dyn PairingChannel>,
        clock: Arc<dyn Clock>,
        config: PairingConfig,
    ) -> Self {
        Self {
            api,
            channel,
            records: TtlStore::new(clock, config.max_pending),
            config,
        }
    }

    /// Create a pairing for `username` and announce it to the relay.
    ///
    /// Pairing metadata and the poll token are requested concurrently; if
    /// either fails nothing is stored.
    pub async fn register(&self, username: &str) -> AuthResult<PairingRequest> {
        let account = normalize_username(username)?;
        let uuid = Uuid::new_v4().to_string();
        let (secret, public) = generate_keypair();
        let ephemeral_key = STANDARD.encode(public);
        let challenge = new_challenge_value();

        let registration = PairingRegistration {
            uuid: uuid.clone(),
            account: account.clone(),
            client_id: self.config.client_id.clone(),
            key: ephemeral_key.clone(),
            challenge: challenge.clone(),
        };

        let (metadata, poll_token) = tokio::try_join!(
            self.api.register_pairing(&registration),
            self.api.request_token(&uuid),
        )
        .map_err(|e| {
            warn!(uuid = %uuid, account = %account, error = %e, "Pairing registration failed");
            AuthError::RelayUnavailable(e.to_string())
        })?;

        let mut machine = PairingMachine::new();
        machine
            .consume(&PairingMachineInput::Register)
            .map_err(|_| AuthError::InvalidStateTransition("register from non-initial state".to_string()))?;

        let ttl = match metadata.expires_in {
            Some(secs) => self
                .config
                .ttl
                .min(chrono::Duration::seconds(secs.min(u32::MAX as u64) as i64)),
            None => self.config.ttl,
        };

        let pairing_payload = PairingPayload {
            account: account.clone(),
            uuid: uuid.clone(),
            key: ephemeral_key.clone(),
            host: self.config.relay_host.clone(),
        }
        .to_uri()?;

        let created_at = self.records.now();
        let record = PairingRecord {
            machine,
            account: account.clone(),
            secret,
            ephemeral_key,
            poll_token,
            client_id: self.config.client_id.clone(),
            challenge,
            created_at,
            expires_at: created_at + ttl,
            authenticated_username: None,
            pairing_code: metadata.pairing_code,
            pairing_payload,
        };
        let snapshot = record.snapshot(&uuid);
        self.records.insert(uuid.clone(), record, ttl)?;

        info!(uuid = %uuid, account = %account, expires_at = %snapshot.expires_at, "Pairing registered");
        Ok(snapshot)
    }

    /// Current snapshot of a pairing.
    pub fn status(&self, uuid: &str) -> AuthResult<PairingRequest> {
        self.records
            .get(uuid, |record| record.snapshot(uuid))
            .ok_or_else(|| AuthError::UnknownPairing(uuid.to_string()))
    }

    /// Wait for the wallet's answer, at most `timeout` and never past the
    /// request's own expiry.
    pub async fn await_approval(&self, uuid: &str, timeout: Duration) -> AuthResult<Identity> {
        let now = self.records.now();
        let expectation = self
            .records
            .update(uuid, |record| {
                record
                    .machine
                    .consume(&PairingMachineInput::Listen)
                    .map_err(|_| {
                        AuthError::InvalidStateTransition(format!(
                            "cannot wait for approval in state {:?}",
                            record.machine.state()
                        ))
                    })?;
                Ok::<_, AuthError>((
                    Expectation {
                        uuid: uuid.to_string(),
                        account: record.account.clone(),
                        challenge: record.challenge.clone(),
                        secret: record.secret,
                    },
                    record.poll_token.clone(),
                    record.expires_at,
                ))
            })
            .ok_or_else(|| AuthError::UnknownPairing(uuid.to_string()))?;
        let (expectation, poll_token, expires_at) = expectation?;

        let remaining = (expires_at - now).to_std().unwrap_or(Duration::ZERO);
        let deadline = timeout.min(remaining);
        info!(uuid = %uuid, account = %expectation.account, timeout_secs = deadline.as_secs(), "Waiting for pairing approval");

        let (tx, mut rx) = mpsc::channel::<PathEvent>(4);
        // Dropping the set aborts both paths, including when the caller
        // abandons this future.
        let mut paths = JoinSet::new();
        paths.spawn(listen_channel(
            self.channel.clone(),
            expectation.clone(),
            tx.clone(),
        ));
        paths.spawn(poll_status(
            self.api.clone(),
            expectation.clone(),
            poll_token,
            self.config.poll_interval,
            self.config.max_poll_failures,
            tx,
        ));

        let race = tokio::time::timeout(deadline, async {
            let mut failures = Vec::new();
            while let Some(event) = rx.recv().await {
                match event {
                    PathEvent::Approved(path, username) => {
                        debug!(uuid = %uuid, path = %path, "Pairing approved");
                        return Outcome::Approved(username);
                    }
                    PathEvent::Rejected(path) => {
                        debug!(uuid = %uuid, path = %path, "Pairing rejected");
                        return Outcome::Rejected;
                    }
                    PathEvent::Failed(path, error) => {
                        warn!(uuid = %uuid, path = %path, error = %error, "Pairing path failed, continuing on the other");
                        failures.push(format!("{path}: {error}"));
                    }
                }
            }
            Outcome::Unavailable(failures.join("; "))
        })
        .await;

        paths.abort_all();

        let (input, result) = match race {
            Ok(Outcome::Approved(username)) => (
                PairingMachineInput::Ack,
                Ok(Identity::new(username, AuthMethod::Pairing)),
            ),
            Ok(Outcome::Rejected) => (PairingMachineInput::Nack, Err(AuthError::PairingRejected)),
            Ok(Outcome::Unavailable(reason)) => (
                PairingMachineInput::Timeout,
                Err(AuthError::RelayUnavailable(reason)),
            ),
            Err(_) => (PairingMachineInput::Timeout, Err(AuthError::PairingTimeout)),
        };

        let applied = self.records.update(uuid, |record| {
            let applied = record.machine.consume(&input).is_ok();
            if let (true, Ok(identity)) = (applied, &result) {
                record.authenticated_username = Some(identity.username.clone());
            }
            applied
        });

        match result {
            Ok(identity) if applied == Some(true) => {
                info!(uuid = %uuid, username = %identity.username, method = %AuthMethod::Pairing, "Pairing approved");
                Ok(identity)
            }
            Ok(_) => {
                warn!(uuid = %uuid, "Approval arrived after the pairing left the store");
                Err(AuthError::PairingTimeout)
            }
            Err(e) => {
                warn!(uuid = %uuid, kind = e.kind(), "Pairing ended without approval");
                Err(e)
            }
        }
    }

    /// Drop expired pairings.
    pub fn sweep(&self) -> usize {
        self.records.sweep()
    }

    pub fn pending(&self) -> usize {
        self.records.len()
    }
}

/// Open an `auth_ack` envelope and return the approving account.
fn open_ack(data: &str, expectation: &Expectation) -> Result<String, String> {
    let envelope = STANDARD
        .decode(data)
        .map_err(|e| format!("ack is not base64: {e}"))?;
    let plaintext = decrypt_for_key(&envelope, &expectation.secret, &expectation.uuid)
        .map_err(|e| e.to_string())?;
    let payload: AckPayload =
        serde_json::from_slice(&plaintext).map_err(|e| format!("ack payload: {e}"))?;

    if payload.challenge != expectation.challenge {
        return Err("ack does not echo the pairing challenge".to_string());
    }
    check_account(&payload.username, expectation)
}

fn check_account(reported: &str, expectation: &Expectation) -> Result<String, String> {
    match normalize_username(reported) {
        Ok(name) if name == expectation.account => Ok(name),
        _ => Err(format!("approval is for '{reported}', not '{}'", expectation.account)),
    }
}

async fn listen_channel(
    channel: Arc<dyn PairingChannel>,
    expectation: Expectation,
    tx: mpsc::Sender<PathEvent>,
) {
    let mut messages = match channel.subscribe(&expectation.uuid).await {
        Ok(rx) => rx,
        Err(e) => {
            let _ = tx.send(PathEvent::Failed(PathKind::Channel, e.to_string())).await;
            return;
        }
    };

    let event = loop {
        match messages.recv().await {
            Some(Ok(HasMessage::AuthWait { expire, .. })) => {
                debug!(uuid = %expectation.uuid, expire = ?expire, "Relay confirmed subscription");
            }
            Some(Ok(HasMessage::AuthAck { data, .. })) => {
                break match open_ack(&data, &expectation) {
                    Ok(username) => PathEvent::Approved(PathKind::Channel, username),
                    Err(reason) => PathEvent::Failed(PathKind::Channel, reason),
                };
            }
            Some(Ok(HasMessage::AuthNack { .. })) => break PathEvent::Rejected(PathKind::Channel),
            Some(Ok(HasMessage::AuthErr { error, .. })) => {
                break PathEvent::Failed(
                    PathKind::Channel,
                    error.unwrap_or_else(|| "relay reported an error".to_string()),
                );
            }
            Some(Err(e)) => break PathEvent::Failed(PathKind::Channel, e.to_string()),
            None => break PathEvent::Failed(PathKind::Channel, "channel ended".to_string()),
        }
    };

    let _ = tx.send(event).await;
}

async fn poll_status(
    api: Arc<dyn RelayApi>,
    expectation: Expectation,
    token: String,
    every: Duration,
    max_failures: u32,
    tx: mpsc::Sender<PathEvent>,
) {
    let mut ticker = tokio::time::interval(every.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; start polling one interval in.
    ticker.tick().await;

    let mut failures = 0u32;
    let event = loop {
        ticker.tick().await;
        match api.check_status(&expectation.uuid, &token).await {
            Ok(report) if report.authenticated => {
                let reported = report.username.as_deref().unwrap_or(&expectation.account);
                break match check_account(reported, &expectation) {
                    Ok(username) => PathEvent::Approved(PathKind::Poll, username),
                    Err(reason) => PathEvent::Failed(PathKind::Poll, reason),
                };
            }
            Ok(report) if report.rejected => break PathEvent::Rejected(PathKind::Poll),
            Ok(_) => failures = 0,
            Err(e) => {
                failures += 1;
                debug!(uuid = %expectation.uuid, failures, error = %e, "Status poll failed");
                if failures >= max_failures {
                    break PathEvent::Failed(
                        PathKind::Poll,
                        format!("{failures} consecutive failures, last: {e}"),
                    );
                }
            }
        }
    };

    let _ = tx.send(event).await;
}
