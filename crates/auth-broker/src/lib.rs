//! Authentication broker for HiveBuzz.
//!
//! This crate provides:
//! - Hive Keychain login via signed single-use challenges
//! - HiveSigner redirect login with single-use state tokens
//! - HiveAuth mobile pairing with a websocket/poll race
//! - Uniform HMAC-signed sessions for every method
//! - Explicit FSM-based pairing state management

mod broker;
mod challenge;
mod error;
mod identity;
mod oauth;
mod pairing;
mod pairing_fsm;
mod session;
mod signature;

pub use broker::{spawn_sweeper, AuthBroker, BrokerDeps, KeychainChallenge, SweepReport};
pub use challenge::{
    new_challenge_value, random_token, Challenge, ChallengeStore, CHALLENGE_PREFIX,
    DEFAULT_CHALLENGE_TTL_SECS,
};
pub use error::{AuthError, AuthResult};
pub use identity::{AuthMethod, Identity};
pub use oauth::{
    safe_return_path, AuthorizationRequest, AuthorizationServer, HiveSignerClient, OAuthBroker,
    OAuthLogin, OAuthState, TokenGrant, DEFAULT_STATE_TTL_SECS,
};
pub use pairing::{PairingClient, PairingConfig, PairingRequest};
pub use pairing_fsm::pairing_machine;
pub use pairing_fsm::{PairingMachine, PairingMachineInput, PairingMachineState, PairingStatus};
pub use session::{Session, SessionClaims, SessionIssuer, DEFAULT_SESSION_TTL_SECS};
pub use signature::{login_message, SignatureVerifier};
