//! HiveAuth relay client.
//!
//! This crate provides:
//! - HTTPS calls to the relay (pairing registration, poll token, status check)
//! - A websocket channel that pushes approval messages for one pairing
//! - The `has://auth_req/` payload a wallet scans to find the pairing

mod channel;
mod error;
mod http;
mod messages;

pub use channel::{PairingChannel, WebSocketChannel};
pub use error::{RelayError, RelayResult};
pub use http::{
    PairingMetadata, PairingRegistration, RelayApi, RelayConfig, RelayHttpClient, StatusReport,
};
pub use messages::{AckPayload, HasMessage, PairingPayload, PAIRING_URI_PREFIX};
