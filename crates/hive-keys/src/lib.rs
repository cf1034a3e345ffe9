//! Hive account key handling.
//!
//! This crate provides:
//! - `HivePublicKey`: `STM`-prefixed secp256k1 public keys with checksum
//! - `CompactSignature`: the 65-byte recoverable signature produced by Hive Keychain
//! - `AccountDirectory`: lookup of an account's posting authority over JSON-RPC

mod account;
mod error;
mod public_key;
mod signature;

pub use account::{normalize_username, AccountDirectory, HiveApiClient};
pub use error::{KeyError, KeyResult};
pub use public_key::{HivePublicKey, KEY_PREFIX};
pub use signature::{message_digest, CompactSignature};

#[cfg(any(test, feature = "testing"))]
pub use signature::testing;
