//! Configuration, logging, and shared crypto helpers for the HiveBuzz auth broker.

mod config;
mod error;
pub mod hybrid_crypto;
mod logging;
mod paths;

pub use config::{
    Config, HiveAuthConfig, HiveSignerConfig, TtlConfig, DEFAULT_APP_NAME, DEFAULT_HIVE_API_URL,
    DEFAULT_LOG_LEVEL, MAX_LIFETIME_SECS,
};
pub use error::{CoreError, CoreResult};
pub use hybrid_crypto::{decrypt_for_key, encrypt_for_key, generate_keypair};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
