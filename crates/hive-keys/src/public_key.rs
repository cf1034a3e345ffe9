//! `STM`-prefixed public keys.

use crate::{KeyError, KeyResult};
use k256::ecdsa::VerifyingKey;
use ripemd::{Digest, Ripemd160};
use std::fmt;
use std::str::FromStr;

/// Address prefix used by Hive mainnet keys.
pub const KEY_PREFIX: &str = "STM";

const COMPRESSED_LEN: usize = 33;
const CHECKSUM_LEN: usize = 4;

/// A secp256k1 public key in Hive's textual form:
/// `STM` + base58(`compressed_point || ripemd160(compressed_point)[..4]`).
#[derive(Clone, PartialEq, Eq)]
pub struct HivePublicKey {
    key: VerifyingKey,
}

impl HivePublicKey {
    /// Wrap an already decoded verifying key.
    pub fn from_verifying_key(key: VerifyingKey) -> Self {
        Self { key }
    }

    /// The underlying verifying key.
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.key
    }

    /// SEC1 compressed encoding of the point.
    pub fn to_compressed_bytes(&self) -> Vec<u8> {
        self.key.to_encoded_point(true).as_bytes().to_vec()
    }

    /// Decode an `STM...` string, checking prefix, length and checksum.
    pub fn parse(encoded: &str) -> KeyResult<Self> {
        let body = encoded
            .trim()
            .strip_prefix(KEY_PREFIX)
            .ok_or_else(|| KeyError::InvalidPublicKey(format!("missing {KEY_PREFIX} prefix")))?;

        let raw = bs58::decode(body)
            .into_vec()
            .map_err(|e| KeyError::InvalidPublicKey(format!("base58: {e}")))?;

        if raw.len() != COMPRESSED_LEN + CHECKSUM_LEN {
            return Err(KeyError::InvalidPublicKey(format!(
                "expected {} bytes, got {}",
                COMPRESSED_LEN + CHECKSUM_LEN,
                raw.len()
            )));
        }

        let (point, checksum) = raw.split_at(COMPRESSED_LEN);
        if checksum != &key_checksum(point)[..] {
            return Err(KeyError::InvalidPublicKey("checksum mismatch".to_string()));
        }

        let key = VerifyingKey::from_sec1_bytes(point)
            .map_err(|_| KeyError::InvalidPublicKey("not a curve point".to_string()))?;

        Ok(Self { key })
    }
}

fn key_checksum(point: &[u8]) -> [u8; CHECKSUM_LEN] {
    let digest = Ripemd160::digest(point);
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&digest[..CHECKSUM_LEN]);
    out
}

impl fmt::Display for HivePublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut raw = self.to_compressed_bytes();
        let checksum = key_checksum(&raw);
        raw.extend_from_slice(&checksum);
        write!(f, "{}{}", KEY_PREFIX, bs58::encode(raw).into_string())
    }
}

impl fmt::Debug for HivePublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HivePublicKey").field(&self.to_string()).finish()
    }
}

impl FromStr for HivePublicKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::SigningKey;

    fn sample_key() -> HivePublicKey {
        let signing = SigningKey::from_slice(&[0x11u8; 32]).unwrap();
        HivePublicKey::from_verifying_key(*signing.verifying_key())
    }

    #[test]
    fn test_display_then_parse() {
        let key = sample_key();
        let encoded = key.to_string();
        assert!(encoded.starts_with("STM"));
        assert_eq!(HivePublicKey::parse(&encoded).unwrap(), key);
    }

    #[test]
    fn test_parse_rejects_wrong_prefix() {
        let encoded = sample_key().to_string().replacen("STM", "TST", 1);
        let err = HivePublicKey::parse(&encoded).unwrap_err();
        assert!(err.to_string().contains("prefix"));
    }

    #[test]
    fn test_parse_rejects_bad_checksum() {
        let key = sample_key();
        let mut raw = key.to_compressed_bytes();
        raw.extend_from_slice(&[0, 0, 0, 0]);
        let encoded = format!("STM{}", bs58::encode(raw).into_string());
        let err = HivePublicKey::parse(&encoded).unwrap_err();
        assert!(err.to_string().contains("checksum"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(HivePublicKey::parse("STM0OIl").is_err());
        assert!(HivePublicKey::parse("STM1111").is_err());
        assert!("".parse::<HivePublicKey>().is_err());
    }

    #[test]
    fn test_compressed_encoding_length() {
        assert_eq!(sample_key().to_compressed_bytes().len(), 33);
    }
}
