//! Hive Keychain compact signatures.
//!
//! Keychain's `requestSignBuffer` returns the hex encoding of 65 bytes:
//! a header byte (`recovery_id + 31` for compressed keys) followed by `r || s`,
//! signed over SHA-256 of the UTF-8 message.

use crate::{HivePublicKey, KeyError, KeyResult};
use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use sha2::{Digest, Sha256};

const SIGNATURE_LEN: usize = 65;
const HEADER_BASE: u8 = 27;
const COMPRESSED_FLAG: u8 = 4;

/// SHA-256 digest of a message, as signed by Keychain.
pub fn message_digest(message: &str) -> [u8; 32] {
    Sha256::digest(message.as_bytes()).into()
}

/// A decoded recoverable signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactSignature {
    signature: Signature,
    recovery_id: RecoveryId,
}

impl CompactSignature {
    /// Decode the hex form returned by Keychain.
    ///
    /// High-S signatures are refused: Hive only accepts canonical signatures,
    /// and the malleated twin of a valid signature must not verify.
    pub fn from_hex(encoded: &str) -> KeyResult<Self> {
        let raw = hex::decode(encoded.trim())
            .map_err(|e| KeyError::InvalidSignature(format!("hex: {e}")))?;

        if raw.len() != SIGNATURE_LEN {
            return Err(KeyError::InvalidSignature(format!(
                "expected {} bytes, got {}",
                SIGNATURE_LEN,
                raw.len()
            )));
        }

        let header = raw[0];
        if !(HEADER_BASE..HEADER_BASE + 2 * COMPRESSED_FLAG).contains(&header) {
            return Err(KeyError::InvalidSignature(format!("bad header byte {header}")));
        }
        let recovery_id = RecoveryId::from_byte((header - HEADER_BASE) & 0x03)
            .ok_or_else(|| KeyError::InvalidSignature("bad recovery id".to_string()))?;

        let signature = Signature::from_slice(&raw[1..])
            .map_err(|_| KeyError::InvalidSignature("r or s out of range".to_string()))?;

        if signature.normalize_s().is_some() {
            return Err(KeyError::InvalidSignature("non-canonical signature".to_string()));
        }

        Ok(Self {
            signature,
            recovery_id,
        })
    }

    /// Hex form with a compressed-key header.
    pub fn to_hex(&self) -> String {
        let mut raw = Vec::with_capacity(SIGNATURE_LEN);
        raw.push(self.recovery_id.to_byte() + HEADER_BASE + COMPRESSED_FLAG);
        raw.extend_from_slice(&self.signature.to_bytes());
        hex::encode(raw)
    }

    /// Recover the key that produced this signature over `message`.
    pub fn recover(&self, message: &str) -> KeyResult<HivePublicKey> {
        let digest = message_digest(message);
        let key = VerifyingKey::recover_from_prehash(&digest, &self.signature, self.recovery_id)
            .map_err(|_| KeyError::InvalidSignature("public key not recoverable".to_string()))?;
        Ok(HivePublicKey::from_verifying_key(key))
    }

    /// Whether this signature over `message` was produced by `key`.
    pub fn verify(&self, message: &str, key: &HivePublicKey) -> bool {
        let digest = message_digest(message);
        key.verifying_key()
            .verify_prehash(&digest, &self.signature)
            .is_ok()
    }

    /// Whether any of `keys` produced this signature over `message`.
    pub fn verify_any(&self, message: &str, keys: &[HivePublicKey]) -> bool {
        match self.recover(message) {
            Ok(recovered) => keys.iter().any(|k| *k == recovered && self.verify(message, k)),
            Err(_) => false,
        }
    }
}

/// Signing helpers for tests. Production code never holds private keys.
#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use super::*;
    use k256::ecdsa::SigningKey;

    /// Deterministic test key derived from a single byte.
    pub fn signing_key(seed: u8) -> SigningKey {
        let mut bytes = [seed; 32];
        bytes[0] = 0x01;
        SigningKey::from_slice(&bytes).expect("valid test scalar")
    }

    /// Public half of [`signing_key`].
    pub fn public_key(seed: u8) -> HivePublicKey {
        HivePublicKey::from_verifying_key(*signing_key(seed).verifying_key())
    }

    /// Sign `message` the way Keychain does and return the hex form.
    pub fn sign(seed: u8, message: &str) -> String {
        let digest = message_digest(message);
        let (signature, recovery_id) = signing_key(seed)
            .sign_prehash_recoverable(&digest)
            .expect("signing succeeds");
        CompactSignature {
            signature,
            recovery_id,
        }
        .to_hex()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{public_key, sign};
    use super::*;

    const MESSAGE: &str = "Login to HiveBuzz: hivebuzz-auth-abc123";

    #[test]
    fn test_signature_verifies_for_signer() {
        let sig = CompactSignature::from_hex(&sign(7, MESSAGE)).unwrap();
        assert!(sig.verify(MESSAGE, &public_key(7)));
        assert_eq!(sig.recover(MESSAGE).unwrap(), public_key(7));
    }

    #[test]
    fn test_signature_fails_for_other_key_or_message() {
        let sig = CompactSignature::from_hex(&sign(7, MESSAGE)).unwrap();
        assert!(!sig.verify(MESSAGE, &public_key(8)));
        assert!(!sig.verify("Login to HiveBuzz: hivebuzz-auth-other", &public_key(7)));
    }

    #[test]
    fn test_verify_any_matches_one_of_several() {
        let sig = CompactSignature::from_hex(&sign(9, MESSAGE)).unwrap();
        assert!(sig.verify_any(MESSAGE, &[public_key(1), public_key(9)]));
        assert!(!sig.verify_any(MESSAGE, &[public_key(1), public_key(2)]));
        assert!(!sig.verify_any(MESSAGE, &[]));
    }

    #[test]
    fn test_hex_roundtrip_preserves_header() {
        let encoded = sign(3, MESSAGE);
        let header = u8::from_str_radix(&encoded[..2], 16).unwrap();
        assert!((31..=34).contains(&header));
        assert_eq!(CompactSignature::from_hex(&encoded).unwrap().to_hex(), encoded);
    }

    #[test]
    fn test_rejects_wrong_length_and_bad_hex() {
        assert!(CompactSignature::from_hex("zz").is_err());
        assert!(CompactSignature::from_hex(&"ab".repeat(64)).is_err());
    }

    #[test]
    fn test_rejects_bad_header() {
        let mut encoded = sign(3, MESSAGE);
        encoded.replace_range(..2, "00");
        let err = CompactSignature::from_hex(&encoded).unwrap_err();
        assert!(err.to_string().contains("header"));
    }

    #[test]
    fn test_rejects_high_s() {
        let sig = CompactSignature::from_hex(&sign(5, MESSAGE)).unwrap();
        let (r, s) = sig.signature.split_scalars();
        let high = Signature::from_scalars(r, -s).unwrap();

        let mut raw = vec![31u8];
        raw.extend_from_slice(&high.to_bytes());
        let err = CompactSignature::from_hex(&hex::encode(raw)).unwrap_err();
        assert!(err.to_string().contains("non-canonical"));
    }
}
