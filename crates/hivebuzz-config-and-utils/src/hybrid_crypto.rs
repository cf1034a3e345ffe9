//! Hybrid encryption using X25519 ECDH + HKDF-SHA256 + ChaCha20-Poly1305.
//!
//! Pairing approvals travel through a third-party relay. The approving wallet
//! seals its answer to the ephemeral X25519 key generated for that pairing,
//! so the relay can forward but not forge or read it.
//!
//! Envelope layout: `sender_ephemeral_public(32) || nonce(12) || ciphertext || tag(16)`.
//!
//! HKDF parameters:
//! - Hash: SHA-256
//! - Salt: context string bytes (the pairing uuid)
//! - Info: b"hivebuzz-pairing-ack-v1"
//! - Output: 32 bytes

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::error::{CoreError, CoreResult};

const HKDF_INFO: &[u8] = b"hivebuzz-pairing-ack-v1";

const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;
const KEY_SIZE: usize = 32;

fn generate_random_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

fn derive_key(shared_secret: &[u8], context: &str) -> CoreResult<[u8; KEY_SIZE]> {
    let hkdf = Hkdf::<Sha256>::new(Some(context.as_bytes()), shared_secret);
    let mut symmetric_key = [0u8; KEY_SIZE];
    hkdf.expand(HKDF_INFO, &mut symmetric_key)
        .map_err(|e| CoreError::Crypto(format!("HKDF expand failed: {e}")))?;
    Ok(symmetric_key)
}

/// Seal `plaintext` to `recipient_public_key`, bound to `context`.
///
/// Returns the full envelope (sender ephemeral key, nonce, ciphertext and tag).
pub fn encrypt_for_key(
    plaintext: &[u8],
    recipient_public_key: &[u8; KEY_SIZE],
    context: &str,
) -> CoreResult<Vec<u8>> {
    let ephemeral_secret = EphemeralSecret::random_from_rng(rand::thread_rng());
    let ephemeral_public = PublicKey::from(&ephemeral_secret);

    let recipient_public = PublicKey::from(*recipient_public_key);
    let shared_secret = ephemeral_secret.diffie_hellman(&recipient_public);
    let symmetric_key = derive_key(shared_secret.as_bytes(), context)?;

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&symmetric_key));
    let nonce = generate_random_nonce();
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| CoreError::Crypto(format!("Encryption failed: {e}")))?;

    let mut envelope = Vec::with_capacity(KEY_SIZE + NONCE_SIZE + ciphertext.len());
    envelope.extend_from_slice(ephemeral_public.as_bytes());
    envelope.extend_from_slice(&nonce);
    envelope.extend_from_slice(&ciphertext);

    Ok(envelope)
}

/// Open an envelope produced by [`encrypt_for_key`].
pub fn decrypt_for_key(
    envelope: &[u8],
    private_key: &[u8; KEY_SIZE],
    context: &str,
) -> CoreResult<Vec<u8>> {
    if envelope.len() < KEY_SIZE + NONCE_SIZE + TAG_SIZE {
        return Err(CoreError::Crypto(format!(
            "Envelope too short (must be at least {} bytes)",
            KEY_SIZE + NONCE_SIZE + TAG_SIZE
        )));
    }

    let (sender_public, rest) = envelope.split_at(KEY_SIZE);
    let (nonce, ciphertext) = rest.split_at(NONCE_SIZE);

    let mut sender_bytes = [0u8; KEY_SIZE];
    sender_bytes.copy_from_slice(sender_public);

    let secret = StaticSecret::from(*private_key);
    let shared_secret = secret.diffie_hellman(&PublicKey::from(sender_bytes));
    let symmetric_key = derive_key(shared_secret.as_bytes(), context)?;

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&symmetric_key));
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CoreError::Crypto("Decryption failed: authentication tag mismatch".to_string()))
}

/// Generate a new X25519 keypair.
///
/// # Returns
/// A tuple of (private_key, public_key), each 32 bytes.
pub fn generate_keypair() -> ([u8; KEY_SIZE], [u8; KEY_SIZE]) {
    let private_key = StaticSecret::random_from_rng(rand::thread_rng());
    let public_key = PublicKey::from(&private_key);
    (private_key.to_bytes(), public_key.to_bytes())
}
