//! # Hybrid Encryption Primitives
//!
//! The building blocks under [`crate::codec::EncryptedData`]:
//!
//! - **ECDH-ES**: an ephemeral X25519 key agreed against the recipient's
//!   static key. The raw Diffie-Hellman output is never used as a key; it is
//!   run through BLAKE3 `derive_key` together with both public keys and the
//!   data-encryption algorithm id.
//! - **A128GCM / A256GCM**: AES-GCM with a random 96-bit nonce and the
//!   envelope header as additional authenticated data.
//!
//! Errors are deliberately vague. "Wrong key" and "corrupted ciphertext" look
//! the same from the outside.

use aes_gcm::aead::{Aead, KeyInit, Nonce as AeadNonce, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use x25519_dalek::{EphemeralSecret, PublicKey as X25519PublicKey, StaticSecret};

use crate::config::{
    AES_NONCE_LENGTH, DATA_ENCRYPTION_A128GCM, DATA_ENCRYPTION_A256GCM, KEY_ENCRYPTION_ECDH_ES,
    PUBLIC_KEY_LENGTH,
};

/// BLAKE3 derive-key context for content keys.
const CONTENT_KEY_CONTEXT: &str = "webpay 2026 ECDH-ES content encryption key";

/// Errors during encryption and decryption.
#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("encryption failed")]
    EncryptFailed,

    #[error("decryption failed -- wrong key or corrupted ciphertext")]
    DecryptFailed,

    #[error("invalid key length")]
    InvalidKeyLength,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("key agreement produced a non-contributory secret")]
    WeakKeyAgreement,
}

/// Symmetric content-encryption algorithms.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataEncryptionAlgorithm {
    A128Gcm,
    A256Gcm,
}

impl DataEncryptionAlgorithm {
    /// Parse a wire identifier.
    pub fn from_id(id: &str) -> Result<Self, EncryptionError> {
        match id {
            DATA_ENCRYPTION_A128GCM => Ok(Self::A128Gcm),
            DATA_ENCRYPTION_A256GCM => Ok(Self::A256Gcm),
            other => Err(EncryptionError::UnsupportedAlgorithm(other.to_string())),
        }
    }

    /// Wire identifier.
    pub fn id(&self) -> &'static str {
        match self {
            Self::A128Gcm => DATA_ENCRYPTION_A128GCM,
            Self::A256Gcm => DATA_ENCRYPTION_A256GCM,
        }
    }

    /// Content key length in bytes.
    pub fn key_length(&self) -> usize {
        match self {
            Self::A128Gcm => 16,
            Self::A256Gcm => 32,
        }
    }
}

/// Key-encryption (key agreement) algorithms.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyEncryptionAlgorithm {
    EcdhEs,
}

impl KeyEncryptionAlgorithm {
    /// Parse a wire identifier.
    pub fn from_id(id: &str) -> Result<Self, EncryptionError> {
        match id {
            KEY_ENCRYPTION_ECDH_ES => Ok(Self::EcdhEs),
            other => Err(EncryptionError::UnsupportedAlgorithm(other.to_string())),
        }
    }

    /// Wire identifier.
    pub fn id(&self) -> &'static str {
        match self {
            Self::EcdhEs => KEY_ENCRYPTION_ECDH_ES,
        }
    }
}

// ---------------------------------------------------------------------------
// X25519 keys
// ---------------------------------------------------------------------------

/// A recipient's static X25519 decryption key.
pub struct DecryptionKey {
    secret: StaticSecret,
}

/// The public half of a [`DecryptionKey`], published in Authority documents.
/// Its hex form doubles as the key identifier inside encrypted envelopes.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EncryptionPublicKey {
    bytes: [u8; PUBLIC_KEY_LENGTH],
}

impl DecryptionKey {
    /// Generate a fresh key from the OS RNG.
    pub fn generate() -> Self {
        Self {
            secret: StaticSecret::random_from_rng(OsRng),
        }
    }

    /// Reconstruct from hex-encoded secret bytes.
    pub fn from_hex(hex_str: &str) -> Result<Self, EncryptionError> {
        let bytes = super::decode_hex(hex_str).map_err(|_| EncryptionError::InvalidKeyLength)?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| EncryptionError::InvalidKeyLength)?;
        Ok(Self {
            secret: StaticSecret::from(arr),
        })
    }

    /// Hex export of the secret. Handle with care.
    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret.to_bytes())
    }

    /// The matching public key.
    pub fn public_key(&self) -> EncryptionPublicKey {
        EncryptionPublicKey {
            bytes: X25519PublicKey::from(&self.secret).to_bytes(),
        }
    }

    /// Recompute the content key from the sender's ephemeral public key.
    pub fn agree(
        &self,
        ephemeral_public: &EncryptionPublicKey,
        algorithm: DataEncryptionAlgorithm,
    ) -> Result<Vec<u8>, EncryptionError> {
        let shared = self
            .secret
            .diffie_hellman(&X25519PublicKey::from(ephemeral_public.bytes));
        if !shared.was_contributory() {
            return Err(EncryptionError::WeakKeyAgreement);
        }
        Ok(derive_content_key(
            shared.as_bytes(),
            ephemeral_public,
            &self.public_key(),
            algorithm,
        ))
    }
}

impl Clone for DecryptionKey {
    fn clone(&self) -> Self {
        Self {
            secret: StaticSecret::from(self.secret.to_bytes()),
        }
    }
}

impl fmt::Debug for DecryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DecryptionKey(pub={})", self.public_key().to_hex())
    }
}

impl EncryptionPublicKey {
    /// Parse a hex-encoded X25519 public key.
    pub fn from_hex(s: &str) -> Result<Self, EncryptionError> {
        let bytes = super::decode_hex(s).map_err(|_| EncryptionError::InvalidPublicKey)?;
        let arr: [u8; PUBLIC_KEY_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| EncryptionError::InvalidPublicKey)?;
        Ok(Self { bytes: arr })
    }

    /// Lowercase hex, also used as the key identifier.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Run an ephemeral-static agreement against this key. Returns the
    /// ephemeral public key to ship alongside the ciphertext and the derived
    /// content key.
    pub fn agree_ephemeral(
        &self,
        algorithm: DataEncryptionAlgorithm,
    ) -> Result<(EncryptionPublicKey, Vec<u8>), EncryptionError> {
        let ephemeral = EphemeralSecret::random_from_rng(OsRng);
        let ephemeral_public = EncryptionPublicKey {
            bytes: X25519PublicKey::from(&ephemeral).to_bytes(),
        };
        let shared = ephemeral.diffie_hellman(&X25519PublicKey::from(self.bytes));
        if !shared.was_contributory() {
            return Err(EncryptionError::WeakKeyAgreement);
        }
        let key = derive_content_key(shared.as_bytes(), &ephemeral_public, self, algorithm);
        Ok((ephemeral_public, key))
    }
}

impl TryFrom<String> for EncryptionPublicKey {
    type Error = EncryptionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<EncryptionPublicKey> for String {
    fn from(key: EncryptionPublicKey) -> Self {
        key.to_hex()
    }
}

impl fmt::Debug for EncryptionPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionPublicKey({})", &self.to_hex()[..16])
    }
}

/// BLAKE3 KDF over the shared secret, both public keys and the algorithm id.
/// Truncated to the algorithm's key length.
fn derive_content_key(
    shared: &[u8; 32],
    ephemeral_public: &EncryptionPublicKey,
    recipient: &EncryptionPublicKey,
    algorithm: DataEncryptionAlgorithm,
) -> Vec<u8> {
    let mut hasher = blake3::Hasher::new_derive_key(CONTENT_KEY_CONTEXT);
    hasher.update(shared);
    hasher.update(&ephemeral_public.bytes);
    hasher.update(&recipient.bytes);
    hasher.update(algorithm.id().as_bytes());
    hasher.finalize().as_bytes()[..algorithm.key_length()].to_vec()
}

// ---------------------------------------------------------------------------
// AES-GCM
// ---------------------------------------------------------------------------

/// A fresh random 96-bit nonce. Never reuse one under the same key.
pub fn generate_nonce() -> [u8; AES_NONCE_LENGTH] {
    let mut nonce = [0u8; AES_NONCE_LENGTH];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypt with AES-GCM and AAD. Returns `ciphertext || tag`.
pub fn seal(
    algorithm: DataEncryptionAlgorithm,
    key: &[u8],
    nonce: &[u8; AES_NONCE_LENGTH],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, EncryptionError> {
    match algorithm {
        DataEncryptionAlgorithm::A128Gcm => seal_with::<Aes128Gcm>(key, nonce, plaintext, aad),
        DataEncryptionAlgorithm::A256Gcm => seal_with::<Aes256Gcm>(key, nonce, plaintext, aad),
    }
}

/// Decrypt data produced by [`seal`]. The nonce and AAD must match.
pub fn open(
    algorithm: DataEncryptionAlgorithm,
    key: &[u8],
    nonce: &[u8],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, EncryptionError> {
    let nonce: &[u8; AES_NONCE_LENGTH] =
        nonce.try_into().map_err(|_| EncryptionError::DecryptFailed)?;
    match algorithm {
        DataEncryptionAlgorithm::A128Gcm => open_with::<Aes128Gcm>(key, nonce, ciphertext, aad),
        DataEncryptionAlgorithm::A256Gcm => open_with::<Aes256Gcm>(key, nonce, ciphertext, aad),
    }
}

fn seal_with<C: Aead + KeyInit>(
    key: &[u8],
    nonce: &[u8; AES_NONCE_LENGTH],
    msg: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, EncryptionError> {
    let cipher = C::new_from_slice(key).map_err(|_| EncryptionError::InvalidKeyLength)?;
    cipher
        .encrypt(AeadNonce::<C>::from_slice(nonce), Payload { msg, aad })
        .map_err(|_| EncryptionError::EncryptFailed)
}

fn open_with<C: Aead + KeyInit>(
    key: &[u8],
    nonce: &[u8; AES_NONCE_LENGTH],
    msg: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, EncryptionError> {
    let cipher = C::new_from_slice(key).map_err(|_| EncryptionError::DecryptFailed)?;
    cipher
        .decrypt(AeadNonce::<C>::from_slice(nonce), Payload { msg, aad })
        .map_err(|_| EncryptionError::DecryptFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agreement_is_symmetric() {
        let recipient = DecryptionKey::generate();
        let (eph, sender_key) = recipient
            .public_key()
            .agree_ephemeral(DataEncryptionAlgorithm::A256Gcm)
            .unwrap();
        let recipient_key = recipient
            .agree(&eph, DataEncryptionAlgorithm::A256Gcm)
            .unwrap();
        assert_eq!(sender_key, recipient_key);
        assert_eq!(sender_key.len(), 32);
    }

    #[test]
    fn content_key_length_follows_algorithm() {
        let recipient = DecryptionKey::generate();
        let (_, key) = recipient
            .public_key()
            .agree_ephemeral(DataEncryptionAlgorithm::A128Gcm)
            .unwrap();
        assert_eq!(key.len(), 16);
    }

    #[test]
    fn seal_open_roundtrip_both_algorithms() {
        for alg in [DataEncryptionAlgorithm::A128Gcm, DataEncryptionAlgorithm::A256Gcm] {
            let key = vec![0x42u8; alg.key_length()];
            let nonce = generate_nonce();
            let ct = seal(alg, &key, &nonce, b"account data", b"header").unwrap();
            let pt = open(alg, &key, &nonce, &ct, b"header").unwrap();
            assert_eq!(pt, b"account data");
        }
    }

    #[test]
    fn wrong_aad_fails() {
        let alg = DataEncryptionAlgorithm::A256Gcm;
        let key = [1u8; 32];
        let nonce = generate_nonce();
        let ct = seal(alg, &key, &nonce, b"secret", b"correct").unwrap();
        assert!(open(alg, &key, &nonce, &ct, b"wrong").is_err());
    }

    #[test]
    fn corrupted_ciphertext_fails() {
        let alg = DataEncryptionAlgorithm::A128Gcm;
        let key = [1u8; 16];
        let nonce = generate_nonce();
        let mut ct = seal(alg, &key, &nonce, b"secret", b"").unwrap();
        ct[0] ^= 0x01;
        assert!(matches!(
            open(alg, &key, &nonce, &ct, b""),
            Err(EncryptionError::DecryptFailed)
        ));
    }

    #[test]
    fn key_length_mismatch_is_rejected() {
        let result = seal(
            DataEncryptionAlgorithm::A256Gcm,
            &[0u8; 16],
            &generate_nonce(),
            b"x",
            b"",
        );
        assert!(matches!(result, Err(EncryptionError::InvalidKeyLength)));
    }

    #[test]
    fn unknown_algorithm_ids_are_rejected() {
        assert!(DataEncryptionAlgorithm::from_id("A192CBC").is_err());
        assert!(KeyEncryptionAlgorithm::from_id("RSA-OAEP-256").is_err());
        assert_eq!(
            DataEncryptionAlgorithm::from_id("A256GCM").unwrap(),
            DataEncryptionAlgorithm::A256Gcm
        );
    }

    #[test]
    fn decryption_key_hex_roundtrip() {
        let key = DecryptionKey::generate();
        let restored = DecryptionKey::from_hex(&key.secret_hex()).unwrap();
        assert_eq!(key.public_key(), restored.public_key());
    }
}
