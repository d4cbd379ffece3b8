//! # Encrypted Data
//!
//! A JSON object carrying a payload readable only by the holder of one named
//! X25519 key. The header (algorithms, key id, ephemeral key, IV) travels in
//! the clear and is bound to the ciphertext as AES-GCM additional data, so
//! swapping any header field breaks decryption.
//!
//! The merchant relays these objects verbatim. It never has the key.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::canonical;
use crate::crypto::encryption::{self, EncryptionError};
use crate::crypto::{
    decode_hex, DataEncryptionAlgorithm, DecryptionKey, EncryptionPublicKey, KeyEncryptionAlgorithm,
};
use crate::PaymentError;

/// Hybrid-encrypted payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedData {
    pub data_encryption_algorithm: String,
    pub key_encryption_algorithm: String,
    /// Hex public key of the intended recipient.
    pub key_id: String,
    pub ephemeral_key: EncryptionPublicKey,
    /// Hex AES-GCM nonce.
    pub iv: String,
    /// Hex ciphertext with the authentication tag appended.
    pub cipher_text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Header<'a> {
    data_encryption_algorithm: &'a str,
    key_encryption_algorithm: &'a str,
    key_id: &'a str,
    ephemeral_key: &'a EncryptionPublicKey,
    iv: &'a str,
}

impl EncryptedData {
    /// Encrypt the canonical serialization of `payload` for `recipient`.
    pub fn encrypt<T: Serialize>(
        payload: &T,
        recipient: &EncryptionPublicKey,
        key_algorithm: &str,
        data_algorithm: &str,
    ) -> Result<Self, PaymentError> {
        let key_alg = KeyEncryptionAlgorithm::from_id(key_algorithm)?;
        let data_alg = DataEncryptionAlgorithm::from_id(data_algorithm)?;
        let plaintext = canonical::to_canonical_bytes(payload)?;

        let (ephemeral_key, content_key) = match key_alg {
            KeyEncryptionAlgorithm::EcdhEs => recipient.agree_ephemeral(data_alg)?,
        };

        // The IV is part of the header and the header is the AAD, so the
        // nonce has to be known before sealing.
        let nonce = encryption::generate_nonce();
        let iv = hex::encode(nonce);
        let key_id = recipient.to_hex();

        let aad = header_bytes(&Header {
            data_encryption_algorithm: data_alg.id(),
            key_encryption_algorithm: key_alg.id(),
            key_id: &key_id,
            ephemeral_key: &ephemeral_key,
            iv: &iv,
        })?;
        let cipher_text = encryption::seal(data_alg, &content_key, &nonce, &plaintext, &aad)?;

        Ok(Self {
            data_encryption_algorithm: data_alg.id().to_string(),
            key_encryption_algorithm: key_alg.id().to_string(),
            key_id,
            ephemeral_key,
            iv,
            cipher_text: hex::encode(cipher_text),
        })
    }

    /// Decrypt with whichever key in `keys` matches the key id.
    pub fn decrypt<T: DeserializeOwned>(&self, keys: &[DecryptionKey]) -> Result<T, PaymentError> {
        let data_alg = DataEncryptionAlgorithm::from_id(&self.data_encryption_algorithm)?;
        let key_alg = KeyEncryptionAlgorithm::from_id(&self.key_encryption_algorithm)?;
        let key = keys
            .iter()
            .find(|k| k.public_key().to_hex() == self.key_id)
            .ok_or_else(|| {
                PaymentError::Crypto(format!("no decryption key matches key id {}", self.key_id))
            })?;

        let content_key = match key_alg {
            KeyEncryptionAlgorithm::EcdhEs => key.agree(&self.ephemeral_key, data_alg)?,
        };
        let nonce = decode_hex(&self.iv).map_err(|_| EncryptionError::DecryptFailed)?;
        let cipher_text = decode_hex(&self.cipher_text).map_err(|_| EncryptionError::DecryptFailed)?;
        let aad = header_bytes(&Header {
            data_encryption_algorithm: &self.data_encryption_algorithm,
            key_encryption_algorithm: &self.key_encryption_algorithm,
            key_id: &self.key_id,
            ephemeral_key: &self.ephemeral_key,
            iv: &self.iv,
        })?;

        let plaintext = encryption::open(data_alg, &content_key, &nonce, &cipher_text, &aad)?;
        serde_json::from_slice(&plaintext)
            .map_err(|e| PaymentError::Protocol(format!("decrypted payload is malformed: {e}")))
    }
}

fn header_bytes(header: &Header<'_>) -> Result<Vec<u8>, PaymentError> {
    canonical::to_canonical_bytes(header)
}
