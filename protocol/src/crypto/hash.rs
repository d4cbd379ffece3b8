//! # Hashing Utilities
//!
//! Two hashes, two jobs:
//!
//! - **SHA-256**: request hashes. These cross organizational boundaries
//!   (merchant to provider, provider to acquirer), so they use the hash every
//!   counterparty already has.
//! - **BLAKE3**: internal bookkeeping only: the content-key KDF and the
//!   finalize replay cache key. Nothing outside the process ever sees these.
//!
//! A request hash is always computed over canonical bytes. Hashing the
//! on-the-wire bytes of a re-serialized document is how two honest parties
//! end up disagreeing about the same message.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::codec::canonical;
use crate::PaymentError;

/// SHA-256 of the input.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// BLAKE3 of the input.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// SHA-256 digest binding a response (or an attestation) to the exact
/// request it answers. Serialized as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RequestHash([u8; 32]);

impl RequestHash {
    /// Hash raw bytes. Callers are expected to pass canonical bytes.
    pub fn of(bytes: &[u8]) -> Self {
        Self(sha256(bytes))
    }

    /// Serialize `value` canonically, then hash.
    pub fn of_canonical<T: Serialize>(value: &T) -> Result<Self, PaymentError> {
        Ok(Self::of(&canonical::to_canonical_bytes(value)?))
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl TryFrom<String> for RequestHash {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let bytes = super::decode_hex(&value).map_err(|e| format!("request hash is not hex: {e}"))?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| format!("request hash must be 32 bytes, got {}", bytes.len()))?;
        Ok(Self(arr))
    }
}

impl From<RequestHash> for String {
    fn from(hash: RequestHash) -> Self {
        hash.to_hex()
    }
}

impl fmt::Display for RequestHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for RequestHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestHash({})", &self.to_hex()[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            hex::encode(sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn canonical_hash_ignores_key_order() {
        let a: serde_json::Value = serde_json::from_str(r#"{"b":1,"a":2}"#).unwrap();
        let b: serde_json::Value = serde_json::from_str(r#"{"a":2,"b":1}"#).unwrap();
        assert_eq!(
            RequestHash::of_canonical(&a).unwrap(),
            RequestHash::of_canonical(&b).unwrap()
        );
    }

    #[test]
    fn hex_serde_roundtrip() {
        let h = RequestHash::of(b"payment request");
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json.len(), 64 + 2);
        let back: RequestHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, h);
    }

    #[test]
    fn short_hash_is_rejected() {
        assert!(serde_json::from_str::<RequestHash>("\"abcd\"").is_err());
    }
}
