//! # Cryptographic Primitives
//!
//! Every signature, hash and encrypted payload in WebPay flows through here:
//!
//! - **Ed25519** for signatures.
//! - **X25519** ephemeral-static agreement for key encryption.
//! - **AES-GCM** (128 and 256) for content encryption.
//! - **SHA-256** for request hashes, **BLAKE3** for key derivation.
//!
//! Nothing here is novel. These are thin, type-safe wrappers around audited
//! implementations, and they should stay that way.

pub mod encryption;
pub mod hash;
pub mod keys;

pub use encryption::{
    DataEncryptionAlgorithm, DecryptionKey, EncryptionError, EncryptionPublicKey,
    KeyEncryptionAlgorithm,
};
pub use hash::{blake3_hash, sha256, RequestHash};
pub use keys::{KeyError, SigningKeypair, SigningPublicKey};

/// Decode lowercase hex. Uppercase digits are rejected, so every byte
/// string has exactly one accepted encoding.
pub fn decode_hex(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
    if let Some((index, c)) = s.char_indices().find(|(_, c)| c.is_ascii_uppercase()) {
        return Err(hex::FromHexError::InvalidHexCharacter { c, index });
    }
    hex::decode(s)
}
