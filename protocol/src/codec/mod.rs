//! # Wire Codec
//!
//! How WebPay documents become bytes and back:
//!
//! - [`canonical`]: the single normalized JSON form used for every
//!   signature and every request hash.
//! - [`envelope`]: context + qualifier + typed payload.
//! - [`encrypted`]: hybrid-encrypted payloads addressed to one key.
//! - [`formats`]: amounts and timestamps.
//!
//! If two implementations disagree on a single byte of the canonical form,
//! nothing verifies. Be careful in here.

pub mod canonical;
pub mod encrypted;
pub mod envelope;
pub mod formats;

pub use encrypted::EncryptedData;
pub use envelope::{decode, peek_qualifier, Envelope, Qualifier};
