//! # Protocol Configuration & Constants
//!
//! Every magic number in WebPay lives here. Wire identifiers in particular
//! are part of what gets signed and hashed, so changing one of them is a
//! breaking protocol change for every counterparty.

use std::time::Duration;

use rust_decimal::Decimal;

// ---------------------------------------------------------------------------
// Wire Identifiers
// ---------------------------------------------------------------------------

/// The single pinned context URI carried by every envelope. Messages with any
/// other context are rejected before another field is read.
pub const WEBPAY_CONTEXT_URI: &str = "https://webpki.github.io/webpay/v1";

/// The only media type accepted for protocol bodies, in both directions.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Protocol version string reported by nodes.
pub const PROTOCOL_VERSION: &str = "1.0.0";

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// Signature algorithm identifier written into every signature block.
pub const SIGNATURE_ALGORITHM: &str = "Ed25519";

/// Key-encryption algorithm: X25519 ephemeral-static key agreement.
pub const KEY_ENCRYPTION_ECDH_ES: &str = "ECDH-ES";

/// Data-encryption algorithm: AES-128 in Galois/Counter Mode.
pub const DATA_ENCRYPTION_A128GCM: &str = "A128GCM";

/// Data-encryption algorithm: AES-256 in Galois/Counter Mode.
pub const DATA_ENCRYPTION_A256GCM: &str = "A256GCM";

/// Hash algorithm identifier for request hashes.
pub const REQUEST_HASH_ALGORITHM: &str = "S256";

/// AES-GCM nonce length in bytes. 96 bits, the only length worth using.
pub const AES_NONCE_LENGTH: usize = 12;

/// Ed25519 signature length.
pub const SIGNATURE_LENGTH: usize = 64;

/// Public key length for both Ed25519 and X25519 keys.
pub const PUBLIC_KEY_LENGTH: usize = 32;

// ---------------------------------------------------------------------------
// Business Rules
// ---------------------------------------------------------------------------

/// Demo ceiling: any amount at or above this is declined with
/// `INSUFFICIENT_FUNDS`. Nobody in the demo has a million.
pub fn amount_ceiling() -> Decimal {
    Decimal::new(100_000_000, 2)
}

/// Fixed number of decimals used when serializing amounts.
pub const AMOUNT_SCALE: u32 = 2;

/// Lifetime of a reservation (two-phase mode only).
pub const RESERVATION_LIFETIME: Duration = Duration::from_secs(30 * 60);

/// First reference id handed out by a freshly started process.
pub const REFERENCE_ID_SEED: u64 = 164_006;

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Timeout for every outbound call (Authority lookups, provider and acquirer
/// POSTs). Expiry is a hard transport failure; there are no retries.
pub const REQUEST_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Default HTTP port for a node's protocol endpoints.
pub const DEFAULT_HTTP_PORT: u16 = 8442;

/// Default port for the Prometheus metrics endpoint.
pub const DEFAULT_METRICS_PORT: u16 = 9442;

/// Path of the published Authority document on a node.
pub const AUTHORITY_PATH: &str = "/authority";

/// Path of the single transaction endpoint on a node.
pub const TRANSACT_PATH: &str = "/transact";
