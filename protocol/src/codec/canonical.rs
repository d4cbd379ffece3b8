//! Canonical JSON.
//!
//! Object keys sorted by code point, no insignificant whitespace, strings
//! escaped the way serde_json escapes them. Signatures and request hashes are
//! always computed over this form, never over whatever bytes happened to
//! arrive on the wire.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::PaymentError;

/// Key of the embedded signature block on signed documents.
pub const SIGNATURE_KEY: &str = "signature";

/// Serialize any value into canonical bytes.
pub fn to_canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, PaymentError> {
    let value = serde_json::to_value(value)?;
    Ok(canonical_value_bytes(&value))
}

/// Canonical bytes of an already-parsed JSON value.
pub fn canonical_value_bytes(value: &Value) -> Vec<u8> {
    let mut out = Vec::with_capacity(256);
    write_value(&mut out, value);
    out
}

/// Re-encode arbitrary JSON bytes into canonical form.
pub fn normalize(bytes: &[u8]) -> Result<Vec<u8>, PaymentError> {
    let value: Value = serde_json::from_slice(bytes)?;
    Ok(canonical_value_bytes(&value))
}

/// The bytes a signer signs: the canonical form of the document with its
/// top-level `signature` member removed.
pub fn signing_payload<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, PaymentError> {
    let mut value = serde_json::to_value(value)?;
    match value.as_object_mut() {
        Some(map) => {
            map.remove(SIGNATURE_KEY);
        }
        None => {
            return Err(PaymentError::Protocol(
                "only JSON objects can be signed".into(),
            ))
        }
    }
    Ok(canonical_value_bytes(&value))
}

fn write_value(out: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Object(map) => write_object(out, map),
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(out, item);
            }
            out.push(b']');
        }
        // Display on a leaf Value is its compact JSON encoding.
        leaf => out.extend_from_slice(leaf.to_string().as_bytes()),
    }
}

fn write_object(out: &mut Vec<u8>, map: &Map<String, Value>) {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort_unstable();
    out.push(b'{');
    for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
            out.push(b',');
        }
        out.extend_from_slice(Value::String(key.clone()).to_string().as_bytes());
        out.push(b':');
        write_value(out, &map[key]);
    }
    out.push(b'}');
}
