//! # Message Envelope
//!
//! Every WebPay document on the wire is an envelope: the pinned context URI,
//! a qualifier naming the message kind, and the kind's payload fields
//! flattened alongside them.
//!
//! ```json
//! {"@context":"https://webpki.github.io/webpay/v1","@qualifier":"ReserveFundsRequest", ...}
//! ```
//!
//! Decoding checks, in order: the context URI, that the qualifier is one we
//! know, and that it is one the caller was willing to accept here. Only then
//! are payload fields looked at. Each failure is a protocol error.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

use super::canonical;
use crate::config::WEBPAY_CONTEXT_URI;
use crate::PaymentError;

const CONTEXT_KEY: &str = "@context";
const QUALIFIER_KEY: &str = "@qualifier";

// ---------------------------------------------------------------------------
// Qualifier
// ---------------------------------------------------------------------------

/// The closed set of message kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Qualifier {
    WalletInitialized,
    InvokeWallet,
    PayerAuthorization,
    DirectDebitRequest,
    DirectDebitResponse,
    ReserveFundsRequest,
    ReserveFundsResponse,
    PayeeFinalizeRequest,
    PayeeFinalizeResponse,
    ErrorResponse,
    Authority,
}

impl Qualifier {
    /// Every qualifier, in declaration order.
    pub const ALL: [Qualifier; 11] = [
        Qualifier::WalletInitialized,
        Qualifier::InvokeWallet,
        Qualifier::PayerAuthorization,
        Qualifier::DirectDebitRequest,
        Qualifier::DirectDebitResponse,
        Qualifier::ReserveFundsRequest,
        Qualifier::ReserveFundsResponse,
        Qualifier::PayeeFinalizeRequest,
        Qualifier::PayeeFinalizeResponse,
        Qualifier::ErrorResponse,
        Qualifier::Authority,
    ];

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Qualifier::WalletInitialized => "WalletInitialized",
            Qualifier::InvokeWallet => "InvokeWallet",
            Qualifier::PayerAuthorization => "PayerAuthorization",
            Qualifier::DirectDebitRequest => "DirectDebitRequest",
            Qualifier::DirectDebitResponse => "DirectDebitResponse",
            Qualifier::ReserveFundsRequest => "ReserveFundsRequest",
            Qualifier::ReserveFundsResponse => "ReserveFundsResponse",
            Qualifier::PayeeFinalizeRequest => "PayeeFinalizeRequest",
            Qualifier::PayeeFinalizeResponse => "PayeeFinalizeResponse",
            Qualifier::ErrorResponse => "ErrorResponse",
            Qualifier::Authority => "Authority",
        }
    }

    /// Parse a wire name. Unknown names are a protocol error.
    pub fn parse(s: &str) -> Result<Self, PaymentError> {
        Qualifier::ALL
            .iter()
            .copied()
            .find(|q| q.as_str() == s)
            .ok_or_else(|| PaymentError::Protocol(format!("unknown qualifier: {s}")))
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Qualifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Qualifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Qualifier::parse(&raw).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// A typed protocol document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(rename = "@context")]
    pub context: String,
    #[serde(rename = "@qualifier")]
    pub qualifier: Qualifier,
    #[serde(flatten)]
    pub payload: T,
}

impl<T> Envelope<T> {
    /// Wrap a payload under the pinned context.
    pub fn new(qualifier: Qualifier, payload: T) -> Self {
        Self {
            context: WEBPAY_CONTEXT_URI.to_string(),
            qualifier,
            payload,
        }
    }

    /// Check context and qualifier against what the caller expects.
    pub fn validate(&self, expected: &[Qualifier]) -> Result<(), PaymentError> {
        check_context(&self.context)?;
        check_expected(self.qualifier, expected)
    }
}

impl<T: Serialize> Envelope<T> {
    /// The canonical wire bytes. This is what gets POSTed and hashed.
    pub fn to_canonical_bytes(&self) -> Result<Vec<u8>, PaymentError> {
        canonical::to_canonical_bytes(self)
    }
}

/// Decode an envelope of one of the `expected` kinds.
pub fn decode<T: DeserializeOwned>(
    bytes: &[u8],
    expected: &[Qualifier],
) -> Result<Envelope<T>, PaymentError> {
    let value: Value = serde_json::from_slice(bytes)?;
    let qualifier = header(&value)?;
    check_expected(qualifier, expected)?;
    Ok(serde_json::from_value(value)?)
}

/// Read the qualifier of a document after checking its context, without
/// touching the payload. Used for dispatch.
pub fn peek_qualifier(bytes: &[u8]) -> Result<Qualifier, PaymentError> {
    let value: Value = serde_json::from_slice(bytes)?;
    header(&value)
}

fn header(value: &Value) -> Result<Qualifier, PaymentError> {
    let object = value
        .as_object()
        .ok_or_else(|| PaymentError::Protocol("message is not a JSON object".into()))?;
    let context = object
        .get(CONTEXT_KEY)
        .and_then(Value::as_str)
        .ok_or_else(|| PaymentError::Protocol("missing @context".into()))?;
    check_context(context)?;
    let qualifier = object
        .get(QUALIFIER_KEY)
        .and_then(Value::as_str)
        .ok_or_else(|| PaymentError::Protocol("missing @qualifier".into()))?;
    Qualifier::parse(qualifier)
}

fn check_context(context: &str) -> Result<(), PaymentError> {
    if context != WEBPAY_CONTEXT_URI {
        return Err(PaymentError::Protocol(format!("unexpected context: {context}")));
    }
    Ok(())
}

fn check_expected(qualifier: Qualifier, expected: &[Qualifier]) -> Result<(), PaymentError> {
    if !expected.contains(&qualifier) {
        return Err(PaymentError::Protocol(format!(
            "unexpected qualifier {qualifier}, wanted one of {expected:?}"
        )));
    }
    Ok(())
}
