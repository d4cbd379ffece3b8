//! Error taxonomy for the payment protocol.
//!
//! Hard failures are [`PaymentError`] variants. Soft business declines are
//! not errors at all: they travel inside a well-formed signed response and
//! surface as [`Outcome::Declined`].

use thiserror::Error;

use crate::crypto::EncryptionError;
use crate::messages::ErrorReturn;

/// Hard failures. Any of these terminates the transaction and is reported to
/// the caller as a generic `ErrorResponse`.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// Bad context, unknown or unexpected qualifier, malformed payload.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Non-success HTTP status, timeout, wrong content type.
    #[error("transport error: {0}")]
    Transport(String),

    /// Invalid signature value, no matching decryption key, unsupported
    /// algorithm, failed decryption.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Certificate path does not terminate at the expected root, or two
    /// certificate paths that must match do not.
    #[error("trust error: {0}")]
    Trust(String),

    /// A request hash does not bind a response to its request.
    #[error("integrity error: {0}")]
    Integrity(String),
}

impl PaymentError {
    /// Short category name, used as a structured log field and metric label.
    pub fn category(&self) -> &'static str {
        match self {
            PaymentError::Protocol(_) => "protocol",
            PaymentError::Transport(_) => "transport",
            PaymentError::Crypto(_) => "crypto",
            PaymentError::Trust(_) => "trust",
            PaymentError::Integrity(_) => "integrity",
        }
    }
}

impl From<EncryptionError> for PaymentError {
    fn from(e: EncryptionError) -> Self {
        PaymentError::Crypto(e.to_string())
    }
}

impl From<serde_json::Error> for PaymentError {
    fn from(e: serde_json::Error) -> Self {
        PaymentError::Protocol(format!("malformed message: {e}"))
    }
}

/// Result of a step that may be declined for business reasons.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome<T> {
    /// The step went through.
    Success(T),
    /// A structured, recoverable decline such as insufficient funds.
    Declined(ErrorReturn),
}

impl<T> Outcome<T> {
    /// Returns `true` for [`Outcome::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// The success value, if any.
    pub fn success(self) -> Option<T> {
        match self {
            Outcome::Success(v) => Some(v),
            Outcome::Declined(_) => None,
        }
    }

    /// The decline, if any.
    pub fn declined(&self) -> Option<&ErrorReturn> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Declined(e) => Some(e),
        }
    }
}
