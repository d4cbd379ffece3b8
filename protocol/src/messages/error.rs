//! Business declines and the generic error envelope payload.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of business decline codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InsufficientFunds,
    ExpiredReservation,
    ExpiredAuthorization,
    AlreadyFinalized,
    AlreadyProcessed,
    BlockedAccount,
    OtherError,
}

impl ErrorCode {
    /// Default human-readable text for the code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::InsufficientFunds => "Insufficient funds",
            ErrorCode::ExpiredReservation => "Reservation has expired",
            ErrorCode::ExpiredAuthorization => "Payment authorization has expired",
            ErrorCode::AlreadyFinalized => "Reservation has already been finalized",
            ErrorCode::AlreadyProcessed => "Payment authorization has already been used",
            ErrorCode::BlockedAccount => "Account is blocked",
            ErrorCode::OtherError => "Payment could not be completed",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::InsufficientFunds => "INSUFFICIENT_FUNDS",
            ErrorCode::ExpiredReservation => "EXPIRED_RESERVATION",
            ErrorCode::ExpiredAuthorization => "EXPIRED_AUTHORIZATION",
            ErrorCode::AlreadyFinalized => "ALREADY_FINALIZED",
            ErrorCode::AlreadyProcessed => "ALREADY_PROCESSED",
            ErrorCode::BlockedAccount => "BLOCKED_ACCOUNT",
            ErrorCode::OtherError => "OTHER_ERROR",
        };
        f.write_str(s)
    }
}

/// A structured, recoverable decline carried inside a signed response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReturn {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorReturn {
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.default_message().to_string(),
        }
    }

    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Payload of the `ErrorResponse` envelope. Unsigned, text only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub description: String,
}
