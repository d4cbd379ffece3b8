//! # Messages
//!
//! Typed payloads for every qualifier, and [`Message`], the tagged union
//! over all of them. Code that must handle "any message" matches on
//! `Message`; the compiler then tells it when a kind is added.

pub mod account;
pub mod authorization;
pub mod error;
pub mod finalize;
pub mod payment;
pub mod reserve;

pub use account::{mask_card_number, AccountDescriptor, AccountType, ProtectedAccountData};
pub use authorization::{AuthorizationData, InvokeWallet, PayerAuthorization, WalletInitialized};
pub use error::{ErrorCode, ErrorResponse, ErrorReturn};
pub use finalize::{FinalizeRequest, FinalizeResponse};
pub use payment::{Payee, PaymentRequest};
pub use reserve::{Approval, ReserveOrDebitRequest, ReserveOrDebitResponse};

use serde::Serialize;

use crate::authority::Authority;
use crate::codec::{self, Envelope, Qualifier};
use crate::PaymentError;

/// Any WebPay document, keyed by its qualifier.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    WalletInitialized(WalletInitialized),
    InvokeWallet(InvokeWallet),
    PayerAuthorization(PayerAuthorization),
    DirectDebitRequest(ReserveOrDebitRequest),
    DirectDebitResponse(ReserveOrDebitResponse),
    ReserveFundsRequest(ReserveOrDebitRequest),
    ReserveFundsResponse(ReserveOrDebitResponse),
    PayeeFinalizeRequest(FinalizeRequest),
    PayeeFinalizeResponse(FinalizeResponse),
    ErrorResponse(ErrorResponse),
    Authority(Authority),
}

impl Message {
    pub fn qualifier(&self) -> Qualifier {
        match self {
            Message::WalletInitialized(_) => Qualifier::WalletInitialized,
            Message::InvokeWallet(_) => Qualifier::InvokeWallet,
            Message::PayerAuthorization(_) => Qualifier::PayerAuthorization,
            Message::DirectDebitRequest(_) => Qualifier::DirectDebitRequest,
            Message::DirectDebitResponse(_) => Qualifier::DirectDebitResponse,
            Message::ReserveFundsRequest(_) => Qualifier::ReserveFundsRequest,
            Message::ReserveFundsResponse(_) => Qualifier::ReserveFundsResponse,
            Message::PayeeFinalizeRequest(_) => Qualifier::PayeeFinalizeRequest,
            Message::PayeeFinalizeResponse(_) => Qualifier::PayeeFinalizeResponse,
            Message::ErrorResponse(_) => Qualifier::ErrorResponse,
            Message::Authority(_) => Qualifier::Authority,
        }
    }

    /// Decode any known message.
    pub fn decode(bytes: &[u8]) -> Result<Self, PaymentError> {
        let qualifier = codec::peek_qualifier(bytes)?;
        let expected = [qualifier];
        Ok(match qualifier {
            Qualifier::WalletInitialized => {
                Message::WalletInitialized(codec::decode(bytes, &expected)?.payload)
            }
            Qualifier::InvokeWallet => {
                Message::InvokeWallet(codec::decode(bytes, &expected)?.payload)
            }
            Qualifier::PayerAuthorization => {
                Message::PayerAuthorization(codec::decode(bytes, &expected)?.payload)
            }
            Qualifier::DirectDebitRequest => {
                Message::DirectDebitRequest(codec::decode(bytes, &expected)?.payload)
            }
            Qualifier::DirectDebitResponse => {
                Message::DirectDebitResponse(codec::decode(bytes, &expected)?.payload)
            }
            Qualifier::ReserveFundsRequest => {
                Message::ReserveFundsRequest(codec::decode(bytes, &expected)?.payload)
            }
            Qualifier::ReserveFundsResponse => {
                Message::ReserveFundsResponse(codec::decode(bytes, &expected)?.payload)
            }
            Qualifier::PayeeFinalizeRequest => {
                Message::PayeeFinalizeRequest(codec::decode(bytes, &expected)?.payload)
            }
            Qualifier::PayeeFinalizeResponse => {
                Message::PayeeFinalizeResponse(codec::decode(bytes, &expected)?.payload)
            }
            Qualifier::ErrorResponse => {
                Message::ErrorResponse(codec::decode(bytes, &expected)?.payload)
            }
            Qualifier::Authority => Message::Authority(codec::decode(bytes, &expected)?.payload),
        })
    }

    /// Canonical wire bytes.
    pub fn encode(&self) -> Result<Vec<u8>, PaymentError> {
        let qualifier = self.qualifier();
        match self {
            Message::WalletInitialized(p) => wrap(qualifier, p),
            Message::InvokeWallet(p) => wrap(qualifier, p),
            Message::PayerAuthorization(p) => wrap(qualifier, p),
            Message::DirectDebitRequest(p) | Message::ReserveFundsRequest(p) => wrap(qualifier, p),
            Message::DirectDebitResponse(p) | Message::ReserveFundsResponse(p) => {
                wrap(qualifier, p)
            }
            Message::PayeeFinalizeRequest(p) => wrap(qualifier, p),
            Message::PayeeFinalizeResponse(p) => wrap(qualifier, p),
            Message::ErrorResponse(p) => wrap(qualifier, p),
            Message::Authority(p) => wrap(qualifier, p),
        }
    }
}

fn wrap<T: Serialize>(qualifier: Qualifier, payload: &T) -> Result<Vec<u8>, PaymentError> {
    Envelope::new(qualifier, payload).to_canonical_bytes()
}

/// Build an `ErrorResponse` envelope.
pub fn error_response(description: impl Into<String>) -> Envelope<ErrorResponse> {
    Envelope::new(
        Qualifier::ErrorResponse,
        ErrorResponse {
            description: description.into(),
        },
    )
}
