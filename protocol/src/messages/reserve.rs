//! Reserve-or-debit: the merchant-attested request and the provider's
//! signed answer.
//!
//! One payload type serves both the direct-debit and the reserve-funds
//! variants. Which one it is lives in the envelope qualifier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::formats::{optional_timestamp, timestamp};
use crate::codec::{EncryptedData, Qualifier};
use crate::crypto::RequestHash;
use crate::trust::{SignatureBlock, Signed};
use crate::{Outcome, PaymentError};

use super::account::{AccountDescriptor, AccountType};
use super::error::ErrorReturn;
use super::payment::PaymentRequest;

/// Merchant to provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveOrDebitRequest {
    /// The wallet's ciphertext, relayed byte for byte.
    pub authorization_data: EncryptedData,
    pub account_type: AccountType,
    /// Hash of the payment request the merchant issued.
    pub request_hash: RequestHash,
    pub reference_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acquirer_authority_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payee_accounts: Option<Vec<AccountDescriptor>>,
    /// Payer address as observed by the merchant (indirect mode).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ip_address: Option<String>,
    /// Reservation expiry. Two-phase mode only.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "optional_timestamp"
    )]
    pub expires: Option<DateTime<Utc>>,
    #[serde(with = "timestamp")]
    pub date_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureBlock>,
}

impl ReserveOrDebitRequest {
    /// Check that exactly one settlement route is present and that it fits
    /// the account type and the request kind.
    pub fn validate_route(&self, direct_debit: bool) -> Result<(), PaymentError> {
        match (&self.acquirer_authority_url, &self.payee_accounts) {
            (Some(_), Some(_)) => Err(PaymentError::Protocol(
                "both acquirer url and payee accounts present".into(),
            )),
            (None, None) => Err(PaymentError::Protocol(
                "neither acquirer url nor payee accounts present".into(),
            )),
            (Some(_), None) if !self.account_type.is_acquirer_based() => {
                Err(PaymentError::Protocol(format!(
                    "acquirer url given for non-card account type {}",
                    self.account_type
                )))
            }
            (None, Some(_)) if self.account_type.is_acquirer_based() => {
                Err(PaymentError::Protocol(format!(
                    "payee accounts given for card account type {}",
                    self.account_type
                )))
            }
            (None, Some(accounts)) if accounts.is_empty() => {
                Err(PaymentError::Protocol("empty payee account list".into()))
            }
            _ if direct_debit && self.account_type.is_acquirer_based() => {
                Err(PaymentError::Protocol(
                    "card payments cannot be direct debits".into(),
                ))
            }
            _ => Ok(()),
        }
    }
}

impl Signed for ReserveOrDebitRequest {
    fn signature(&self) -> Option<&SignatureBlock> {
        self.signature.as_ref()
    }

    fn signature_mut(&mut self) -> &mut Option<SignatureBlock> {
        &mut self.signature
    }
}

/// The successful half of a reserve-or-debit response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Approval {
    pub payment_request: PaymentRequest,
    pub account_type: AccountType,
    /// Unmasked for bank accounts, last four digits only for cards.
    pub account_reference: String,
    /// Card data for the acquirer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_account_data: Option<EncryptedData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payee_account: Option<AccountDescriptor>,
    /// End of the reservation. Absent for direct debits.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "optional_timestamp"
    )]
    pub expires: Option<DateTime<Utc>>,
}

/// Provider to merchant. Exactly one of `approval` and `error_return`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveOrDebitResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval: Option<Approval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_return: Option<ErrorReturn>,
    pub request_hash: RequestHash,
    pub reference_id: String,
    #[serde(with = "timestamp")]
    pub date_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureBlock>,
}

impl ReserveOrDebitResponse {
    /// Approval or decline. Both or neither is malformed.
    pub fn outcome(&self) -> Result<Outcome<&Approval>, PaymentError> {
        match (&self.approval, &self.error_return) {
            (Some(approval), None) => Ok(Outcome::Success(approval)),
            (None, Some(error)) => Ok(Outcome::Declined(error.clone())),
            _ => Err(PaymentError::Protocol(format!(
                "response {} must carry exactly one of approval and errorReturn",
                self.reference_id
            ))),
        }
    }
}

impl Signed for ReserveOrDebitResponse {
    fn signature(&self) -> Option<&SignatureBlock> {
        self.signature.as_ref()
    }

    fn signature_mut(&mut self) -> &mut Option<SignatureBlock> {
        &mut self.signature
    }
}

/// Request qualifier for a mode.
pub fn request_qualifier(direct_debit: bool) -> Qualifier {
    if direct_debit {
        Qualifier::DirectDebitRequest
    } else {
        Qualifier::ReserveFundsRequest
    }
}

/// Response qualifier matching a request qualifier.
pub fn response_qualifier(direct_debit: bool) -> Qualifier {
    if direct_debit {
        Qualifier::DirectDebitResponse
    } else {
        Qualifier::ReserveFundsResponse
    }
}
