//! The merchant-signed payment request.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::codec::formats::{amount, timestamp};
use crate::crypto::RequestHash;
use crate::trust::{SignatureBlock, Signed};
use crate::PaymentError;

/// Who gets paid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payee {
    pub common_name: String,
    pub id: String,
}

/// What the payer is asked to authorize. Signed by the merchant, embedded
/// unchanged in the wallet's authorization and echoed back by the provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub payee: Payee,
    #[serde(with = "amount")]
    pub amount: Decimal,
    pub currency: String,
    pub reference_id: String,
    #[serde(with = "timestamp")]
    pub date_time: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub expires: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureBlock>,
}

impl PaymentRequest {
    /// Semantic checks beyond what deserialization enforces.
    pub fn validate(&self) -> Result<(), PaymentError> {
        if self.amount < Decimal::ZERO {
            return Err(PaymentError::Protocol(format!(
                "negative amount {} in payment request {}",
                self.amount, self.reference_id
            )));
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(PaymentError::Protocol(format!(
                "bad currency code: {}",
                self.currency
            )));
        }
        Ok(())
    }

    /// Hash of the canonical signed request. This is the value that ties
    /// every later message of the transaction back to this one.
    pub fn request_hash(&self) -> Result<RequestHash, PaymentError> {
        RequestHash::of_canonical(self)
    }
}

impl Signed for PaymentRequest {
    fn signature(&self) -> Option<&SignatureBlock> {
        self.signature.as_ref()
    }

    fn signature_mut(&mut self) -> &mut Option<SignatureBlock> {
        &mut self.signature
    }
}
