//! Finalize: the merchant captures a reservation, at the provider for bank
//! accounts or at the acquirer for cards.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::codec::formats::{amount, timestamp};
use crate::codec::Envelope;
use crate::crypto::RequestHash;
use crate::trust::{SignatureBlock, Signed};
use crate::Outcome;

use super::error::ErrorReturn;
use super::reserve::ReserveOrDebitResponse;

/// Merchant to provider or acquirer. Carries the provider's signed
/// reservation by value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeRequest {
    pub embedded_response: Envelope<ReserveOrDebitResponse>,
    /// Amount to capture. Never more than was reserved.
    #[serde(with = "amount")]
    pub amount: Decimal,
    pub reference_id: String,
    #[serde(with = "timestamp")]
    pub date_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureBlock>,
}

impl Signed for FinalizeRequest {
    fn signature(&self) -> Option<&SignatureBlock> {
        self.signature.as_ref()
    }

    fn signature_mut(&mut self) -> &mut Option<SignatureBlock> {
        &mut self.signature
    }
}

/// Confirmation of a finalize request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeResponse {
    /// Hash of the exact finalize request bytes received.
    pub request_hash: RequestHash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_return: Option<ErrorReturn>,
    pub reference_id: String,
    #[serde(with = "timestamp")]
    pub date_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureBlock>,
}

impl FinalizeResponse {
    pub fn outcome(&self) -> Outcome<()> {
        match &self.error_return {
            None => Outcome::Success(()),
            Some(error) => Outcome::Declined(error.clone()),
        }
    }
}

impl Signed for FinalizeResponse {
    fn signature(&self) -> Option<&SignatureBlock> {
        self.signature.as_ref()
    }

    fn signature_mut(&mut self) -> &mut Option<SignatureBlock> {
        &mut self.signature
    }
}
