//! Wallet-side messages: the merchant's invocation, the wallet's readiness
//! signal, and the payer's encrypted authorization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::formats::timestamp;
use crate::codec::EncryptedData;
use crate::trust::{SignatureBlock, Signed};

use super::account::AccountType;
use super::payment::PaymentRequest;

/// Sent by the wallet once it is ready to receive a payment request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletInitialized {}

/// The merchant's request to the wallet: what to pay and which account
/// types are acceptable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeWallet {
    pub payment_request: PaymentRequest,
    pub accepted_account_types: Vec<AccountType>,
}

/// What the payer authorizes. Signed by the payer, then encrypted for the
/// provider; nobody in between reads it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationData {
    pub payment_request: PaymentRequest,
    pub account_type: AccountType,
    pub account_id: String,
    /// Origin of the merchant page as seen by the wallet.
    pub domain_name: String,
    #[serde(with = "timestamp")]
    pub date_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureBlock>,
}

impl Signed for AuthorizationData {
    fn signature(&self) -> Option<&SignatureBlock> {
        self.signature.as_ref()
    }

    fn signature_mut(&mut self) -> &mut Option<SignatureBlock> {
        &mut self.signature
    }
}

/// The wallet's answer to [`InvokeWallet`]. Only routing hints are in the
/// clear.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayerAuthorization {
    pub authorization_data: EncryptedData,
    pub provider_authority_url: String,
    pub account_type: AccountType,
}
