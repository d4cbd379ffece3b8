//! Account types, payee account descriptors and the card data that only the
//! acquirer ever gets to read.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::codec::formats::timestamp;

/// Closed set of payer account types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountType {
    /// Plain account-to-account transfer.
    #[serde(rename = "bank-account")]
    BankAccount,
    #[serde(rename = "super-card")]
    SuperCard,
    #[serde(rename = "cool-card")]
    CoolCard,
}

impl AccountType {
    /// Card schemes settle through an acquirer; bank accounts do not.
    pub fn is_acquirer_based(&self) -> bool {
        matches!(self, AccountType::SuperCard | AccountType::CoolCard)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::BankAccount => "bank-account",
            AccountType::SuperCard => "super-card",
            AccountType::CoolCard => "cool-card",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payee's receiving account, as offered by the merchant for
/// account-to-account payments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDescriptor {
    /// Scheme of the account, usually the provider's URL.
    #[serde(rename = "type")]
    pub type_uri: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}

impl AccountDescriptor {
    pub fn new(type_uri: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            type_uri: type_uri.into(),
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// Card data encrypted by the provider for the acquirer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectedAccountData {
    pub account_id: String,
    pub account_holder: String,
    #[serde(with = "timestamp")]
    pub expires: DateTime<Utc>,
    pub account_security_code: String,
}

impl ProtectedAccountData {
    /// Demo card data for an account id. The provider has no card database,
    /// so holder, expiry and security code are fixed.
    pub fn demo(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            account_holder: "Luke Skywalker".to_string(),
            expires: Utc
                .with_ymd_and_hms(2030, 12, 1, 0, 0, 0)
                .single()
                .unwrap_or_else(Utc::now),
            account_security_code: "943".to_string(),
        }
    }
}

/// Log-safe view of [`ProtectedAccountData`].
pub struct ProtectedAccountDataRedacted<'a>(pub &'a ProtectedAccountData);

impl fmt::Debug for ProtectedAccountDataRedacted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ProtectedAccountData({}, holder={})",
            mask_card_number(&self.0.account_id),
            self.0.account_holder
        )
    }
}

/// Mask everything except the last four digits.
pub fn mask_card_number(pan: &str) -> String {
    let digits: Vec<char> = pan.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() <= 4 {
        return "*".repeat(digits.len());
    }
    let visible: String = digits[digits.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(digits.len() - 4), visible)
}
