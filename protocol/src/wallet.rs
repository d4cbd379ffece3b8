//! The payer's wallet.
//!
//! Checks that the payment request really comes from a merchant in the
//! merchant trust network, signs an authorization with the payer's key and
//! encrypts it for the provider named by the chosen account. The merchant
//! only ever sees routing hints and ciphertext.

use crate::authority::Authority;
use crate::codec::{formats, EncryptedData, Envelope, Qualifier};
use crate::messages::{
    AccountType, AuthorizationData, InvokeWallet, PayerAuthorization, WalletInitialized,
};
use crate::trust::{self, Signer, TrustAnchor};
use crate::PaymentError;

/// A payer account held in the wallet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalletAccount {
    pub account_type: AccountType,
    /// IBAN-ish id for bank accounts, PAN for cards.
    pub account_id: String,
    /// Authority of the provider holding the account.
    pub provider_authority_url: String,
}

pub struct Wallet {
    signer: Signer,
    merchant_root: TrustAnchor,
}

impl Wallet {
    pub fn new(signer: Signer, merchant_root: TrustAnchor) -> Self {
        Self {
            signer,
            merchant_root,
        }
    }

    /// The "ready" signal sent before the merchant invokes the wallet.
    pub fn initialized(&self) -> Envelope<WalletInitialized> {
        Envelope::new(Qualifier::WalletInitialized, WalletInitialized {})
    }

    /// Authorize `invoke` from `account`. `provider` must be the already
    /// resolved Authority behind `account.provider_authority_url`.
    pub fn authorize(
        &self,
        invoke: &Envelope<InvokeWallet>,
        account: &WalletAccount,
        provider: &Authority,
        domain_name: &str,
        client_ip_address: Option<String>,
    ) -> Result<Envelope<PayerAuthorization>, PaymentError> {
        invoke.validate(&[Qualifier::InvokeWallet])?;
        let payment_request = &invoke.payload.payment_request;
        trust::verify(payment_request, &self.merchant_root)?;
        payment_request.validate()?;

        if payment_request.expires <= formats::now() {
            return Err(PaymentError::Protocol(format!(
                "payment request {} has expired",
                payment_request.reference_id
            )));
        }
        if !invoke
            .payload
            .accepted_account_types
            .contains(&account.account_type)
        {
            return Err(PaymentError::Protocol(format!(
                "merchant does not accept {}",
                account.account_type
            )));
        }
        if provider.authority_url != account.provider_authority_url {
            return Err(PaymentError::Protocol(format!(
                "authority {} does not belong to the chosen account",
                provider.authority_url
            )));
        }

        let mut authorization = AuthorizationData {
            payment_request: payment_request.clone(),
            account_type: account.account_type,
            account_id: account.account_id.clone(),
            domain_name: domain_name.to_string(),
            date_time: formats::now(),
            client_ip_address,
            signature: None,
        };
        self.signer.sign(&mut authorization)?;

        let parameters = &provider.encryption_parameters;
        let encrypted = EncryptedData::encrypt(
            &authorization,
            &parameters.public_key,
            &parameters.key_encryption_algorithm,
            &parameters.data_encryption_algorithm,
        )?;
        tracing::debug!(
            reference_id = %payment_request.reference_id,
            account_type = %account.account_type,
            "authorization encrypted for provider"
        );

        Ok(Envelope::new(
            Qualifier::PayerAuthorization,
            PayerAuthorization {
                authorization_data: encrypted,
                provider_authority_url: account.provider_authority_url.clone(),
                account_type: account.account_type,
            },
        ))
    }
}
