//! # Merchant Orchestrator
//!
//! The merchant backend's half of a payment, in two HTTP turnarounds:
//!
//! **First turnaround**: [`MerchantOrchestrator::create_payment_request`]
//! signs a PaymentRequest, hands the wallet an `InvokeWallet` envelope and
//! returns the [`TransactionContext`] the caller must keep until the wallet
//! answers.
//!
//! **Second turnaround**: [`MerchantOrchestrator::process`] consumes that
//! context together with the wallet's `PayerAuthorization`:
//!
//! 1. Decode the authorization. The payload stays encrypted; the merchant
//!    cannot read it and does not try.
//! 2. Resolve the provider's Authority against the payment root.
//! 3. Direct debit only for bank accounts outside reserve mode.
//! 4. Attest: wrap the ciphertext verbatim, add the request hash, the route
//!    (acquirer URL or payee accounts) and, in reserve mode, an expiry. Sign.
//! 5. POST to the provider. A decline ends the payment right there.
//! 6. Verify the provider's signature and that its request hash is ours.
//! 7. Two-phase payments finalize at the provider (bank accounts) or at a
//!    freshly resolved acquirer (cards), and the confirmation must hash back
//!    to the exact bytes sent and come from the expected signer.
//!
//! Hard failures carry the URL that was being called when they happened.

use std::fmt;
use std::sync::Arc;

use rust_decimal::Decimal;

use crate::authority::AuthorityResolver;
use crate::codec::{self, formats, Envelope, Qualifier};
use crate::config::RESERVATION_LIFETIME;
use crate::correlation::{ReferenceIdGenerator, TransactionContext};
use crate::crypto::RequestHash;
use crate::messages::reserve::{request_qualifier, response_qualifier};
use crate::messages::{
    AccountDescriptor, AccountType, ErrorResponse, FinalizeRequest, FinalizeResponse,
    InvokeWallet, Payee, PayerAuthorization, PaymentRequest, ReserveOrDebitRequest,
    ReserveOrDebitResponse,
};
use crate::transport::Transport;
use crate::trust::{self, CertificatePath, Signer, TrustAnchor};
use crate::{Outcome, PaymentError};

/// Keys, anchors and payee details of a merchant.
#[derive(Clone, Debug)]
pub struct MerchantConfig {
    pub signer: Signer,
    pub payee: Payee,
    /// Anchor for provider (bank) signatures.
    pub payment_root: TrustAnchor,
    pub acquirer_root: TrustAnchor,
    /// Authority of the acquirer handling this merchant's card payments.
    pub acquirer_authority_url: String,
    /// Accounts offered for account-to-account payments.
    pub payee_accounts: Vec<AccountDescriptor>,
}

/// A hard failure, tagged with the URL being called when it occurred.
#[derive(Debug)]
pub struct MerchantError {
    pub url: Option<String>,
    pub error: PaymentError,
}

impl MerchantError {
    fn local(error: PaymentError) -> Self {
        Self { url: None, error }
    }
}

impl fmt::Display for MerchantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.url {
            Some(url) => write!(f, "URL={url}\n{}", self.error),
            None => write!(f, "{}", self.error),
        }
    }
}

impl std::error::Error for MerchantError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

trait AtUrl<T> {
    fn at(self, url: &str) -> Result<T, MerchantError>;
}

impl<T> AtUrl<T> for Result<T, PaymentError> {
    fn at(self, url: &str) -> Result<T, MerchantError> {
        self.map_err(|error| MerchantError {
            url: Some(url.to_string()),
            error,
        })
    }
}

/// One request/response pair as it crossed the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Exchange {
    pub url: String,
    pub request: String,
    pub response: String,
}

/// Captured exchanges of one payment, in order. Only filled in debug mode.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExchangeTrace {
    pub exchanges: Vec<Exchange>,
}

/// What the merchant shows once a payment went through.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletedPayment {
    /// Provider reference of the reserve-or-debit response.
    pub reference_id: String,
    /// Finalize reference, two-phase payments only.
    pub finalize_reference_id: Option<String>,
    pub payment_request: PaymentRequest,
    pub account_type: AccountType,
    pub account_reference: String,
    pub direct_debit: bool,
    pub acquirer_mode: bool,
    pub trace: Option<ExchangeTrace>,
}

pub struct MerchantOrchestrator {
    config: Arc<MerchantConfig>,
    resolver: AuthorityResolver,
    transport: Arc<dyn Transport>,
    reference_ids: Arc<ReferenceIdGenerator>,
}

impl MerchantOrchestrator {
    pub fn new(
        config: Arc<MerchantConfig>,
        transport: Arc<dyn Transport>,
        reference_ids: Arc<ReferenceIdGenerator>,
    ) -> Self {
        Self {
            config,
            resolver: AuthorityResolver::new(Arc::clone(&transport)),
            transport,
            reference_ids,
        }
    }

    /// First turnaround: sign a payment request and invoke the wallet.
    pub fn create_payment_request(
        &self,
        amount: Decimal,
        currency: &str,
        accepted_account_types: Vec<AccountType>,
        reserve_mode: bool,
        debug: bool,
    ) -> Result<(Envelope<InvokeWallet>, TransactionContext), PaymentError> {
        let now = formats::now();
        let lifetime = chrono::Duration::from_std(RESERVATION_LIFETIME)
            .map_err(|e| PaymentError::Protocol(format!("bad request lifetime: {e}")))?;
        let mut payment_request = PaymentRequest {
            payee: self.config.payee.clone(),
            amount: formats::rescale(amount)?,
            currency: currency.to_string(),
            reference_id: self.reference_ids.next(),
            date_time: now,
            expires: now + lifetime,
            signature: None,
        };
        payment_request.validate()?;
        self.config.signer.sign(&mut payment_request)?;

        let context = TransactionContext {
            request_hash: payment_request.request_hash()?,
            reference_id: payment_request.reference_id.clone(),
            reserve_mode,
            debug,
        };
        tracing::info!(
            reference_id = %context.reference_id,
            amount = %payment_request.amount,
            currency,
            reserve_mode,
            "payment request issued"
        );
        let invoke = Envelope::new(
            Qualifier::InvokeWallet,
            InvokeWallet {
                payment_request,
                accepted_account_types,
            },
        );
        Ok((invoke, context))
    }

    /// Second turnaround: drive the provider (and acquirer) round trips.
    pub async fn process(
        &self,
        context: TransactionContext,
        authorization: &[u8],
        client_ip_address: Option<String>,
    ) -> Result<Outcome<CompletedPayment>, MerchantError> {
        let mut trace = context.debug.then(ExchangeTrace::default);

        let payer: Envelope<PayerAuthorization> =
            codec::decode(authorization, &[Qualifier::PayerAuthorization])
                .map_err(MerchantError::local)?;
        let provider_url = payer.payload.provider_authority_url.as_str();
        let provider = self
            .resolver
            .resolve(provider_url, &self.config.payment_root)
            .await
            .at(provider_url)?;

        let account_type = payer.payload.account_type;
        let acquirer_mode = account_type.is_acquirer_based();
        let direct_debit = !acquirer_mode && !context.reserve_mode;

        let (acquirer_authority_url, payee_accounts) = if acquirer_mode {
            (Some(self.config.acquirer_authority_url.clone()), None)
        } else {
            (None, Some(self.config.payee_accounts.clone()))
        };
        let expires = if context.reserve_mode {
            let lifetime = chrono::Duration::from_std(RESERVATION_LIFETIME)
                .map_err(|e| PaymentError::Protocol(format!("bad reservation lifetime: {e}")))
                .map_err(MerchantError::local)?;
            Some(formats::now() + lifetime)
        } else {
            None
        };
        let mut request = Envelope::new(
            request_qualifier(direct_debit),
            ReserveOrDebitRequest {
                authorization_data: payer.payload.authorization_data.clone(),
                account_type,
                request_hash: context.request_hash,
                reference_id: context.reference_id.clone(),
                acquirer_authority_url,
                payee_accounts,
                client_ip_address,
                expires,
                date_time: formats::now(),
                signature: None,
            },
        );
        self.config
            .signer
            .sign(&mut request)
            .map_err(MerchantError::local)?;

        let transaction_url = provider.transaction_url.as_str();
        let bytes = request.to_canonical_bytes().map_err(MerchantError::local)?;
        let reply = self
            .exchange(transaction_url, bytes, &mut trace)
            .await
            .at(transaction_url)?;
        let response: Envelope<ReserveOrDebitResponse> =
            decode_reply(&reply, response_qualifier(direct_debit)).at(transaction_url)?;
        let bank_path = self
            .check_response(&response, &context)
            .at(transaction_url)?;

        let approval = match response.payload.outcome().at(transaction_url)? {
            Outcome::Success(approval) => approval.clone(),
            Outcome::Declined(error) => {
                tracing::info!(reference_id = %context.reference_id, code = %error.code, "payment declined by provider");
                return Ok(Outcome::Declined(error));
            }
        };
        if approval.account_type != account_type {
            return Err(PaymentError::Protocol(format!(
                "provider approved {} for a {account_type} authorization",
                approval.account_type
            )))
            .at(transaction_url);
        }
        if acquirer_mode && approval.encrypted_account_data.is_none() {
            return Err(PaymentError::Protocol(
                "card approval without encrypted account data".into(),
            ))
            .at(transaction_url);
        }

        let mut finalize_reference_id = None;
        if !direct_debit {
            let (target_url, expected_signer) = if acquirer_mode {
                let url = self.config.acquirer_authority_url.as_str();
                let acquirer = self
                    .resolver
                    .resolve(url, &self.config.acquirer_root)
                    .await
                    .at(url)?;
                let signer = acquirer.signer_path().at(url)?.clone();
                (acquirer.transaction_url, signer)
            } else {
                (provider.transaction_url.clone(), bank_path)
            };

            let finalized = self
                .finalize(
                    &target_url,
                    &expected_signer,
                    response.clone(),
                    approval.payment_request.amount,
                    &context,
                    &mut trace,
                )
                .await
                .at(&target_url)?;
            match finalized.outcome() {
                Outcome::Success(()) => finalize_reference_id = Some(finalized.reference_id),
                Outcome::Declined(error) => {
                    tracing::info!(reference_id = %context.reference_id, code = %error.code, "finalize declined");
                    return Ok(Outcome::Declined(error));
                }
            }
        }

        tracing::info!(
            reference_id = %context.reference_id,
            provider_reference = %response.payload.reference_id,
            account_type = %account_type,
            direct_debit,
            acquirer_mode,
            "payment completed"
        );
        Ok(Outcome::Success(CompletedPayment {
            reference_id: response.payload.reference_id.clone(),
            finalize_reference_id,
            payment_request: approval.payment_request,
            account_type,
            account_reference: approval.account_reference,
            direct_debit,
            acquirer_mode,
            trace,
        }))
    }

    /// Provider signature, then request hash binding. Returns the provider's
    /// certificate path.
    fn check_response(
        &self,
        response: &Envelope<ReserveOrDebitResponse>,
        context: &TransactionContext,
    ) -> Result<CertificatePath, PaymentError> {
        let bank_path = trust::verify(response, &self.config.payment_root)?.clone();
        if response.payload.request_hash != context.request_hash {
            return Err(PaymentError::Integrity(format!(
                "provider response is not bound to request {}",
                context.reference_id
            )));
        }
        if let Some(approval) = &response.payload.approval {
            if approval.payment_request.request_hash()? != context.request_hash {
                return Err(PaymentError::Integrity(
                    "approved payment request differs from the one issued".into(),
                ));
            }
        }
        Ok(bank_path)
    }

    async fn finalize(
        &self,
        url: &str,
        expected_signer: &CertificatePath,
        embedded_response: Envelope<ReserveOrDebitResponse>,
        amount: Decimal,
        context: &TransactionContext,
        trace: &mut Option<ExchangeTrace>,
    ) -> Result<FinalizeResponse, PaymentError> {
        let mut request = Envelope::new(
            Qualifier::PayeeFinalizeRequest,
            FinalizeRequest {
                embedded_response,
                amount,
                reference_id: context.reference_id.clone(),
                date_time: formats::now(),
                signature: None,
            },
        );
        self.config.signer.sign(&mut request)?;
        let bytes = request.to_canonical_bytes()?;
        let sent_hash = RequestHash::of(&bytes);

        let reply = self.exchange(url, bytes, trace).await?;
        let response: Envelope<FinalizeResponse> =
            decode_reply(&reply, Qualifier::PayeeFinalizeResponse)?;
        trust::verify_with_path(&response, expected_signer)?;
        if response.payload.request_hash != sent_hash {
            return Err(PaymentError::Integrity(format!(
                "finalize response is not bound to request {}",
                context.reference_id
            )));
        }
        Ok(response.payload)
    }

    async fn exchange(
        &self,
        url: &str,
        body: Vec<u8>,
        trace: &mut Option<ExchangeTrace>,
    ) -> Result<Vec<u8>, PaymentError> {
        let request_text = trace
            .as_ref()
            .map(|_| String::from_utf8_lossy(&body).into_owned());
        tracing::debug!(url, bytes = body.len(), "posting");
        let reply = self.transport.post(url, body).await?.into_json_body(url)?;
        if let (Some(trace), Some(request)) = (trace.as_mut(), request_text) {
            trace.exchanges.push(Exchange {
                url: url.to_string(),
                request,
                response: String::from_utf8_lossy(&reply).into_owned(),
            });
        }
        Ok(reply)
    }
}

/// Decode a counterparty reply of kind `expected`, turning an
/// `ErrorResponse` into a hard failure carrying its description.
fn decode_reply<T: serde::de::DeserializeOwned>(
    bytes: &[u8],
    expected: Qualifier,
) -> Result<Envelope<T>, PaymentError> {
    if codec::peek_qualifier(bytes)? == Qualifier::ErrorResponse {
        let error: Envelope<ErrorResponse> = codec::decode(bytes, &[Qualifier::ErrorResponse])?;
        return Err(PaymentError::Protocol(format!(
            "counterparty reported: {}",
            error.payload.description
        )));
    }
    codec::decode(bytes, &[expected])
}
