//! # Reserve / Debit
//!
//! The provider's handling of a merchant-attested authorization:
//!
//! 1. Decrypt the wallet's AuthorizationData.
//! 2. Verify the payer signature against the client root.
//! 3. Verify the embedded PaymentRequest against the merchant root, and the
//!    merchant's outer attestation against the same signer.
//! 4. Bind: the attested request hash must be the hash of that
//!    PaymentRequest.
//! 5. Business checks (expired authorization, expired reservation,
//!    insufficient funds) become signed declines, not errors.
//! 6. Replay: each payment request is honored once. The identical request
//!    gets the first response back, any other request for it is declined.
//! 7. Cards: fetch the acquirer's Authority, encrypt the card data for it.
//!    Bank accounts: pick the payee's first account.
//! 8. Sign and return.
//!
//! Any failure along the way is a hard error. There is no partial response.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::authority::AuthorityResolver;
use crate::codec::{canonical, formats};
use crate::codec::{EncryptedData, Envelope, Qualifier};
use crate::config::{amount_ceiling, RESERVATION_LIFETIME};
use crate::correlation::{ReferenceIdGenerator, ReplayCache, Seen};
use crate::crypto::{blake3_hash, DecryptionKey, RequestHash};
use crate::messages::reserve::response_qualifier;
use crate::messages::{
    mask_card_number, Approval, AuthorizationData, ErrorCode, ErrorReturn, ProtectedAccountData,
    ReserveOrDebitRequest, ReserveOrDebitResponse,
};
use crate::trust::{self, compare_certificate_paths, Signer, TrustAnchor};
use crate::PaymentError;

/// Keys and anchors of a payment provider.
#[derive(Clone, Debug)]
pub struct ProviderConfig {
    pub signer: Signer,
    pub decryption_keys: Vec<DecryptionKey>,
    /// Anchor for payer (wallet) signatures.
    pub client_root: TrustAnchor,
    pub merchant_root: TrustAnchor,
    pub acquirer_root: TrustAnchor,
}

/// Handles `DirectDebitRequest` and `ReserveFundsRequest`.
pub struct ReserveOrDebitOrchestrator {
    config: Arc<ProviderConfig>,
    resolver: AuthorityResolver,
    reference_ids: Arc<ReferenceIdGenerator>,
    /// Approved responses per payment request hash, kept until the payment
    /// request expires.
    processed: ReplayCache<Envelope<ReserveOrDebitResponse>>,
}

impl ReserveOrDebitOrchestrator {
    pub fn new(
        config: Arc<ProviderConfig>,
        resolver: AuthorityResolver,
        reference_ids: Arc<ReferenceIdGenerator>,
    ) -> Self {
        Self {
            config,
            resolver,
            reference_ids,
            processed: ReplayCache::new(),
        }
    }

    pub async fn process(
        &self,
        request: Envelope<ReserveOrDebitRequest>,
    ) -> Result<Envelope<ReserveOrDebitResponse>, PaymentError> {
        let direct_debit = match request.qualifier {
            Qualifier::DirectDebitRequest => true,
            Qualifier::ReserveFundsRequest => false,
            other => {
                return Err(PaymentError::Protocol(format!(
                    "{other} is not a reserve-or-debit request"
                )))
            }
        };
        request.validate(&[request.qualifier])?;
        let attested = &request.payload;
        attested.validate_route(direct_debit)?;

        let authorization: AuthorizationData = attested
            .authorization_data
            .decrypt(&self.config.decryption_keys)?;
        trust::verify(&authorization, &self.config.client_root)?;

        let payment_request = &authorization.payment_request;
        let merchant = trust::verify(payment_request, &self.config.merchant_root)?;
        payment_request.validate()?;

        let attester = trust::verify(&request, &self.config.merchant_root)?;
        compare_certificate_paths(attester, merchant)?;
        if payment_request.request_hash()? != attested.request_hash {
            return Err(PaymentError::Integrity(format!(
                "attested request hash does not match payment request {}",
                payment_request.reference_id
            )));
        }
        if authorization.account_type != attested.account_type {
            return Err(PaymentError::Protocol(format!(
                "account type {} does not match authorized {}",
                attested.account_type, authorization.account_type
            )));
        }

        tracing::info!(
            merchant_reference = %attested.reference_id,
            payee = %payment_request.payee.common_name,
            amount = %payment_request.amount,
            account_type = %authorization.account_type,
            direct_debit,
            "authentic reserve-or-debit request"
        );
        if let Some(ip) = &attested.client_ip_address {
            tracing::info!(client_ip = %ip, "indirect mode, payer address supplied by merchant");
        }

        let now = formats::now();
        let qualifier = response_qualifier(direct_debit);

        if payment_request.expires <= now {
            tracing::info!(
                merchant_reference = %attested.reference_id,
                expired = %payment_request.expires,
                "payment request has expired"
            );
            return self.decline(qualifier, attested.request_hash, ErrorCode::ExpiredAuthorization);
        }
        if attested.expires.is_some_and(|expires| expires <= now) {
            return self.decline(qualifier, attested.request_hash, ErrorCode::ExpiredReservation);
        }
        if payment_request.amount >= amount_ceiling() {
            return self.decline(qualifier, attested.request_hash, ErrorCode::InsufficientFunds);
        }

        let key = *attested.request_hash.as_bytes();
        let fingerprint = blake3_hash(&canonical::to_canonical_bytes(&request)?);
        if let Some(reply) = self.duplicate(
            self.processed.lookup(&key, &fingerprint),
            qualifier,
            attested,
        )? {
            return Ok(reply);
        }

        let expires = if direct_debit {
            None
        } else {
            Some(match attested.expires {
                Some(expires) => expires,
                None => reservation_expiry(now)?,
            })
        };

        let approval = if authorization.account_type.is_acquirer_based() {
            let url = attested.acquirer_authority_url.as_deref().ok_or_else(|| {
                PaymentError::Protocol("card payment without acquirer authority url".into())
            })?;
            let acquirer = self
                .resolver
                .resolve(url, &self.config.acquirer_root)
                .await?;
            let parameters = &acquirer.encryption_parameters;
            let encrypted = EncryptedData::encrypt(
                &ProtectedAccountData::demo(&authorization.account_id),
                &parameters.public_key,
                &parameters.key_encryption_algorithm,
                &parameters.data_encryption_algorithm,
            )?;
            tracing::debug!(acquirer = %url, "card data encrypted for acquirer");
            Approval {
                payment_request: payment_request.clone(),
                account_type: authorization.account_type,
                account_reference: mask_card_number(&authorization.account_id),
                encrypted_account_data: Some(encrypted),
                payee_account: None,
                expires,
            }
        } else {
            let payee_account = attested
                .payee_accounts
                .as_ref()
                .and_then(|accounts| accounts.first())
                .cloned()
                .ok_or_else(|| PaymentError::Protocol("no payee account supplied".into()))?;
            Approval {
                payment_request: payment_request.clone(),
                account_type: authorization.account_type,
                account_reference: authorization.account_id.clone(),
                encrypted_account_data: None,
                payee_account: Some(payee_account),
                expires,
            }
        };

        let response = self.respond(qualifier, attested.request_hash, Some(approval), None)?;
        let seen = self.processed.insert(
            key,
            fingerprint,
            response.clone(),
            payment_request.expires,
            now,
        );
        Ok(self
            .duplicate(seen, qualifier, attested)?
            .unwrap_or(response))
    }

    fn duplicate(
        &self,
        seen: Seen<Envelope<ReserveOrDebitResponse>>,
        qualifier: Qualifier,
        attested: &ReserveOrDebitRequest,
    ) -> Result<Option<Envelope<ReserveOrDebitResponse>>, PaymentError> {
        match seen {
            Seen::New => Ok(None),
            Seen::Identical(previous) => {
                tracing::info!(
                    merchant_reference = %attested.reference_id,
                    reference_id = %previous.payload.reference_id,
                    "replaying reserve-or-debit response"
                );
                Ok(Some(previous))
            }
            Seen::Conflicting => {
                tracing::warn!(
                    merchant_reference = %attested.reference_id,
                    "payment request already processed"
                );
                self.decline(qualifier, attested.request_hash, ErrorCode::AlreadyProcessed)
                    .map(Some)
            }
        }
    }

    fn decline(
        &self,
        qualifier: Qualifier,
        request_hash: RequestHash,
        code: ErrorCode,
    ) -> Result<Envelope<ReserveOrDebitResponse>, PaymentError> {
        tracing::info!(%code, "declining reserve-or-debit request");
        self.respond(qualifier, request_hash, None, Some(ErrorReturn::new(code)))
    }

    fn respond(
        &self,
        qualifier: Qualifier,
        request_hash: RequestHash,
        approval: Option<Approval>,
        error_return: Option<ErrorReturn>,
    ) -> Result<Envelope<ReserveOrDebitResponse>, PaymentError> {
        let mut response = Envelope::new(
            qualifier,
            ReserveOrDebitResponse {
                approval,
                error_return,
                request_hash,
                reference_id: self.reference_ids.next(),
                date_time: formats::now(),
                signature: None,
            },
        );
        self.config.signer.sign(&mut response)?;
        tracing::info!(reference_id = %response.payload.reference_id, %qualifier, "response signed");
        Ok(response)
    }
}

fn reservation_expiry(now: DateTime<Utc>) -> Result<DateTime<Utc>, PaymentError> {
    let lifetime = chrono::Duration::from_std(RESERVATION_LIFETIME)
        .map_err(|e| PaymentError::Protocol(format!("bad reservation lifetime: {e}")))?;
    Ok(now + lifetime)
}
