//! # Finalize
//!
//! Capture of a reservation, run by the provider (bank accounts) or by the
//! acquirer (cards). Trust comes first: the embedded reservation must carry
//! the exact certificate path of the provider we expect, or nothing else is
//! looked at.
//!
//! Retries are handled by [`DuplicateFinalizePolicy`]. Under `Replay` the
//! orchestrator remembers each reservation it finalized, keyed by the
//! BLAKE3 hash of the canonical embedded response, until the reservation
//! expires. After that a retry is declined as expired anyway.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::codec::{canonical, formats, Envelope, Qualifier};
use crate::correlation::{ReferenceIdGenerator, ReplayCache, Seen};
use crate::crypto::{blake3_hash, DecryptionKey, RequestHash};
use crate::messages::account::ProtectedAccountDataRedacted;
use crate::messages::{
    ErrorCode, ErrorReturn, FinalizeRequest, FinalizeResponse, ProtectedAccountData,
};
use crate::trust::{self, compare_certificate_paths, CertificatePath, Signer, TrustAnchor};
use crate::{Outcome, PaymentError};

/// What to do when the same reservation is finalized twice.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DuplicateFinalizePolicy {
    /// A byte-identical retry gets the stored response back; any other
    /// request for the same reservation is declined `ALREADY_FINALIZED`.
    #[default]
    Replay,
    /// Every well-formed request is confirmed afresh.
    Reprocess,
}

/// Keys and anchors of a finalizing party.
#[derive(Clone, Debug)]
pub struct FinalizeConfig {
    pub signer: Signer,
    /// The provider path every embedded reservation must be signed under.
    pub expected_issuer: CertificatePath,
    pub merchant_root: TrustAnchor,
    /// Needed by acquirers to open card data. Empty for a bank.
    pub decryption_keys: Vec<DecryptionKey>,
    pub duplicate_policy: DuplicateFinalizePolicy,
}

/// Handles `PayeeFinalizeRequest`.
pub struct FinalizeOrchestrator {
    config: Arc<FinalizeConfig>,
    reference_ids: Arc<ReferenceIdGenerator>,
    finalized: ReplayCache<Envelope<FinalizeResponse>>,
}

impl FinalizeOrchestrator {
    pub fn new(config: Arc<FinalizeConfig>, reference_ids: Arc<ReferenceIdGenerator>) -> Self {
        Self {
            config,
            reference_ids,
            finalized: ReplayCache::new(),
        }
    }

    /// `request_hash` is the hash of the request bytes as received.
    pub fn process(
        &self,
        request: &Envelope<FinalizeRequest>,
        request_hash: RequestHash,
    ) -> Result<Envelope<FinalizeResponse>, PaymentError> {
        request.validate(&[Qualifier::PayeeFinalizeRequest])?;
        let embedded = &request.payload.embedded_response;
        trust::verify_with_path(embedded, &self.config.expected_issuer)?;
        embedded.validate(&[Qualifier::ReserveFundsResponse])?;

        let approval = match embedded.payload.outcome()? {
            Outcome::Success(approval) => approval,
            Outcome::Declined(error) => {
                return Err(PaymentError::Protocol(format!(
                    "cannot finalize a declined reservation ({})",
                    error.code
                )))
            }
        };

        let attester = trust::verify(request, &self.config.merchant_root)?;
        let merchant = trust::verify(&approval.payment_request, &self.config.merchant_root)?;
        compare_certificate_paths(attester, merchant)?;

        let amount = request.payload.amount;
        if amount < Decimal::ZERO || amount > approval.payment_request.amount {
            return Err(PaymentError::Protocol(format!(
                "capture amount {amount} outside reserved {}",
                approval.payment_request.amount
            )));
        }

        if let Some(encrypted) = &approval.encrypted_account_data {
            let card: ProtectedAccountData = encrypted.decrypt(&self.config.decryption_keys)?;
            tracing::info!(card = ?ProtectedAccountDataRedacted(&card), "card data recovered");
        }

        let reservation = &embedded.payload.reference_id;
        let now = formats::now();
        let expires = approval.expires.unwrap_or(approval.payment_request.expires);
        if expires <= now {
            tracing::info!(reservation = %reservation, "reservation expired before finalize");
            return self.respond(request_hash, Some(ErrorReturn::new(ErrorCode::ExpiredReservation)));
        }

        if self.config.duplicate_policy == DuplicateFinalizePolicy::Reprocess {
            return self.respond(request_hash, None);
        }

        let key = blake3_hash(&canonical::to_canonical_bytes(embedded)?);
        let fingerprint = *request_hash.as_bytes();
        if let Some(reply) =
            self.duplicate(self.finalized.lookup(&key, &fingerprint), request_hash, reservation)?
        {
            return Ok(reply);
        }
        let response = self.respond(request_hash, None)?;
        let seen = self
            .finalized
            .insert(key, fingerprint, response.clone(), expires, now);
        Ok(self
            .duplicate(seen, request_hash, reservation)?
            .unwrap_or(response))
    }

    fn duplicate(
        &self,
        seen: Seen<Envelope<FinalizeResponse>>,
        request_hash: RequestHash,
        reservation: &str,
    ) -> Result<Option<Envelope<FinalizeResponse>>, PaymentError> {
        match seen {
            Seen::New => Ok(None),
            Seen::Identical(previous) => {
                tracing::info!(reservation, "replaying finalize response");
                Ok(Some(previous))
            }
            Seen::Conflicting => {
                tracing::warn!(reservation, "reservation already finalized");
                self.respond(request_hash, Some(ErrorReturn::new(ErrorCode::AlreadyFinalized)))
                    .map(Some)
            }
        }
    }

    fn respond(
        &self,
        request_hash: RequestHash,
        error_return: Option<ErrorReturn>,
    ) -> Result<Envelope<FinalizeResponse>, PaymentError> {
        let mut response = Envelope::new(
            Qualifier::PayeeFinalizeResponse,
            FinalizeResponse {
                request_hash,
                error_return,
                reference_id: self.reference_ids.next(),
                date_time: formats::now(),
                signature: None,
            },
        );
        self.config.signer.sign(&mut response)?;
        tracing::info!(reference_id = %response.payload.reference_id, "finalize response signed");
        Ok(response)
    }
}
