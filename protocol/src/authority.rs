//! # Authority Documents
//!
//! Every provider and acquirer publishes a signed Authority document: where
//! to send transactions, and which key and algorithms to encrypt for. The
//! document is fetched fresh for every transaction and verified against the
//! anchor pinned for that class of counterparty before any field is used.
//!
//! There is no cache. Two GETs per card payment is the price.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codec::formats::{self, timestamp};
use crate::codec::{self, Envelope, Qualifier};
use crate::config::{DATA_ENCRYPTION_A256GCM, KEY_ENCRYPTION_ECDH_ES};
use crate::crypto::EncryptionPublicKey;
use crate::transport::Transport;
use crate::trust::{self, CertificatePath, SignatureBlock, Signed, Signer, TrustAnchor};
use crate::PaymentError;

/// What a sender needs to encrypt for this party.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionParameters {
    pub data_encryption_algorithm: String,
    pub key_encryption_algorithm: String,
    pub public_key: EncryptionPublicKey,
}

impl EncryptionParameters {
    /// ECDH-ES with A256GCM, the default every node publishes.
    pub fn new(public_key: EncryptionPublicKey) -> Self {
        Self {
            data_encryption_algorithm: DATA_ENCRYPTION_A256GCM.to_string(),
            key_encryption_algorithm: KEY_ENCRYPTION_ECDH_ES.to_string(),
            public_key,
        }
    }
}

/// A counterparty's published descriptor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authority {
    /// Where this document lives. Must equal the URL it was fetched from.
    pub authority_url: String,
    /// Where to POST transactions.
    pub transaction_url: String,
    pub encryption_parameters: EncryptionParameters,
    #[serde(with = "timestamp")]
    pub date_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureBlock>,
}

impl Authority {
    /// Build and sign an Authority envelope.
    pub fn signed(
        authority_url: impl Into<String>,
        transaction_url: impl Into<String>,
        encryption_parameters: EncryptionParameters,
        signer: &Signer,
    ) -> Result<Envelope<Authority>, PaymentError> {
        let mut envelope = Envelope::new(
            Qualifier::Authority,
            Authority {
                authority_url: authority_url.into(),
                transaction_url: transaction_url.into(),
                encryption_parameters,
                date_time: formats::now(),
                signature: None,
            },
        );
        signer.sign(&mut envelope)?;
        Ok(envelope)
    }

    /// Certificate path of the publisher.
    pub fn signer_path(&self) -> Result<&CertificatePath, PaymentError> {
        self.signature
            .as_ref()
            .map(|s| &s.certificate_path)
            .ok_or_else(|| PaymentError::Crypto("authority document is not signed".into()))
    }
}

impl Signed for Authority {
    fn signature(&self) -> Option<&SignatureBlock> {
        self.signature.as_ref()
    }

    fn signature_mut(&mut self) -> &mut Option<SignatureBlock> {
        &mut self.signature
    }
}

/// Fetches and verifies Authority documents.
#[derive(Clone)]
pub struct AuthorityResolver {
    transport: Arc<dyn Transport>,
}

impl AuthorityResolver {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// GET `url`, decode an Authority envelope and verify it against `root`.
    pub async fn resolve(&self, url: &str, root: &TrustAnchor) -> Result<Authority, PaymentError> {
        let body = self.transport.get(url).await?.into_json_body(url)?;
        let envelope: Envelope<Authority> = codec::decode(&body, &[Qualifier::Authority])?;
        let signer = trust::verify(&envelope, root)?;
        debug!(url, signer = signer.subject(), "authority verified");

        if envelope.payload.authority_url != url {
            return Err(PaymentError::Protocol(format!(
                "authority fetched from {url} claims to be {}",
                envelope.payload.authority_url
            )));
        }
        Ok(envelope.payload)
    }
}
