//! # Certificates and Paths
//!
//! A deliberately small PKI. A [`Certificate`] binds a subject name to an
//! Ed25519 public key and is signed by its issuer. A [`CertificatePath`] is
//! ordered leaf first; each certificate is issued by the next one, and the
//! last one is issued by a [`TrustAnchor`] that the verifier already holds.
//!
//! Every hop in WebPay pins its own anchor: client root (wallets), merchant
//! root, payment-provider root, acquirer root. A path that is perfectly valid
//! under one anchor means nothing under another.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::codec::canonical;
use crate::crypto::{decode_hex, SigningKeypair, SigningPublicKey};
use crate::PaymentError;

use super::signature::Signer;

/// A subject name bound to a public key by an issuer's signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub subject: String,
    pub issuer: String,
    pub public_key: SigningPublicKey,
    pub serial_number: String,
    /// Hex Ed25519 signature by the issuer over the certificate minus this
    /// field.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub signature: String,
}

impl Certificate {
    /// Check this certificate's signature against the issuer key.
    pub fn is_issued_by(&self, issuer_name: &str, issuer_key: &SigningPublicKey) -> bool {
        if self.issuer != issuer_name {
            return false;
        }
        let Ok(payload) = canonical::signing_payload(self) else {
            return false;
        };
        let Ok(signature) = decode_hex(&self.signature) else {
            return false;
        };
        issuer_key.verify(&payload, &signature)
    }
}

/// Ordered certificate chain, leaf first.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CertificatePath(pub Vec<Certificate>);

impl CertificatePath {
    /// The end-entity certificate.
    pub fn leaf(&self) -> Option<&Certificate> {
        self.0.first()
    }

    /// Subject of the leaf, for logs.
    pub fn subject(&self) -> &str {
        self.leaf().map(|c| c.subject.as_str()).unwrap_or("<empty>")
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Validate the chain up to `anchor` and return the leaf key.
    pub fn validate(&self, anchor: &TrustAnchor) -> Result<&SigningPublicKey, PaymentError> {
        let leaf = self
            .leaf()
            .ok_or_else(|| PaymentError::Trust("empty certificate path".into()))?;

        for pair in self.0.windows(2) {
            let (child, parent) = (&pair[0], &pair[1]);
            if !child.is_issued_by(&parent.subject, &parent.public_key) {
                return Err(PaymentError::Trust(format!(
                    "certificate '{}' is not issued by '{}'",
                    child.subject, parent.subject
                )));
            }
        }

        // Non-empty, so last() is always Some.
        if let Some(top) = self.0.last() {
            if !top.is_issued_by(&anchor.name, &anchor.public_key) {
                return Err(PaymentError::Trust(format!(
                    "certificate path of '{}' does not terminate at trust anchor '{}'",
                    leaf.subject, anchor.name
                )));
            }
        }
        Ok(&leaf.public_key)
    }
}

impl fmt::Display for CertificatePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(|c| c.subject.as_str()).collect();
        write!(f, "[{}]", names.join(" <- "))
    }
}

/// `TrustError` unless both paths are identical.
pub fn compare_certificate_paths(
    a: &CertificatePath,
    b: &CertificatePath,
) -> Result<(), PaymentError> {
    if a != b {
        return Err(PaymentError::Trust(format!(
            "certificate path mismatch: {a} vs {b}"
        )));
    }
    Ok(())
}

/// A root a verifier trusts out of band.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustAnchor {
    pub name: String,
    pub public_key: SigningPublicKey,
}

/// An issuing authority: a root (empty own path) or an intermediate.
#[derive(Clone, Debug)]
pub struct CertificateAuthority {
    name: String,
    keypair: SigningKeypair,
    path: CertificatePath,
}

impl CertificateAuthority {
    /// A fresh self-standing root.
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_keypair(name, SigningKeypair::generate())
    }

    /// A root around an existing keypair.
    pub fn from_keypair(name: impl Into<String>, keypair: SigningKeypair) -> Self {
        Self {
            name: name.into(),
            keypair,
            path: CertificatePath::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn keypair(&self) -> &SigningKeypair {
        &self.keypair
    }

    /// The anchor verifiers pin for this root.
    pub fn anchor(&self) -> TrustAnchor {
        TrustAnchor {
            name: self.name.clone(),
            public_key: self.keypair.public_key(),
        }
    }

    /// Issue a single certificate for `subject`.
    pub fn issue(
        &self,
        subject: impl Into<String>,
        public_key: SigningPublicKey,
    ) -> Result<Certificate, PaymentError> {
        let mut cert = Certificate {
            subject: subject.into(),
            issuer: self.name.clone(),
            public_key,
            serial_number: Uuid::new_v4().to_string(),
            signature: String::new(),
        };
        let payload = canonical::signing_payload(&cert)?;
        cert.signature = hex::encode(self.keypair.sign(&payload));
        Ok(cert)
    }

    /// Issue a certificate and return the full path up to this authority's
    /// anchor.
    pub fn issue_path(
        &self,
        subject: impl Into<String>,
        public_key: SigningPublicKey,
    ) -> Result<CertificatePath, PaymentError> {
        let mut chain = vec![self.issue(subject, public_key)?];
        chain.extend(self.path.0.iter().cloned());
        Ok(CertificatePath(chain))
    }

    /// Generate a keypair for `subject` and wrap it in a ready [`Signer`].
    pub fn issue_signer(&self, subject: impl Into<String>) -> Result<Signer, PaymentError> {
        let keypair = SigningKeypair::generate();
        let path = self.issue_path(subject, keypair.public_key())?;
        Ok(Signer::new(keypair, path))
    }

    /// Create a subordinate authority.
    pub fn issue_intermediate(
        &self,
        name: impl Into<String>,
    ) -> Result<CertificateAuthority, PaymentError> {
        let name = name.into();
        let keypair = SigningKeypair::generate();
        let path = self.issue_path(name.clone(), keypair.public_key())?;
        Ok(CertificateAuthority {
            name,
            keypair,
            path,
        })
    }
}
