//! Embedded document signatures.
//!
//! A signed document carries a `signature` member holding the algorithm,
//! the signer's certificate path and the signature value. The value covers
//! the canonical form of the document with that member removed.
//!
//! Verification answers two separate questions. Does the path chain up to the
//! anchor this hop pins? That failing is a trust error. Does the value verify
//! under the leaf key? That failing is a crypto error.

use serde::{Deserialize, Serialize};

use crate::codec::canonical;
use crate::codec::Envelope;
use crate::config::SIGNATURE_ALGORITHM;
use crate::crypto::{decode_hex, SigningKeypair, SigningPublicKey};
use crate::PaymentError;

use super::certificate::{compare_certificate_paths, CertificatePath, TrustAnchor};

/// The `signature` member of a signed document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureBlock {
    pub algorithm: String,
    pub certificate_path: CertificatePath,
    /// Hex Ed25519 signature.
    pub value: String,
}

/// A document with an embedded signature member.
pub trait Signed: Serialize {
    fn signature(&self) -> Option<&SignatureBlock>;
    fn signature_mut(&mut self) -> &mut Option<SignatureBlock>;
}

impl<T: Signed> Signed for Envelope<T> {
    fn signature(&self) -> Option<&SignatureBlock> {
        self.payload.signature()
    }

    fn signature_mut(&mut self) -> &mut Option<SignatureBlock> {
        self.payload.signature_mut()
    }
}

/// A keypair together with the certificate path vouching for it.
#[derive(Clone, Debug)]
pub struct Signer {
    keypair: SigningKeypair,
    certificate_path: CertificatePath,
}

impl Signer {
    pub fn new(keypair: SigningKeypair, certificate_path: CertificatePath) -> Self {
        Self {
            keypair,
            certificate_path,
        }
    }

    pub fn keypair(&self) -> &SigningKeypair {
        &self.keypair
    }

    pub fn certificate_path(&self) -> &CertificatePath {
        &self.certificate_path
    }

    /// Sign `document` in place, replacing any existing signature.
    pub fn sign<T: Signed>(&self, document: &mut T) -> Result<(), PaymentError> {
        *document.signature_mut() = None;
        let payload = canonical::signing_payload(document)?;
        let value = self.keypair.sign(&payload);
        *document.signature_mut() = Some(SignatureBlock {
            algorithm: SIGNATURE_ALGORITHM.to_string(),
            certificate_path: self.certificate_path.clone(),
            value: hex::encode(value),
        });
        Ok(())
    }
}

/// Verify `document` against `anchor`. Returns the signer's path.
pub fn verify<'a, T: Signed>(
    document: &'a T,
    anchor: &TrustAnchor,
) -> Result<&'a CertificatePath, PaymentError> {
    let block = signature_block(document)?;
    let leaf_key = block.certificate_path.validate(anchor)?;
    check_value(document, block, leaf_key)?;
    Ok(&block.certificate_path)
}

/// Verify `document` and require that it was signed under exactly
/// `expected`, a path established earlier in the same transaction.
pub fn verify_with_path<T: Signed>(
    document: &T,
    expected: &CertificatePath,
) -> Result<(), PaymentError> {
    let block = signature_block(document)?;
    compare_certificate_paths(&block.certificate_path, expected)?;
    let leaf_key = &block
        .certificate_path
        .leaf()
        .ok_or_else(|| PaymentError::Trust("empty certificate path".into()))?
        .public_key;
    check_value(document, block, leaf_key)
}

fn signature_block<T: Signed>(document: &T) -> Result<&SignatureBlock, PaymentError> {
    let block = document
        .signature()
        .ok_or_else(|| PaymentError::Crypto("document is not signed".into()))?;
    if block.algorithm != SIGNATURE_ALGORITHM {
        return Err(PaymentError::Crypto(format!(
            "unsupported signature algorithm: {}",
            block.algorithm
        )));
    }
    Ok(block)
}

fn check_value<T: Signed>(
    document: &T,
    block: &SignatureBlock,
    key: &SigningPublicKey,
) -> Result<(), PaymentError> {
    let payload = canonical::signing_payload(document)?;
    let value = decode_hex(&block.value)
        .map_err(|_| PaymentError::Crypto("signature value is not hex".into()))?;
    if !key.verify(&payload, &value) {
        return Err(PaymentError::Crypto(format!(
            "signature by '{}' does not verify",
            block.certificate_path.subject()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Qualifier;
    use crate::trust::CertificateAuthority;

    #[derive(Clone, Debug, Serialize, Deserialize)]
    struct Note {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<SignatureBlock>,
    }

    impl Signed for Note {
        fn signature(&self) -> Option<&SignatureBlock> {
            self.signature.as_ref()
        }
        fn signature_mut(&mut self) -> &mut Option<SignatureBlock> {
            &mut self.signature
        }
    }

    fn note(text: &str) -> Note {
        Note {
            text: text.into(),
            signature: None,
        }
    }

    #[test]
    fn sign_then_verify() {
        let root = CertificateAuthority::new("Merchant Root");
        let signer = root.issue_signer("demomerchant.com").unwrap();
        let mut doc = note("pay 250.00");
        signer.sign(&mut doc).unwrap();
        let path = verify(&doc, &root.anchor()).unwrap();
        assert_eq!(path, signer.certificate_path());
    }

    #[test]
    fn envelope_signature_covers_the_qualifier() {
        let root = CertificateAuthority::new("Payment Root");
        let signer = root.issue_signer("mybank.com").unwrap();
        let mut env = Envelope::new(Qualifier::ReserveFundsResponse, note("ok"));
        signer.sign(&mut env).unwrap();
        assert!(verify(&env, &root.anchor()).is_ok());
        env.qualifier = Qualifier::DirectDebitResponse;
        assert!(matches!(
            verify(&env, &root.anchor()),
            Err(PaymentError::Crypto(_))
        ));
    }

    #[test]
    fn modified_content_is_a_crypto_error() {
        let root = CertificateAuthority::new("Merchant Root");
        let signer = root.issue_signer("demomerchant.com").unwrap();
        let mut doc = note("pay 250.00");
        signer.sign(&mut doc).unwrap();
        doc.text = "pay 2500.00".into();
        assert!(matches!(
            verify(&doc, &root.anchor()),
            Err(PaymentError::Crypto(_))
        ));
    }

    #[test]
    fn wrong_anchor_is_a_trust_error() {
        let root = CertificateAuthority::new("Merchant Root");
        let other = CertificateAuthority::new("Client Root");
        let signer = root.issue_signer("demomerchant.com").unwrap();
        let mut doc = note("x");
        signer.sign(&mut doc).unwrap();
        assert!(matches!(
            verify(&doc, &other.anchor()),
            Err(PaymentError::Trust(_))
        ));
    }

    #[test]
    fn unsigned_document_is_rejected() {
        let root = CertificateAuthority::new("Merchant Root");
        assert!(verify(&note("x"), &root.anchor()).is_err());
    }

    #[test]
    fn verify_with_path_rejects_other_signers() {
        let root = CertificateAuthority::new("Payment Root");
        let bank = root.issue_signer("mybank.com").unwrap();
        let other_bank = root.issue_signer("otherbank.com").unwrap();
        let mut doc = note("x");
        other_bank.sign(&mut doc).unwrap();
        assert!(matches!(
            verify_with_path(&doc, bank.certificate_path()),
            Err(PaymentError::Trust(_))
        ));
        assert!(verify_with_path(&doc, other_bank.certificate_path()).is_ok());
    }

    #[test]
    fn resigning_replaces_the_signature() {
        let root = CertificateAuthority::new("Merchant Root");
        let signer = root.issue_signer("demomerchant.com").unwrap();
        let mut doc = note("x");
        signer.sign(&mut doc).unwrap();
        doc.text = "y".into();
        signer.sign(&mut doc).unwrap();
        assert!(verify(&doc, &root.anchor()).is_ok());
    }
}
