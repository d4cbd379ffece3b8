//! # Trust
//!
//! Certificate paths, trust anchors, and the embedded signatures that use
//! them. Every hop in a payment verifies against its own pinned anchor; see
//! [`certificate`] for the path model and [`signature`] for signing.

pub mod certificate;
pub mod signature;

pub use certificate::{
    compare_certificate_paths, Certificate, CertificateAuthority, CertificatePath, TrustAnchor,
};
pub use signature::{verify, verify_with_path, SignatureBlock, Signed, Signer};
