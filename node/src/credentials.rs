//! # Node Credentials
//!
//! Everything a node needs to sign, decrypt and verify, in one JSON file
//! under the data directory. `webpay-node init` creates a devnet: four fresh
//! roots (client, merchant, payment, acquirer), a bank certificate under the
//! payment root and an acquirer certificate under the acquirer root.
//!
//! Root private keys are not written anywhere. A devnet is re-created, not
//! extended.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use webpay_protocol::crypto::{DecryptionKey, SigningKeypair};
use webpay_protocol::trust::{CertificateAuthority, CertificatePath, Signer, TrustAnchor};
use webpay_protocol::PaymentError;

use crate::cli::NodeRole;

/// File name inside the data directory.
pub const CREDENTIALS_FILE: &str = "credentials.json";

/// Anchors pinned by every party of the network.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anchors {
    pub client_root: TrustAnchor,
    pub merchant_root: TrustAnchor,
    pub payment_root: TrustAnchor,
    pub acquirer_root: TrustAnchor,
}

/// Key material of one party.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyKeys {
    /// Hex Ed25519 secret.
    pub signing_key: String,
    pub certificate_path: CertificatePath,
    /// Hex X25519 secret.
    pub decryption_key: String,
}

impl PartyKeys {
    fn issue(authority: &CertificateAuthority, subject: &str) -> Result<Self, PaymentError> {
        let keypair = SigningKeypair::generate();
        let certificate_path = authority.issue_path(subject, keypair.public_key())?;
        Ok(Self {
            signing_key: keypair.secret_hex(),
            certificate_path,
            decryption_key: DecryptionKey::generate().secret_hex(),
        })
    }

    /// The signing key together with its certificate path. Fails when the
    /// path's leaf certifies a different key.
    pub fn signer(&self) -> Result<Signer> {
        let keypair =
            SigningKeypair::from_hex(&self.signing_key).context("invalid signing key")?;
        let leaf = self
            .certificate_path
            .leaf()
            .context("empty certificate path")?;
        if leaf.public_key != keypair.public_key() {
            bail!("certificate for '{}' does not match the signing key", leaf.subject);
        }
        Ok(Signer::new(keypair, self.certificate_path.clone()))
    }

    pub fn decryption_key(&self) -> Result<DecryptionKey> {
        DecryptionKey::from_hex(&self.decryption_key).context("invalid decryption key")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub network: String,
    pub anchors: Anchors,
    pub provider: PartyKeys,
    pub acquirer: PartyKeys,
}

impl Credentials {
    /// A fresh devnet.
    pub fn generate_devnet(provider_subject: &str, acquirer_subject: &str) -> Result<Self, PaymentError> {
        let client = CertificateAuthority::new("Devnet Client Root");
        let merchant = CertificateAuthority::new("Devnet Merchant Root");
        let payment = CertificateAuthority::new("Devnet Payment Root");
        let acquirer = CertificateAuthority::new("Devnet Acquirer Root");
        Ok(Self {
            network: "devnet".to_string(),
            anchors: Anchors {
                client_root: client.anchor(),
                merchant_root: merchant.anchor(),
                payment_root: payment.anchor(),
                acquirer_root: acquirer.anchor(),
            },
            provider: PartyKeys::issue(&payment, provider_subject)?,
            acquirer: PartyKeys::issue(&acquirer, acquirer_subject)?,
        })
    }

    pub fn keys(&self, role: NodeRole) -> &PartyKeys {
        match role {
            NodeRole::Provider => &self.provider,
            NodeRole::Acquirer => &self.acquirer,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path)
            .with_context(|| format!("failed to read credentials from {}", path.display()))?;
        let credentials: Self = serde_json::from_slice(&raw)
            .with_context(|| format!("malformed credentials file {}", path.display()))?;
        // Both parties must be usable before anything is served.
        credentials.provider.signer().context("provider credentials")?;
        credentials.acquirer.signer().context("acquirer credentials")?;
        Ok(credentials)
    }

    /// Write with owner-only permissions on Unix.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self).context("failed to serialize credentials")?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write credentials to {}", path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("failed to restrict {}", path.display()))?;
        }
        Ok(())
    }
}
