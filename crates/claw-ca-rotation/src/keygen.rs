//! Key generation primitives the engine calls but does not implement
//! itself: a fresh SSH keypair per staged or forced rotation, and a fresh
//! self-signed TLS CA certificate.

use chrono::Duration;
use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair, KeyUsagePurpose};
use ssh_key::rand_core::OsRng;
use ssh_key::{Algorithm, LineEnding, PrivateKey as SshPrivateKey};
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{SshKeyPair, TlsKeyPair};

/// Generates the key material a rotation needs. Implementations perform
/// real cryptographic work; the engine treats this trait as opaque.
pub trait KeyGenerator: Send + Sync {
    /// Generates a fresh Ed25519 SSH keypair.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if generation fails.
    fn generate_ssh_keypair(&self) -> Result<SshKeyPair>;

    /// Generates a fresh self-signed TLS CA certificate for `cluster_name`
    /// with subject `CN=cluster_name`, `O=[cluster_name]`, valid for `ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if generation fails.
    fn generate_self_signed_tls_ca(&self, cluster_name: &str, ttl: Duration) -> Result<TlsKeyPair>;
}

/// Real key generator: Ed25519 over `ssh-key`, self-signed CA over `rcgen`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultKeyGenerator;

impl KeyGenerator for DefaultKeyGenerator {
    fn generate_ssh_keypair(&self) -> Result<SshKeyPair> {
        let mut rng = OsRng;
        let private = SshPrivateKey::random(&mut rng, Algorithm::Ed25519)
            .map_err(|e| Error::Internal(format!("failed to generate SSH keypair: {e}")))?;

        let private_pem = private
            .to_openssh(LineEnding::LF)
            .map_err(|e| Error::Internal(format!("failed to encode SSH private key: {e}")))?
            .to_string();
        let public_pem = private
            .public_key()
            .to_openssh()
            .map_err(|e| Error::Internal(format!("failed to encode SSH public key: {e}")))?;

        debug!("generated new SSH keypair");

        Ok(SshKeyPair {
            private_pem,
            public_pem,
        })
    }

    fn generate_self_signed_tls_ca(&self, cluster_name: &str, ttl: Duration) -> Result<TlsKeyPair> {
        let key_pair = KeyPair::generate()
            .map_err(|e| Error::Internal(format!("failed to generate TLS key pair: {e}")))?;

        let mut params = CertificateParams::default();
        params
            .distinguished_name
            .push(DnType::CommonName, cluster_name);
        params
            .distinguished_name
            .push(DnType::OrganizationName, cluster_name);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];

        let now = chrono::Utc::now();
        let not_before = now - Duration::hours(1);
        let not_after = now + ttl;
        params.not_before = to_rcgen_time(not_before)?;
        params.not_after = to_rcgen_time(not_after)?;

        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| Error::Internal(format!("failed to self-sign TLS CA: {e}")))?;

        debug!(cluster_name, "generated new self-signed TLS CA");

        Ok(TlsKeyPair {
            cert_pem: cert.pem(),
            key_pem: Some(key_pair.serialize_pem()),
        })
    }
}

/// Converts a `chrono` `DateTime` to `rcgen`'s `OffsetDateTime`.
fn to_rcgen_time(dt: chrono::DateTime<chrono::Utc>) -> Result<time::OffsetDateTime> {
    time::OffsetDateTime::from_unix_timestamp(dt.timestamp())
        .map_err(|e| Error::Internal(format!("invalid timestamp: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_ssh_keypair() {
        let generator = DefaultKeyGenerator;
        let pair = generator.generate_ssh_keypair().unwrap();
        assert!(pair.private_pem.contains("PRIVATE KEY"));
        assert!(pair.public_pem.starts_with("ssh-ed25519"));
    }

    #[test]
    fn ssh_keypairs_are_unique() {
        let generator = DefaultKeyGenerator;
        let a = generator.generate_ssh_keypair().unwrap();
        let b = generator.generate_ssh_keypair().unwrap();
        assert_ne!(a.public_pem, b.public_pem);
    }

    #[test]
    fn generates_self_signed_tls_ca() {
        let generator = DefaultKeyGenerator;
        let pair = generator
            .generate_self_signed_tls_ca("test-cluster", Duration::days(3650))
            .unwrap();
        assert!(pair.cert_pem.contains("BEGIN CERTIFICATE"));
        assert!(pair.key_pem.is_some());
    }
}
