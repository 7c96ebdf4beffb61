//! # Credential generation
//!
//! Pure in-memory generators for passwords, RSA and SSH keypairs, X.509
//! certificates and PKCS#10 certificate signing requests. Reconcilers only
//! depend on the [`Generator`] trait; the default implementation lives in
//! [`in_memory`].

use anyhow::Result;

pub mod in_memory;

pub use in_memory::InMemoryGenerator;

/// Default length of generated passwords.
pub const DEFAULT_PASSWORD_LENGTH: usize = 64;

/// Options for password generation.
#[derive(Debug, Clone, Default)]
pub struct PasswordGenerationRequest {
    /// Overrides [`DEFAULT_PASSWORD_LENGTH`] when set.
    pub length: Option<usize>,
}

/// A generated RSA keypair, PEM encoded.
#[derive(Debug, Clone)]
pub struct RsaKey {
    /// PKCS#1 private key PEM.
    pub private_key: String,
    /// PKIX (SPKI) public key PEM.
    pub public_key: String,
}

/// A generated SSH keypair.
#[derive(Debug, Clone)]
pub struct SshKey {
    /// PKCS#1 private key PEM.
    pub private_key: String,
    /// OpenSSH `ssh-rsa ...` public key line.
    pub public_key: String,
    /// Legacy MD5 fingerprint of the public key, colon separated hex pairs.
    pub fingerprint: String,
}

/// A generated certificate with its private key.
#[derive(Debug, Clone)]
pub struct Certificate {
    /// Certificate PEM.
    pub certificate: String,
    /// Private key PEM.
    pub private_key: String,
    /// Whether the certificate is a certificate authority.
    pub is_ca: bool,
}

/// CA material used to sign a leaf certificate.
#[derive(Debug, Clone, Default)]
pub struct CaMaterial {
    /// CA certificate PEM; empty means self-sign.
    pub certificate: String,
    /// CA private key PEM.
    pub private_key: String,
}

/// Request for certificate or CSR generation.
#[derive(Debug, Clone, Default)]
pub struct CertificateGenerationRequest {
    pub common_name: String,
    /// DNS names and IP addresses added as subject alternative names.
    pub alternative_names: Vec<String>,
    pub is_ca: bool,
    /// CA to sign with; `None` or an empty certificate yields a self-signed
    /// certificate.
    pub ca: Option<CaMaterial>,
}

/// Credential generator used by the reconcilers.
///
/// Errors are fatal for the containing reconcile and are retried through the
/// normal requeue path.
pub trait Generator: Send + Sync {
    /// Generate a password, cryptographically uniform over `[A-Za-z0-9_]`.
    fn generate_password(&self, name: &str, request: PasswordGenerationRequest) -> String;

    /// Generate a 4096 bit RSA keypair.
    fn generate_rsa_key(&self, name: &str) -> Result<RsaKey>;

    /// Generate a 4096 bit RSA SSH keypair with its legacy MD5 fingerprint.
    fn generate_ssh_key(&self, name: &str) -> Result<SshKey>;

    /// Generate a certificate: a self-signed CA when the request is a CA
    /// without signing material, otherwise a leaf signed by the given CA.
    fn generate_certificate(
        &self,
        name: &str,
        request: &CertificateGenerationRequest,
    ) -> Result<Certificate>;

    /// Generate a PEM encoded PKCS#10 certificate signing request together
    /// with the private key it was created for.
    fn generate_certificate_signing_request(
        &self,
        request: &CertificateGenerationRequest,
    ) -> Result<(String, String)>;
}
