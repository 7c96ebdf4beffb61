//! In-memory credential generator.

use std::net::IpAddr;

use anyhow::{Context, Result};
use rand::rngs::OsRng;
use rand::Rng;
use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair, KeyUsagePurpose, SanType};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::EncodePublicKey;
use rsa::{RsaPrivateKey, RsaPublicKey};
use tracing::debug;

use super::{
    Certificate, CertificateGenerationRequest, Generator, PasswordGenerationRequest, RsaKey,
    SshKey, DEFAULT_PASSWORD_LENGTH,
};

const PASSWORD_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_";

const RSA_KEY_BITS: usize = 4096;

/// Default [`Generator`] implementation. Stateless; keys are produced from the
/// process CSPRNG on every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct InMemoryGenerator;

impl InMemoryGenerator {
    pub fn new() -> Self {
        InMemoryGenerator
    }
}

impl Generator for InMemoryGenerator {
    fn generate_password(&self, name: &str, request: PasswordGenerationRequest) -> String {
        debug!("Generating password for '{}'", name);
        let length = request.length.unwrap_or(DEFAULT_PASSWORD_LENGTH);
        let mut rng = OsRng;
        (0..length)
            .map(|_| PASSWORD_CHARSET[rng.gen_range(0..PASSWORD_CHARSET.len())] as char)
            .collect()
    }

    fn generate_rsa_key(&self, name: &str) -> Result<RsaKey> {
        debug!("Generating RSA key for '{}'", name);
        let private_key = RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS)
            .context("generating RSA private key")?;
        let public_key = RsaPublicKey::from(&private_key);

        Ok(RsaKey {
            private_key: private_key
                .to_pkcs1_pem(rsa::pkcs1::LineEnding::LF)
                .context("encoding RSA private key")?
                .to_string(),
            public_key: public_key
                .to_public_key_pem(rsa::pkcs8::LineEnding::LF)
                .context("encoding RSA public key")?,
        })
    }

    fn generate_ssh_key(&self, name: &str) -> Result<SshKey> {
        debug!("Generating SSH key for '{}'", name);
        let private_key = RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS)
            .context("generating SSH private key")?;
        let public_key = RsaPublicKey::from(&private_key);

        let ssh_public = ssh_key::public::RsaPublicKey::try_from(&public_key)
            .context("converting public key to SSH form")?;
        let openssh = ssh_key::PublicKey::from(ssh_key::public::KeyData::Rsa(ssh_public))
            .to_openssh()
            .context("encoding OpenSSH public key")?;

        Ok(SshKey {
            private_key: private_key
                .to_pkcs1_pem(rsa::pkcs1::LineEnding::LF)
                .context("encoding SSH private key")?
                .to_string(),
            public_key: openssh,
            fingerprint: fingerprint_md5(&public_key)?,
        })
    }

    fn generate_certificate(
        &self,
        name: &str,
        request: &CertificateGenerationRequest,
    ) -> Result<Certificate> {
        debug!("Generating certificate for '{}'", name);
        let params = certificate_params(request)?;
        let key_pair = KeyPair::generate().context("generating certificate key")?;

        let certificate = match &request.ca {
            Some(ca) if !ca.certificate.is_empty() => {
                let ca_key =
                    KeyPair::from_pem(&ca.private_key).context("parsing CA private key")?;
                let ca_params = CertificateParams::from_ca_cert_pem(&ca.certificate)
                    .context("parsing CA certificate")?;
                let ca_cert = ca_params
                    .self_signed(&ca_key)
                    .context("reconstructing CA issuer")?;
                params
                    .signed_by(&key_pair, &ca_cert, &ca_key)
                    .context("signing certificate")?
            }
            _ => params
                .self_signed(&key_pair)
                .context("self-signing certificate")?,
        };

        Ok(Certificate {
            certificate: certificate.pem(),
            private_key: key_pair.serialize_pem(),
            is_ca: request.is_ca,
        })
    }

    fn generate_certificate_signing_request(
        &self,
        request: &CertificateGenerationRequest,
    ) -> Result<(String, String)> {
        debug!(
            "Generating certificate signing request for '{}'",
            request.common_name
        );
        let params = certificate_params(request)?;
        let key_pair = KeyPair::generate().context("generating CSR key")?;
        let csr = params
            .serialize_request(&key_pair)
            .context("serializing CSR")?;

        Ok((
            csr.pem().context("encoding CSR")?,
            key_pair.serialize_pem(),
        ))
    }
}

/// Translate a generation request into rcgen parameters: subject, SANs and,
/// for CAs, the basic constraints and key usages.
fn certificate_params(request: &CertificateGenerationRequest) -> Result<CertificateParams> {
    let mut params = CertificateParams::default();

    if !request.common_name.is_empty() {
        params
            .distinguished_name
            .push(DnType::CommonName, request.common_name.as_str());
    }

    for san in &request.alternative_names {
        if let Ok(ip) = san.parse::<IpAddr>() {
            params.subject_alt_names.push(SanType::IpAddress(ip));
        } else {
            params
                .subject_alt_names
                .push(SanType::DnsName(san.as_str().try_into()?));
        }
    }

    if request.is_ca {
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
    }

    Ok(params)
}

/// Legacy MD5 fingerprint of the DER encoded (SPKI) public key, as colon
/// separated lowercase hex pairs.
fn fingerprint_md5(public_key: &RsaPublicKey) -> Result<String> {
    let der = public_key
        .to_public_key_der()
        .context("encoding public key to DER")?;
    let digest = md5::compute(der.as_bytes());
    Ok(digest
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":"))
}
