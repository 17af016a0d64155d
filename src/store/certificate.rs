//! Certificates and private keys held by a store.
//!
//! A [`CredentialHandle`] is built from one PEM bundle: the first
//! `CERTIFICATE` block is the signer, further certificate blocks form its
//! chain, and an optional unencrypted private key block (PKCS#8, PKCS#1 or
//! SEC1) makes the handle usable for signing.

use crate::decoders::encode_hex_upper;
use crate::error::{Error, Result};
use crate::identity::SerialIdentity;
use chrono::{DateTime, Utc};
use p256::ecdsa::SigningKey as EcdsaSigningKey;
use pkcs8::DecodePrivateKey;
use pkcs1::DecodeRsaPrivateKey;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use spki::{DecodePublicKey, EncodePublicKey};
use std::fmt;
use std::path::Path;
use x509_parser::pem::Pem;
use x509_parser::prelude::{FromDer, X509Certificate};

/// `rsaEncryption`
const OID_RSA_ENCRYPTION: &str = "1.2.840.113549.1.1.1";
/// `id-ecPublicKey`
const OID_EC_PUBLIC_KEY: &str = "1.2.840.10045.2.1";

/// Public key algorithm of a certificate.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub enum KeyAlgorithm {
    /// RSA, signed with PKCS#1 v1.5 and SHA-256
    Rsa,
    /// ECDSA over NIST P-256 with SHA-256
    EcP256,
    /// Anything else, by algorithm OID
    Other(String),
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyAlgorithm::Rsa => f.write_str("RSA"),
            KeyAlgorithm::EcP256 => f.write_str("ECDSA P-256"),
            KeyAlgorithm::Other(oid) => write!(f, "other ({})", oid),
        }
    }
}

/// Private key usable for signing.
#[derive(Clone)]
#[allow(clippy::large_enum_variant)]
pub enum SigningKey {
    /// RSA private key
    Rsa(RsaPrivateKey),
    /// ECDSA P-256 private key
    EcP256(EcdsaSigningKey),
}

impl SigningKey {
    /// Parse a DER private key given the PEM label it came with.
    fn from_der(label: &str, der: &[u8]) -> Result<Self> {
        match label {
            "PRIVATE KEY" => {
                if let Ok(key) = RsaPrivateKey::from_pkcs8_der(der) {
                    return Ok(SigningKey::Rsa(key));
                }
                if let Ok(key) = EcdsaSigningKey::from_pkcs8_der(der) {
                    return Ok(SigningKey::EcP256(key));
                }
                Err(Error::UnsupportedKeyAlgorithm(
                    "PKCS#8 key is neither RSA nor ECDSA P-256".to_string(),
                ))
            },
            "RSA PRIVATE KEY" => RsaPrivateKey::from_pkcs1_der(der)
                .map(SigningKey::Rsa)
                .map_err(|e| Error::Certificate(format!("invalid PKCS#1 key: {}", e))),
            "EC PRIVATE KEY" => p256::SecretKey::from_sec1_der(der)
                .map(|secret| SigningKey::EcP256(EcdsaSigningKey::from(secret)))
                .map_err(|e| Error::UnsupportedKeyAlgorithm(format!("SEC1 key: {}", e))),
            "ENCRYPTED PRIVATE KEY" => {
                Err(Error::Unsupported("encrypted private keys".to_string()))
            },
            other => Err(Error::Certificate(format!("unexpected PEM block '{}'", other))),
        }
    }

    /// DER `SubjectPublicKeyInfo` of the matching public key.
    fn public_key_der(&self) -> Result<Vec<u8>> {
        let document = match self {
            SigningKey::Rsa(key) => RsaPublicKey::from(key).to_public_key_der(),
            SigningKey::EcP256(key) => key.verifying_key().to_public_key_der(),
        }
        .map_err(|e| Error::Crypto(format!("public key encoding: {}", e)))?;
        Ok(document.as_bytes().to_vec())
    }

    /// Algorithm of this key.
    pub fn algorithm(&self) -> KeyAlgorithm {
        match self {
            SigningKey::Rsa(_) => KeyAlgorithm::Rsa,
            SigningKey::EcP256(_) => KeyAlgorithm::EcP256,
        }
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}([REDACTED])", self.algorithm())
    }
}

/// A stored certificate, optionally with its private key.
#[derive(Clone)]
pub struct CredentialHandle {
    subject: String,
    issuer: String,
    serial_number: String,
    thumbprint: String,
    thumbprint_sha256: String,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    key_algorithm: KeyAlgorithm,
    der: Vec<u8>,
    chain: Vec<Vec<u8>>,
    private_key: Option<SigningKey>,
}

impl CredentialHandle {
    /// Parse a DER certificate without a private key.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| Error::Certificate(format!("invalid certificate: {}", e)))?;

        let spki = cert.public_key();
        let algorithm_oid = spki.algorithm.algorithm.to_id_string();
        let key_algorithm = match algorithm_oid.as_str() {
            OID_RSA_ENCRYPTION => KeyAlgorithm::Rsa,
            OID_EC_PUBLIC_KEY if p256::PublicKey::from_public_key_der(spki.raw).is_ok() => {
                KeyAlgorithm::EcP256
            },
            _ => KeyAlgorithm::Other(algorithm_oid),
        };

        let validity = cert.validity();
        Ok(Self {
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            serial_number: encode_hex_upper(cert.raw_serial()),
            thumbprint: encode_hex_upper(&Sha1::digest(der)),
            thumbprint_sha256: encode_hex_upper(&Sha256::digest(der)),
            not_before: timestamp(validity.not_before.timestamp())?,
            not_after: timestamp(validity.not_after.timestamp())?,
            key_algorithm,
            der: der.to_vec(),
            chain: Vec::new(),
            private_key: None,
        })
    }

    /// Parse a PEM bundle: signer certificate, optional chain, optional key.
    ///
    /// A private key that does not belong to the signer certificate is
    /// ignored with a warning, leaving a handle without a key.
    pub fn from_pem(data: &[u8]) -> Result<Self> {
        let mut certificates = Vec::new();
        let mut key = None;

        for block in Pem::iter_from_buffer(data) {
            let block = block.map_err(|e| Error::Certificate(format!("invalid PEM: {}", e)))?;
            match block.label.as_str() {
                "CERTIFICATE" => certificates.push(block.contents),
                label if label.ends_with("PRIVATE KEY") => {
                    if key.is_some() {
                        log::warn!("Ignoring additional private key block");
                        continue;
                    }
                    match SigningKey::from_der(label, &block.contents) {
                        Ok(parsed) => key = Some(parsed),
                        Err(e) => log::warn!("Skipping unusable private key: {}", e),
                    }
                },
                other => log::debug!("Ignoring PEM block '{}'", other),
            }
        }

        let mut certificates = certificates.into_iter();
        let leaf = certificates
            .next()
            .ok_or_else(|| Error::Certificate("no CERTIFICATE block in PEM data".to_string()))?;
        let mut handle = Self::from_der(&leaf)?.with_chain(certificates.collect());
        if let Some(key) = key {
            handle = handle.with_private_key(key)?;
        }
        Ok(handle)
    }

    /// Read a `.pem`/`.crt` bundle or a binary `.der`/`.cer` certificate.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        if data.trim_ascii_start().starts_with(b"-----BEGIN") {
            Self::from_pem(&data)
        } else {
            Self::from_der(&data)
        }
    }

    /// Attach intermediate certificates (DER).
    pub fn with_chain(mut self, chain: Vec<Vec<u8>>) -> Self {
        self.chain = chain;
        self
    }

    /// Attach a private key, or drop it if it does not match the certificate.
    pub fn with_private_key(mut self, key: SigningKey) -> Result<Self> {
        let (_, cert) = X509Certificate::from_der(&self.der)
            .map_err(|e| Error::Certificate(format!("invalid certificate: {}", e)))?;
        if key.public_key_der()? == cert.public_key().raw {
            self.private_key = Some(key);
        } else {
            log::warn!(
                "Private key does not match certificate '{}'; treating it as absent",
                self.subject
            );
            self.private_key = None;
        }
        Ok(self)
    }

    /// Subject distinguished name.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Issuer distinguished name.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Certificate serial number, uppercase hex.
    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    /// SHA-1 thumbprint, uppercase hex.
    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }

    /// SHA-256 thumbprint, uppercase hex.
    pub fn thumbprint_sha256(&self) -> &str {
        &self.thumbprint_sha256
    }

    /// Whether `hex` (already normalized to uppercase) is one of the thumbprints.
    pub fn matches_thumbprint(&self, hex: &str) -> bool {
        hex == self.thumbprint || hex == self.thumbprint_sha256
    }

    /// Start of the validity window.
    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    /// End of the validity window.
    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    /// Whether `now` lies within the validity window.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.not_before <= now && now <= self.not_after
    }

    /// Public key algorithm.
    pub fn key_algorithm(&self) -> &KeyAlgorithm {
        &self.key_algorithm
    }

    /// Whether a usable private key is attached.
    pub fn has_private_key(&self) -> bool {
        self.private_key.is_some()
    }

    /// The private key, when present.
    pub fn signing_key(&self) -> Option<&SigningKey> {
        self.private_key.as_ref()
    }

    /// DER encoding of the certificate.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Intermediate certificates (DER).
    pub fn chain(&self) -> &[Vec<u8>] {
        &self.chain
    }

    /// Serial identity of the subject.
    pub fn identity(&self) -> Option<SerialIdentity> {
        SerialIdentity::from_subject(&self.subject)
    }
}

impl fmt::Debug for CredentialHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialHandle")
            .field("subject", &self.subject)
            .field("issuer", &self.issuer)
            .field("serial_number", &self.serial_number)
            .field("thumbprint", &self.thumbprint)
            .field("not_before", &self.not_before)
            .field("not_after", &self.not_after)
            .field("key_algorithm", &self.key_algorithm)
            .field("private_key", &self.private_key.as_ref().map(|_| "[REDACTED]"))
            .field("chain", &format!("{} certificates", self.chain.len()))
            .finish()
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| Error::Certificate(format!("validity timestamp {} out of range", secs)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::{ec_credential_pem, rsa_credential_pem};

    #[test]
    fn test_rsa_bundle_with_key() {
        let pem = rsa_credential_pem("CN=Alice,2.5.4.5=A1", 1, 365);
        let handle = CredentialHandle::from_pem(pem.as_bytes()).unwrap();
        assert!(handle.has_private_key());
        assert_eq!(handle.key_algorithm(), &KeyAlgorithm::Rsa);
        assert!(handle.subject().contains("CN=Alice"));
        assert_eq!(handle.identity().unwrap().as_str(), "A1");
        assert_eq!(handle.thumbprint().len(), 40);
        assert_eq!(handle.thumbprint_sha256().len(), 64);
        assert!(handle.is_valid_at(Utc::now()));
    }

    #[test]
    fn test_pkcs1_rsa_key_block() {
        use pkcs1::EncodeRsaPrivateKey;

        let pem = rsa_credential_pem("CN=Dave,2.5.4.5=D4", 4, 365);
        let end = "-----END PRIVATE KEY-----\n";
        let split = pem.find(end).unwrap() + end.len();
        let key = RsaPrivateKey::from_pkcs8_pem(&pem[..split]).unwrap();
        let pkcs1 = key.to_pkcs1_pem(der::pem::LineEnding::LF).unwrap();
        let bundle = format!("{}{}", pkcs1.as_str(), &pem[split..]);

        let handle = CredentialHandle::from_pem(bundle.as_bytes()).unwrap();
        assert!(handle.has_private_key());
        assert_eq!(handle.key_algorithm(), &KeyAlgorithm::Rsa);
        assert_eq!(handle.identity().unwrap().as_str(), "D4");
    }

    #[test]
    fn test_ec_bundle_with_key() {
        let pem = ec_credential_pem("CN=Bob,2.5.4.5=B2", 2, 30);
        let handle = CredentialHandle::from_pem(pem.as_bytes()).unwrap();
        assert!(handle.has_private_key());
        assert_eq!(handle.key_algorithm(), &KeyAlgorithm::EcP256);
        assert_eq!(handle.serial_number(), "02");
    }

    #[test]
    fn test_certificate_only() {
        let pem = rsa_credential_pem("CN=Carol", 3, 365);
        let cert_only: String = pem
            .split_inclusive('\n')
            .skip_while(|l| !l.starts_with("-----BEGIN CERTIFICATE"))
            .collect();
        let handle = CredentialHandle::from_pem(cert_only.as_bytes()).unwrap();
        assert!(!handle.has_private_key());
        assert!(handle.identity().is_none());
    }

    #[test]
    fn test_mismatched_key_is_dropped() {
        let alice = rsa_credential_pem("CN=Alice", 1, 365);
        let bob = ec_credential_pem("CN=Bob", 2, 365);
        let alice_cert: String = alice
            .split_inclusive('\n')
            .skip_while(|l| !l.starts_with("-----BEGIN CERTIFICATE"))
            .collect();
        let bob_key: String = bob
            .split_inclusive('\n')
            .take_while(|l| !l.starts_with("-----BEGIN CERTIFICATE"))
            .collect();
        let mixed = format!("{}{}", bob_key, alice_cert);
        let handle = CredentialHandle::from_pem(mixed.as_bytes()).unwrap();
        assert!(!handle.has_private_key());
    }

    #[test]
    fn test_debug_redacts_key() {
        let pem = ec_credential_pem("CN=Bob", 2, 30);
        let handle = CredentialHandle::from_pem(pem.as_bytes()).unwrap();
        let debug = format!("{:?}", handle);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("PRIVATE"));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(CredentialHandle::from_pem(b"not pem at all").is_err());
        assert!(CredentialHandle::from_der(b"\x30\x03\x02\x01\x01").is_err());
    }
}
