//! Certificates generated at test time.

use super::CredentialHandle;
use der::pem::LineEnding;
use der::EncodePem;
use pkcs8::EncodePrivateKey;
use sha2::Sha256;
use std::str::FromStr;
use std::time::{Duration, SystemTime};
use x509_cert::builder::{Builder, CertificateBuilder, Profile};
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::SubjectPublicKeyInfoOwned;
use x509_cert::time::{Time, Validity};

const DAY: Duration = Duration::from_secs(86_400);

/// Validity window starting a day ago; negative `days` gives an expired one.
fn validity(days: i64) -> Validity {
    let now = SystemTime::now();
    let (start, end) = if days >= 0 {
        (now - DAY, now + DAY * days as u32)
    } else {
        (now - DAY * (days.unsigned_abs() as u32 + 30), now - DAY * days.unsigned_abs() as u32)
    };
    Validity {
        not_before: Time::try_from(start).unwrap(),
        not_after: Time::try_from(end).unwrap(),
    }
}

/// PEM bundle (PKCS#8 key, then certificate) with a self-signed RSA certificate.
pub(crate) fn rsa_credential_pem(subject: &str, serial: u32, days: i64) -> String {
    let key = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
    let signer = rsa::pkcs1v15::SigningKey::<Sha256>::new(key.clone());
    let spki = SubjectPublicKeyInfoOwned::from_key(key.to_public_key()).unwrap();
    let cert = CertificateBuilder::new(
        Profile::Root,
        SerialNumber::from(serial),
        validity(days),
        Name::from_str(subject).unwrap(),
        spki,
        &signer,
    )
    .unwrap()
    .build::<rsa::pkcs1v15::Signature>()
    .unwrap();

    format!(
        "{}{}",
        key.to_pkcs8_pem(LineEnding::LF).unwrap().as_str(),
        cert.to_pem(LineEnding::LF).unwrap()
    )
}

/// PEM bundle (PKCS#8 key, then certificate) with a self-signed P-256 certificate.
pub(crate) fn ec_credential_pem(subject: &str, serial: u32, days: i64) -> String {
    let key = p256::ecdsa::SigningKey::random(&mut rand::rngs::OsRng);
    let spki = SubjectPublicKeyInfoOwned::from_key(*key.verifying_key()).unwrap();
    let cert = CertificateBuilder::new(
        Profile::Root,
        SerialNumber::from(serial),
        validity(days),
        Name::from_str(subject).unwrap(),
        spki,
        &key,
    )
    .unwrap()
    .build::<p256::ecdsa::DerSignature>()
    .unwrap();

    format!(
        "{}{}",
        key.to_pkcs8_pem(LineEnding::LF).unwrap().as_str(),
        cert.to_pem(LineEnding::LF).unwrap()
    )
}

pub(crate) fn rsa_credential(subject: &str, serial: u32, days: i64) -> CredentialHandle {
    CredentialHandle::from_pem(rsa_credential_pem(subject, serial, days).as_bytes()).unwrap()
}

pub(crate) fn ec_credential(subject: &str, serial: u32, days: i64) -> CredentialHandle {
    CredentialHandle::from_pem(ec_credential_pem(subject, serial, days).as_bytes()).unwrap()
}

/// The same certificate without its private key.
pub(crate) fn without_key(handle: &CredentialHandle) -> CredentialHandle {
    CredentialHandle::from_der(handle.der()).unwrap()
}
