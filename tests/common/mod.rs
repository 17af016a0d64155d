//! Shared helpers for integration tests: documents and certificates built
//! at test time.

#![allow(dead_code)]

use der::pem::LineEnding;
use der::EncodePem;
use pdf_seal::CredentialHandle;
use pkcs8::EncodePrivateKey;
use sha2::Sha256;
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, SystemTime};
use x509_cert::builder::{Builder, CertificateBuilder, Profile};
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::SubjectPublicKeyInfoOwned;
use x509_cert::time::{Time, Validity};

const DAY: Duration = Duration::from_secs(86_400);

fn validity(days: u32) -> Validity {
    let now = SystemTime::now();
    Validity {
        not_before: Time::try_from(now - DAY).unwrap(),
        not_after: Time::try_from(now + DAY * days).unwrap(),
    }
}

/// Key and certificate PEM for a self-signed RSA credential.
pub fn rsa_pem(subject: &str, serial: u32) -> String {
    let key = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
    let signer = rsa::pkcs1v15::SigningKey::<Sha256>::new(key.clone());
    let spki = SubjectPublicKeyInfoOwned::from_key(key.to_public_key()).unwrap();
    let cert = CertificateBuilder::new(
        Profile::Root,
        SerialNumber::from(serial),
        validity(365),
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

/// Key and certificate PEM for a self-signed P-256 credential.
pub fn ec_pem(subject: &str, serial: u32) -> String {
    let key = p256::ecdsa::SigningKey::random(&mut rand::rngs::OsRng);
    let spki = SubjectPublicKeyInfoOwned::from_key(*key.verifying_key()).unwrap();
    let cert = CertificateBuilder::new(
        Profile::Root,
        SerialNumber::from(serial),
        validity(365),
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

pub fn rsa_credential(subject: &str, serial: u32) -> CredentialHandle {
    CredentialHandle::from_pem(rsa_pem(subject, serial).as_bytes()).unwrap()
}

pub fn ec_credential(subject: &str, serial: u32) -> CredentialHandle {
    CredentialHandle::from_pem(ec_pem(subject, serial).as_bytes()).unwrap()
}

/// Classic-xref document from numbered object bodies, object 1 being the catalog.
pub fn build_pdf(objects: &[&str], extra_trailer: &str) -> Vec<u8> {
    let mut pdf = b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n".to_vec();
    let mut offsets = Vec::new();
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }
    let xref = pdf.len();
    pdf.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for offset in offsets {
        pdf.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    pdf.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R {}>>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            extra_trailer,
            xref
        )
        .as_bytes(),
    );
    pdf
}

/// Two-page document with an info dictionary and a file identifier.
pub fn sample_pdf() -> Vec<u8> {
    build_pdf(
        &[
            "<< /Type /Catalog /Pages 2 0 R >>",
            "<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 >>",
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 5 0 R >>",
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>",
            "<< /Length 43 >>\nstream\nBT /F1 12 Tf 72 720 Td (Hello, world) Tj ET\nendstream",
            "<< /Title (Contract) /Producer (tests) >>",
        ],
        "/Info 6 0 R /ID [<0123456789ABCDEF> <0123456789ABCDEF>] ",
    )
}

/// Document with an existing AcroForm held in its own object and an
/// indirect /Annots array on the first page.
pub fn form_pdf() -> Vec<u8> {
    build_pdf(
        &[
            "<< /Type /Catalog /Pages 2 0 R /AcroForm 4 0 R >>",
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Annots 6 0 R >>",
            "<< /Fields [5 0 R] /DA (/Helv 0 Tf 0 g) >>",
            "<< /Type /Annot /Subtype /Widget /FT /Tx /T (Name) /Rect [10 10 100 30] /P 3 0 R >>",
            "[5 0 R]",
        ],
        "",
    )
}

pub fn write(path: &Path, data: &[u8]) {
    std::fs::write(path, data).unwrap();
}
