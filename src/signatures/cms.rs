//! Detached CMS (PKCS#7) signatures.
//!
//! Signing builds a `SignedData` whose signer info carries the content-type
//! and message-digest signed attributes, with the signer certificate and its
//! chain embedded:
//!
//! ```text
//! ContentInfo
//!   SignedData
//!     digestAlgorithms   { sha256 }
//!     encapContentInfo   id-data, no content (detached)
//!     certificates       signer, chain...
//!     signerInfos        { sid, signedAttrs, signature }
//! ```
//!
//! Verification accepts RSA PKCS#1 v1.5 and ECDSA P-256 signers with SHA-1
//! or SHA-2 digests. `/Contents` values are zero padded, so parsing ignores
//! anything after the outer `ContentInfo`.

use super::types::DigestAlgorithm;
use crate::error::{Error, Result};
use cms::builder::{SignedDataBuilder, SignerInfoBuilder};
use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::content_info::ContentInfo;
use cms::signed_data::{EncapsulatedContentInfo, SignedData, SignerIdentifier, SignerInfo};
use const_oid::ObjectIdentifier;
use der::asn1::OctetString;
use der::{Decode, Encode, SliceReader};
use signature::hazmat::PrehashVerifier;
use signature::{Keypair, SignatureEncoding, Signer};
use spki::{
    AlgorithmIdentifierOwned, DecodePublicKey, DynSignatureAlgorithmIdentifier, EncodePublicKey,
    SignatureBitStringEncoding,
};
use x509_cert::Certificate;

/// id-data
const OID_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.1");
/// id-signedData
const OID_SIGNED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");
/// id-messageDigest
const OID_MESSAGE_DIGEST: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");
/// rsaEncryption
const OID_RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
/// id-ecPublicKey
const OID_EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");

/// Build a detached SHA-256 `SignedData` over `content`.
///
/// `signer` produces the signature over the DER signed attributes;
/// `certificate_der` is its certificate and `chain` any intermediates.
pub fn sign_detached<S, Sig>(
    content: &[u8],
    signer: &S,
    certificate_der: &[u8],
    chain: &[Vec<u8>],
) -> Result<Vec<u8>>
where
    S: Keypair + DynSignatureAlgorithmIdentifier + Signer<Sig>,
    S::VerifyingKey: EncodePublicKey,
    Sig: SignatureEncoding + SignatureBitStringEncoding,
{
    let certificate = Certificate::from_der(certificate_der)
        .map_err(|e| Error::Certificate(format!("signer certificate: {}", e)))?;
    let digest = DigestAlgorithm::Sha256.digest(content);
    let digest_algorithm = AlgorithmIdentifierOwned {
        oid: DigestAlgorithm::Sha256.oid(),
        parameters: None,
    };
    let encapsulated = EncapsulatedContentInfo {
        econtent_type: OID_DATA,
        econtent: None,
    };
    let sid = SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
        issuer: certificate.tbs_certificate.issuer.clone(),
        serial_number: certificate.tbs_certificate.serial_number.clone(),
    });

    let signer_info = SignerInfoBuilder::new(
        signer,
        sid,
        digest_algorithm.clone(),
        &encapsulated,
        Some(digest.as_slice()),
    )
    .map_err(|e| Error::Crypto(format!("signer info: {:?}", e)))?;

    let mut builder = SignedDataBuilder::new(&encapsulated);
    builder
        .add_digest_algorithm(digest_algorithm)
        .map_err(|e| Error::Crypto(format!("digest algorithm: {:?}", e)))?
        .add_certificate(CertificateChoices::Certificate(certificate))
        .map_err(|e| Error::Crypto(format!("signer certificate: {:?}", e)))?;
    for der in chain {
        let cert = Certificate::from_der(der)
            .map_err(|e| Error::Certificate(format!("chain certificate: {}", e)))?;
        builder
            .add_certificate(CertificateChoices::Certificate(cert))
            .map_err(|e| Error::Crypto(format!("chain certificate: {:?}", e)))?;
    }

    let content_info = builder
        .add_signer_info::<S, Sig>(signer_info)
        .map_err(|e| Error::Crypto(format!("signing: {:?}", e)))?
        .build()
        .map_err(|e| Error::Crypto(format!("building SignedData: {:?}", e)))?;

    content_info
        .to_der()
        .map_err(|e| Error::Crypto(format!("encoding SignedData: {}", e)))
}

/// Parse `cms` and check it against the detached `content`.
pub fn verify_detached(cms: &[u8], content: &[u8]) -> Result<SignedContents> {
    let signed = SignedContents::parse(cms)?;
    signed.verify(content)?;
    Ok(signed)
}

/// A parsed `SignedData` with its embedded certificates.
#[derive(Debug, Clone)]
pub struct SignedContents {
    signed_data: SignedData,
    certificates: Vec<Certificate>,
}

impl SignedContents {
    /// Parse a DER `ContentInfo`; trailing bytes (padding) are ignored.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader =
            SliceReader::new(bytes).map_err(|e| Error::Crypto(format!("invalid CMS: {}", e)))?;
        let content_info = ContentInfo::decode(&mut reader)
            .map_err(|e| Error::Crypto(format!("invalid CMS: {}", e)))?;
        if content_info.content_type != OID_SIGNED_DATA {
            return Err(Error::Crypto(format!(
                "CMS content type {} is not signed-data",
                content_info.content_type
            )));
        }
        let signed_data: SignedData = content_info
            .content
            .decode_as()
            .map_err(|e| Error::Crypto(format!("invalid SignedData: {}", e)))?;

        let certificates = signed_data
            .certificates
            .as_ref()
            .map(|set| {
                set.0
                    .iter()
                    .filter_map(|choice| match choice {
                        CertificateChoices::Certificate(cert) => Some(cert.clone()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            signed_data,
            certificates,
        })
    }

    fn signer_info(&self) -> Result<&SignerInfo> {
        self.signed_data
            .signer_infos
            .0
            .iter()
            .next()
            .ok_or_else(|| Error::Crypto("SignedData has no signer info".to_string()))
    }

    /// Certificate named by the signer identifier, else the first one embedded.
    pub fn signer_certificate(&self) -> Option<&Certificate> {
        let by_sid = self.signer_info().ok().and_then(|info| match &info.sid {
            SignerIdentifier::IssuerAndSerialNumber(isn) => self.certificates.iter().find(|c| {
                c.tbs_certificate.issuer == isn.issuer
                    && c.tbs_certificate.serial_number == isn.serial_number
            }),
            SignerIdentifier::SubjectKeyIdentifier(_) => None,
        });
        by_sid.or_else(|| self.certificates.first())
    }

    /// DER of the signer certificate.
    pub fn signer_certificate_der(&self) -> Option<Vec<u8>> {
        self.signer_certificate().and_then(|cert| cert.to_der().ok())
    }

    /// Subject of the signer certificate, formatted like store subjects.
    pub fn signer_subject(&self) -> Option<String> {
        use x509_parser::prelude::{FromDer, X509Certificate};

        let der = self.signer_certificate_der()?;
        let (_, cert) = X509Certificate::from_der(&der).ok()?;
        Some(cert.subject().to_string())
    }

    /// Every embedded certificate (DER), signer included.
    pub fn certificates_der(&self) -> Vec<Vec<u8>> {
        self.certificates.iter().filter_map(|c| c.to_der().ok()).collect()
    }

    /// Digest algorithm of the signer.
    pub fn digest_algorithm(&self) -> Result<DigestAlgorithm> {
        let oid = self.signer_info()?.digest_alg.oid;
        DigestAlgorithm::from_oid(&oid)
            .ok_or_else(|| Error::Crypto(format!("unsupported digest algorithm {}", oid)))
    }

    /// Check the signature against the covered bytes.
    ///
    /// For detached signatures the message digest covers `content`. When the
    /// content is encapsulated (`adbe.pkcs7.sha1`), it must equal the SHA-1
    /// of `content` and the message digest covers it instead.
    pub fn verify(&self, content: &[u8]) -> Result<()> {
        let info = self.signer_info()?;
        let digest_algorithm = self.digest_algorithm()?;
        let certificate = self
            .signer_certificate()
            .ok_or_else(|| Error::Crypto("no signer certificate embedded".to_string()))?;

        let signed_content = match &self.signed_data.encap_content_info.econtent {
            None => content.to_vec(),
            Some(any) => {
                let embedded: OctetString = any
                    .decode_as()
                    .map_err(|e| Error::Crypto(format!("encapsulated content: {}", e)))?;
                if embedded.as_bytes() != DigestAlgorithm::Sha1.digest(content) {
                    return Err(Error::Crypto(
                        "encapsulated digest does not match the signed bytes".to_string(),
                    ));
                }
                embedded.as_bytes().to_vec()
            },
        };
        let content_digest = digest_algorithm.digest(&signed_content);

        // With signed attributes the signature covers their DER SET encoding
        let signed_message = match &info.signed_attrs {
            Some(attrs) => {
                let message_digest = attrs
                    .iter()
                    .find(|attr| attr.oid == OID_MESSAGE_DIGEST)
                    .and_then(|attr| attr.values.iter().next())
                    .ok_or_else(|| Error::Crypto("message-digest attribute missing".to_string()))?
                    .decode_as::<OctetString>()
                    .map_err(|e| Error::Crypto(format!("message-digest attribute: {}", e)))?;
                if message_digest.as_bytes() != content_digest.as_slice() {
                    return Err(Error::Crypto(
                        "message digest does not match the signed bytes".to_string(),
                    ));
                }
                attrs
                    .to_der()
                    .map_err(|e| Error::Crypto(format!("signed attributes: {}", e)))?
            },
            None => signed_content,
        };

        let spki_der = certificate
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| Error::Crypto(format!("public key: {}", e)))?;
        let key_oid = certificate.tbs_certificate.subject_public_key_info.algorithm.oid;
        let hashed = digest_algorithm.digest(&signed_message);
        let signature = info.signature.as_bytes();

        if key_oid == OID_RSA_ENCRYPTION {
            verify_rsa(&spki_der, digest_algorithm, &hashed, signature)
        } else if key_oid == OID_EC_PUBLIC_KEY {
            verify_p256(&spki_der, &hashed, signature)
        } else {
            Err(Error::UnsupportedKeyAlgorithm(key_oid.to_string()))
        }
    }
}

fn verify_rsa(spki_der: &[u8], digest: DigestAlgorithm, hashed: &[u8], signature: &[u8]) -> Result<()> {
    use rsa::{Pkcs1v15Sign, RsaPublicKey};

    let key = RsaPublicKey::from_public_key_der(spki_der)
        .map_err(|e| Error::Crypto(format!("RSA public key: {}", e)))?;
    let scheme = match digest {
        DigestAlgorithm::Sha1 => Pkcs1v15Sign::new::<sha1::Sha1>(),
        DigestAlgorithm::Sha256 => Pkcs1v15Sign::new::<sha2::Sha256>(),
        DigestAlgorithm::Sha384 => Pkcs1v15Sign::new::<sha2::Sha384>(),
        DigestAlgorithm::Sha512 => Pkcs1v15Sign::new::<sha2::Sha512>(),
    };
    key.verify(scheme, hashed, signature)
        .map_err(|e| Error::Crypto(format!("RSA signature check failed: {}", e)))
}

fn verify_p256(spki_der: &[u8], hashed: &[u8], signature: &[u8]) -> Result<()> {
    use p256::ecdsa::{Signature, VerifyingKey};

    let key = VerifyingKey::from_public_key_der(spki_der)
        .map_err(|e| Error::UnsupportedKeyAlgorithm(format!("EC key is not P-256: {}", e)))?;
    let signature = Signature::from_der(signature)
        .map_err(|e| Error::Crypto(format!("ECDSA signature encoding: {}", e)))?;
    key.verify_prehash(hashed, &signature)
        .map_err(|e| Error::Crypto(format!("ECDSA signature check failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::{ec_credential, rsa_credential};
    use crate::store::SigningKey;
    use sha2::Sha256;

    fn sign_with(handle: &crate::store::CredentialHandle, content: &[u8]) -> Vec<u8> {
        match handle.signing_key().unwrap() {
            SigningKey::Rsa(key) => {
                let signer = rsa::pkcs1v15::SigningKey::<Sha256>::new(key.clone());
                sign_detached::<_, rsa::pkcs1v15::Signature>(content, &signer, handle.der(), &[])
                    .unwrap()
            },
            SigningKey::EcP256(key) => {
                sign_detached::<_, p256::ecdsa::DerSignature>(content, key, handle.der(), &[])
                    .unwrap()
            },
        }
    }

    #[test]
    fn test_rsa_sign_and_verify() {
        let alice = rsa_credential("CN=Alice,2.5.4.5=A1", 1, 365);
        let cms = sign_with(&alice, b"covered bytes");
        let signed = verify_detached(&cms, b"covered bytes").unwrap();
        assert_eq!(signed.signer_certificate_der().unwrap(), alice.der());
        assert_eq!(signed.signer_subject().unwrap(), alice.subject());
        assert_eq!(signed.digest_algorithm().unwrap(), DigestAlgorithm::Sha256);
    }

    #[test]
    fn test_ec_sign_and_verify() {
        let bob = ec_credential("CN=Bob,2.5.4.5=B2", 2, 365);
        let cms = sign_with(&bob, b"covered bytes");
        assert!(verify_detached(&cms, b"covered bytes").is_ok());
    }

    #[test]
    fn test_tampered_content_fails() {
        let alice = rsa_credential("CN=Alice", 1, 365);
        let cms = sign_with(&alice, b"covered bytes");
        let err = verify_detached(&cms, b"covered byteZ").unwrap_err();
        assert!(err.to_string().contains("message digest"));
    }

    #[test]
    fn test_zero_padding_is_ignored() {
        let bob = ec_credential("CN=Bob", 2, 365);
        let mut cms = sign_with(&bob, b"data");
        cms.extend_from_slice(&[0u8; 64]);
        assert!(verify_detached(&cms, b"data").is_ok());
    }

    #[test]
    fn test_chain_is_embedded() {
        let alice = rsa_credential("CN=Alice", 1, 365);
        let root = ec_credential("CN=Root", 9, 365);
        let SigningKey::Rsa(key) = alice.signing_key().unwrap() else {
            panic!("expected RSA key");
        };
        let signer = rsa::pkcs1v15::SigningKey::<Sha256>::new(key.clone());
        let cms = sign_detached::<_, rsa::pkcs1v15::Signature>(
            b"data",
            &signer,
            alice.der(),
            &[root.der().to_vec()],
        )
        .unwrap();
        let signed = SignedContents::parse(&cms).unwrap();
        assert_eq!(signed.certificates_der().len(), 2);
        assert_eq!(signed.signer_certificate_der().unwrap(), alice.der());
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(SignedContents::parse(&[0u8; 32]).is_err());
        assert!(SignedContents::parse(b"").is_err());
    }
}
