//! Signature types and results.

use crate::config::{IdentityPolicy, SealConfig, DEFAULT_SIGNATURE_SIZE};
use crate::identity::SerialIdentity;
use const_oid::ObjectIdentifier;
use serde::Serialize;
use sha2::Digest;

/// Digest algorithm of a signer info.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestAlgorithm {
    /// SHA-1, still found in older documents
    Sha1,
    /// SHA-256, used for every new signature
    #[default]
    Sha256,
    /// SHA-384
    Sha384,
    /// SHA-512
    Sha512,
}

impl DigestAlgorithm {
    /// 1.3.14.3.2.26
    pub const OID_SHA1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.14.3.2.26");
    /// 2.16.840.1.101.3.4.2.1
    pub const OID_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");
    /// 2.16.840.1.101.3.4.2.2
    pub const OID_SHA384: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.2");
    /// 2.16.840.1.101.3.4.2.3
    pub const OID_SHA512: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.3");

    /// Algorithm identifier.
    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            DigestAlgorithm::Sha1 => Self::OID_SHA1,
            DigestAlgorithm::Sha256 => Self::OID_SHA256,
            DigestAlgorithm::Sha384 => Self::OID_SHA384,
            DigestAlgorithm::Sha512 => Self::OID_SHA512,
        }
    }

    /// Look up an algorithm by identifier.
    pub fn from_oid(oid: &ObjectIdentifier) -> Option<Self> {
        [Self::Sha1, Self::Sha256, Self::Sha384, Self::Sha512]
            .into_iter()
            .find(|alg| alg.oid() == *oid)
    }

    /// Get the name of this algorithm.
    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha1 => "SHA-1",
            DigestAlgorithm::Sha256 => "SHA-256",
            DigestAlgorithm::Sha384 => "SHA-384",
            DigestAlgorithm::Sha512 => "SHA-512",
        }
    }

    /// Hash `data`.
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            DigestAlgorithm::Sha1 => sha1::Sha1::digest(data).to_vec(),
            DigestAlgorithm::Sha256 => sha2::Sha256::digest(data).to_vec(),
            DigestAlgorithm::Sha384 => sha2::Sha384::digest(data).to_vec(),
            DigestAlgorithm::Sha512 => sha2::Sha512::digest(data).to_vec(),
        }
    }
}

/// `/SubFilter` of the signatures this crate writes.
pub const PKCS7_DETACHED: &str = "adbe.pkcs7.detached";

/// Options for signing a PDF.
#[derive(Debug, Clone)]
pub struct SignOptions {
    /// Reason for signing
    pub reason: Option<String>,
    /// Location where the document was signed
    pub location: Option<String>,
    /// Contact information
    pub contact_info: Option<String>,
    /// Name of the signer (if different from certificate CN)
    pub name: Option<String>,
    /// Bytes reserved for the DER-encoded CMS signature
    pub estimated_size: usize,
    /// Handling of certificates without a serial identity
    pub identity_policy: IdentityPolicy,
}

impl Default for SignOptions {
    fn default() -> Self {
        Self {
            reason: None,
            location: None,
            contact_info: None,
            name: None,
            estimated_size: DEFAULT_SIGNATURE_SIZE,
            identity_policy: IdentityPolicy::Warn,
        }
    }
}

impl SignOptions {
    /// Options seeded from configuration defaults.
    pub fn from_config(config: &SealConfig) -> Self {
        Self {
            reason: config.reason.clone(),
            location: config.location.clone(),
            contact_info: config.contact_info.clone(),
            estimated_size: config.signature_size,
            identity_policy: config.identity_policy,
            ..Self::default()
        }
    }

    /// Set the reason for signing.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Set the signing location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set the contact information.
    pub fn with_contact_info(mut self, contact: impl Into<String>) -> Self {
        self.contact_info = Some(contact.into());
        self
    }

    /// Set the signer name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the signature reserve.
    pub fn with_estimated_size(mut self, bytes: usize) -> Self {
        self.estimated_size = bytes;
        self
    }

    /// Set the identity policy.
    pub fn with_identity_policy(mut self, policy: IdentityPolicy) -> Self {
        self.identity_policy = policy;
        self
    }
}

/// A signed signature field read from a document.
#[derive(Debug, Clone, Default)]
pub struct SignatureField {
    /// Fully qualified field name
    pub name: String,
    /// `/ByteRange` as written, possibly malformed
    pub byte_range: Vec<i64>,
    /// Decoded `/Contents` (DER CMS, usually zero padded)
    pub contents: Vec<u8>,
    /// `/SubFilter` name
    pub sub_filter: Option<String>,
    /// `/Reason`
    pub reason: Option<String>,
    /// `/Location`
    pub location: Option<String>,
    /// `/ContactInfo`
    pub contact_info: Option<String>,
    /// `/Name`
    pub signer_name: Option<String>,
    /// `/M`
    pub signing_time: Option<String>,
    /// Subject of the embedded signer certificate, once resolved
    pub signer_subject: Option<String>,
    /// Serial identity of the signer, once resolved
    pub identity: Option<SerialIdentity>,
}

impl SignatureField {
    /// The byte range as four offsets, if it has that shape.
    pub fn byte_range(&self) -> Option<[i64; 4]> {
        <[i64; 4]>::try_from(self.byte_range.as_slice()).ok()
    }

    /// End of the covered bytes; orders fields by revision.
    pub fn revision_end(&self) -> i64 {
        self.byte_range()
            .and_then(|br| br[2].checked_add(br[3]))
            .unwrap_or(i64::MAX)
    }
}

/// Per-field result of open verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldReport {
    /// Field name
    pub name: String,
    /// Overall verdict for this field
    pub valid: bool,
    /// Digest and signature check result
    pub integrity: bool,
    /// Whether the field covers the document as it is now
    pub covers_whole_document: bool,
    /// Whether this is the most recently applied signature
    pub is_latest: bool,
    /// Signer certificate subject
    pub signer_subject: Option<String>,
    /// Signer serial identity
    pub identity: Option<SerialIdentity>,
    /// `/M` value
    pub signing_time: Option<String>,
    /// Why the field is invalid
    pub error: Option<String>,
}

/// Result of open verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationOutcome {
    /// Number of signature fields
    pub total: usize,
    /// Reports in revision order
    pub fields: Vec<FieldReport>,
    /// True only when every field is valid
    pub all_valid: bool,
}

/// Successful targeted identity match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignMatch {
    /// Matched field
    pub field: String,
    /// Identity of the supplied credential
    pub expected_identity: SerialIdentity,
    /// Identity found in the field
    pub found_identity: SerialIdentity,
    /// Signer certificate subject
    pub subject: String,
    /// Whether the field covers the document as it is now
    pub covers_whole_document: bool,
    /// Digest and signature check result
    pub integrity: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_algorithm_oid_round_trip() {
        for alg in [
            DigestAlgorithm::Sha1,
            DigestAlgorithm::Sha256,
            DigestAlgorithm::Sha384,
            DigestAlgorithm::Sha512,
        ] {
            assert_eq!(DigestAlgorithm::from_oid(&alg.oid()), Some(alg));
        }
        let md5 = ObjectIdentifier::new_unwrap("1.2.840.113549.2.5");
        assert_eq!(DigestAlgorithm::from_oid(&md5), None);
    }

    #[test]
    fn test_digest_lengths() {
        assert_eq!(DigestAlgorithm::Sha1.digest(b"abc").len(), 20);
        assert_eq!(DigestAlgorithm::Sha256.digest(b"abc").len(), 32);
        assert_eq!(DigestAlgorithm::Sha512.digest(b"abc").len(), 64);
    }

    #[test]
    fn test_sign_options_from_config() {
        let config = SealConfig::new()
            .with_reason("Approved")
            .with_signature_size(4096)
            .with_identity_policy(IdentityPolicy::Require);
        let opts = SignOptions::from_config(&config).with_location("Berlin");
        assert_eq!(opts.reason.as_deref(), Some("Approved"));
        assert_eq!(opts.location.as_deref(), Some("Berlin"));
        assert_eq!(opts.estimated_size, 4096);
        assert_eq!(opts.identity_policy, IdentityPolicy::Require);
    }

    #[test]
    fn test_revision_end() {
        let field = SignatureField {
            byte_range: vec![0, 10, 20, 30],
            ..Default::default()
        };
        assert_eq!(field.revision_end(), 50);
        let malformed = SignatureField {
            byte_range: vec![0, 10],
            ..Default::default()
        };
        assert_eq!(malformed.byte_range(), None);
        assert_eq!(malformed.revision_end(), i64::MAX);
    }
}
