//! Error types for the signing library.
//!
//! This module defines all error types that can occur while reading PDF
//! structure, resolving credentials, applying signatures and verifying them.

use std::path::PathBuf;

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a signature field was skipped during a targeted identity match.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub enum FieldRejection {
    /// The field has no readable signature value
    NoSignatureData {
        /// Field name
        field: String,
        /// What went wrong while reading it
        reason: String,
    },
    /// The signature container carries no signer certificate
    NoCertificate {
        /// Field name
        field: String,
    },
    /// The signer certificate has no serial-identity attribute
    MissingIdentityAttribute {
        /// Field name
        field: String,
        /// Signer subject
        subject: String,
    },
    /// The signer identity differs from the expected one
    IdentityMismatch {
        /// Field name
        field: String,
        /// Identity found in the field
        found: String,
    },
}

impl std::fmt::Display for FieldRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldRejection::NoSignatureData { field, reason } => {
                write!(f, "{}: no signature data ({})", field, reason)
            },
            FieldRejection::NoCertificate { field } => {
                write!(f, "{}: no signer certificate", field)
            },
            FieldRejection::MissingIdentityAttribute { field, subject } => {
                write!(f, "{}: identity attribute missing in '{}'", field, subject)
            },
            FieldRejection::IdentityMismatch { field, found } => {
                write!(f, "{}: identity mismatch (found '{}')", field, found)
            },
        }
    }
}

fn join_rejections(rejections: &[FieldRejection]) -> String {
    if rejections.is_empty() {
        return "no signature fields inspected".to_string();
    }
    rejections
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Error types that can occur during signing and verification.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// Invalid PDF header (expected '%PDF-')
    #[error("Invalid PDF header: expected '%PDF-', found '{0}'")]
    InvalidHeader(String),

    /// Parse error at specific byte offset
    #[error("Failed to parse object at byte {offset}: {reason}")]
    ParseError {
        /// Byte offset where error occurred
        offset: usize,
        /// Reason for parse failure
        reason: String,
    },

    /// Invalid cross-reference table
    #[error("Invalid cross-reference table")]
    InvalidXref,

    /// Referenced object not found in cross-reference table
    #[error("Object not found: {0} {1} R")]
    ObjectNotFound(u32, u16),

    /// Object has wrong type
    #[error("Invalid object type: expected {expected}, found {found}")]
    InvalidObjectType {
        /// Expected object type
        expected: String,
        /// Actual object type found
        found: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unsupported feature
    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    /// Invalid PDF structure (generic)
    #[error("Invalid PDF: {0}")]
    InvalidPdf(String),

    /// Stream decoding error
    #[error("Stream decoding error: {0}")]
    Decode(String),

    /// Unsupported stream filter
    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// Circular reference detected in object graph
    #[error("Circular reference detected: object {0}")]
    CircularReference(crate::object::ObjectRef),

    /// Recursion depth limit exceeded
    #[error("Recursion depth limit exceeded (max: {0})")]
    RecursionLimitExceeded(u32),

    /// No usable credential for the identifier
    #[error("No usable signing certificate found for '{0}'")]
    CredentialNotFound(String),

    /// Key type other than RSA or EC P-256
    #[error("Unsupported key algorithm: {0}")]
    UnsupportedKeyAlgorithm(String),

    /// Input document missing or unreadable
    #[error("Input document not found or unreadable: {}", .0.display())]
    InputNotFound(PathBuf),

    /// Output location cannot be written
    #[error("Cannot write output to {}: {reason}", .path.display())]
    OutputUnwritable {
        /// Requested output path
        path: PathBuf,
        /// Underlying cause
        reason: String,
    },

    /// Document carries no signature fields
    #[error("Document contains no signatures")]
    NoSignaturesPresent,

    /// The credential subject lacks the serial-identity attribute
    #[error("Certificate subject '{0}' has no serial-identity attribute")]
    IdentityAttributeMissing(String),

    /// No signature field carries the expected identity
    #[error("No signature matches identity '{expected}': {}", join_rejections(.rejections))]
    SignatureIdentityMismatch {
        /// Identity that was searched for
        expected: String,
        /// Why each field was rejected
        rejections: Vec<FieldRejection>,
    },

    /// Matched signature does not cover what it must cover
    #[error("Signature '{field}' coverage violation: {reason}")]
    SignatureCoverageViolation {
        /// Field name
        field: String,
        /// Description of the violation
        reason: String,
    },

    /// Matched signature failed the integrity check
    #[error("Signature '{field}' failed cryptographic verification: {reason}")]
    CryptographicVerificationFailure {
        /// Field name
        field: String,
        /// Description of the failure
        reason: String,
    },

    /// Batch input directory does not exist
    #[error("Directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    /// Certificate could not be parsed
    #[error("Certificate error: {0}")]
    Certificate(String),

    /// Cryptographic primitive or CMS encoding failure
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A signing call failed; wraps the first fatal cause
    #[error("Signing {} failed: {source}", .path.display())]
    Signing {
        /// Input document
        path: PathBuf,
        /// Underlying cause
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap this error as the cause of a failed signing call.
    pub fn signing(path: impl Into<PathBuf>, source: Error) -> Self {
        match source {
            already @ Error::Signing { .. } => already,
            other => Error::Signing {
                path: path.into(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost cause, looking through [`Error::Signing`].
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Signing { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_header_error() {
        let err = Error::InvalidHeader("NotAPDF".to_string());
        let msg = format!("{}", err);
        assert!(msg.contains("Invalid PDF header"));
        assert!(msg.contains("NotAPDF"));
    }

    #[test]
    fn test_object_not_found_error() {
        let err = Error::ObjectNotFound(10, 0);
        assert!(format!("{}", err).contains("10 0 R"));
    }

    #[test]
    fn test_identity_mismatch_lists_every_rejection() {
        let err = Error::SignatureIdentityMismatch {
            expected: "A1".to_string(),
            rejections: vec![
                FieldRejection::IdentityMismatch {
                    field: "Signature1".to_string(),
                    found: "B2".to_string(),
                },
                FieldRejection::NoCertificate {
                    field: "Signature2".to_string(),
                },
                FieldRejection::MissingIdentityAttribute {
                    field: "Signature3".to_string(),
                    subject: "CN=Carol".to_string(),
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("'A1'"));
        assert!(msg.contains("Signature1: identity mismatch (found 'B2')"));
        assert!(msg.contains("Signature2: no signer certificate"));
        assert!(msg.contains("Signature3: identity attribute missing"));
    }

    #[test]
    fn test_signing_error_carries_cause() {
        let err = Error::signing("in.pdf", Error::UnsupportedKeyAlgorithm("1.3.101.112".into()));
        let msg = err.to_string();
        assert!(msg.contains("in.pdf"));
        assert!(msg.contains("1.3.101.112"));
        assert!(matches!(err.root_cause(), Error::UnsupportedKeyAlgorithm(_)));
    }

    #[test]
    fn test_signing_error_not_double_wrapped() {
        let inner = Error::signing("a.pdf", Error::NoSignaturesPresent);
        let outer = Error::signing("b.pdf", inner);
        assert!(outer.to_string().contains("a.pdf"));
        assert!(matches!(outer.root_cause(), Error::NoSignaturesPresent));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
