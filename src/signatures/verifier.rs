//! PDF signature verification.
//!
//! Two entry points:
//!
//! - [`verify_document`] reports on every signature field;
//! - [`verify_signed_by`] looks for the field signed by one specific
//!   credential, matching on the serial identity of the signer certificate.
//!
//! Neither validates certificate chains or revocation. A signer is
//! recognized by its identity attribute alone, which is an application
//! convention and not a trust decision.

use super::byterange::ByteRangeCalculator;
use super::cms::SignedContents;
use super::fields::collect_fields;
use super::types::{FieldReport, SignMatch, SignatureField, VerificationOutcome};
use crate::document::PdfDocument;
use crate::error::{Error, FieldRejection, Result};
use crate::identity::SerialIdentity;
use crate::store::CredentialHandle;
use std::path::Path;

/// Parse the signature container of `field` and record its signer.
fn inspect(field: &mut SignatureField) -> Result<SignedContents> {
    if field.contents.iter().all(|b| *b == 0) {
        return Err(Error::InvalidPdf("/Contents is empty".to_string()));
    }
    let signed = SignedContents::parse(&field.contents)?;
    field.signer_subject = signed.signer_subject();
    field.identity = field
        .signer_subject
        .as_deref()
        .and_then(SerialIdentity::from_subject);
    Ok(signed)
}

/// Signature fields of a document in the order they were applied.
///
/// Each field whose `/Contents` parses carries its signer subject and
/// serial identity. Signatures are not checked here.
pub fn signature_fields(data: &[u8]) -> Result<Vec<SignatureField>> {
    let mut doc = PdfDocument::from_bytes(data.to_vec())?;
    let mut fields = collect_fields(&mut doc)?;
    for field in &mut fields {
        if let Err(e) = inspect(field) {
            log::debug!("Field '{}' has no readable signature: {}", field.name, e);
        }
    }
    Ok(fields)
}

/// Check the signature of `field` against the bytes it covers.
fn check_integrity(data: &[u8], field: &SignatureField, signed: &SignedContents) -> Result<()> {
    let byte_range = field
        .byte_range()
        .ok_or_else(|| Error::InvalidPdf(format!("malformed ByteRange {:?}", field.byte_range)))?;
    ByteRangeCalculator::validate_byte_range(data, &byte_range)?;
    let covered = ByteRangeCalculator::extract_signed_bytes(data, &byte_range)?;
    signed.verify(&covered)
}

fn covers_whole_document(data: &[u8], field: &SignatureField) -> bool {
    field
        .byte_range()
        .is_some_and(|br| ByteRangeCalculator::covers_whole_document(data, &br))
}

/// Verify every signature field of a document.
///
/// Fields are reported in the order they were applied. A field is valid
/// when its signer has a serial identity, its signature checks out against
/// the bytes it covers and, for the most recent field only, it covers the
/// whole document. Earlier fields are expected to stop where a later
/// revision begins.
pub fn verify_document(data: &[u8]) -> Result<VerificationOutcome> {
    let mut doc = PdfDocument::from_bytes(data.to_vec())?;
    let mut fields = collect_fields(&mut doc)?;
    if fields.is_empty() {
        return Err(Error::NoSignaturesPresent);
    }

    let last = fields.len() - 1;
    let reports: Vec<FieldReport> = fields
        .iter_mut()
        .enumerate()
        .map(|(i, field)| report_field(data, field, i == last))
        .collect();
    let all_valid = reports.iter().all(|r| r.valid);

    log::info!(
        "Verified {} signature fields: {}",
        reports.len(),
        if all_valid { "all valid" } else { "some invalid" }
    );
    Ok(VerificationOutcome {
        total: reports.len(),
        fields: reports,
        all_valid,
    })
}

fn report_field(data: &[u8], field: &mut SignatureField, is_latest: bool) -> FieldReport {
    let covers = covers_whole_document(data, field);
    let mut report = FieldReport {
        name: field.name.clone(),
        valid: false,
        integrity: false,
        covers_whole_document: covers,
        is_latest,
        signer_subject: None,
        identity: None,
        signing_time: field.signing_time.clone(),
        error: None,
    };

    let signed = match inspect(field) {
        Ok(signed) => signed,
        Err(e) => {
            report.error = Some(format!("no signature data: {}", e));
            return report;
        },
    };
    report.signer_subject = field.signer_subject.clone();
    report.identity = field.identity.clone();

    let integrity = check_integrity(data, field, &signed);
    report.integrity = integrity.is_ok();

    report.error = if field.signer_subject.is_none() {
        Some("no signer certificate".to_string())
    } else if field.identity.is_none() {
        Some("identity attribute missing from the signer certificate".to_string())
    } else if let Err(e) = integrity {
        Some(e.to_string())
    } else if is_latest && !covers {
        Some("unsigned content was appended after this signature".to_string())
    } else {
        None
    };
    report.valid = report.error.is_none();

    if let Some(reason) = &report.error {
        log::warn!("Signature '{}' is invalid: {}", field.name, reason);
    }
    report
}

/// Verify a document on disk. See [`verify_document`].
pub fn verify_file(path: impl AsRef<Path>) -> Result<VerificationOutcome> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|_| Error::InputNotFound(path.to_path_buf()))?;
    verify_document(&data)
}

/// Find and check the signature made by `credential`.
///
/// The credential must carry a serial identity; otherwise this fails with
/// [`Error::IdentityAttributeMissing`] before the document is read. Fields
/// are scanned in the order they were applied and the first one whose
/// signer has the same identity is checked:
///
/// - it must cover its revision, and the whole document if it is the most
///   recent field ([`Error::SignatureCoverageViolation`]);
/// - its signature must verify ([`Error::CryptographicVerificationFailure`]).
///
/// When no field matches, [`Error::SignatureIdentityMismatch`] lists why
/// each field was passed over.
///
/// Matching compares identity strings only. Any certificate that carries
/// the same serial-number attribute is accepted as the same signer.
pub fn verify_signed_by(data: &[u8], credential: &CredentialHandle) -> Result<SignMatch> {
    let expected = credential
        .identity()
        .ok_or_else(|| Error::IdentityAttributeMissing(credential.subject().to_string()))?;

    let mut doc = PdfDocument::from_bytes(data.to_vec())?;
    let mut fields = collect_fields(&mut doc)?;
    if fields.is_empty() {
        return Err(Error::NoSignaturesPresent);
    }

    let last = fields.len() - 1;
    let mut rejections = Vec::new();
    for (i, field) in fields.iter_mut().enumerate() {
        let signed = match inspect(field) {
            Ok(signed) => signed,
            Err(e) => {
                rejections.push(FieldRejection::NoSignatureData {
                    field: field.name.clone(),
                    reason: e.to_string(),
                });
                continue;
            },
        };
        let Some(subject) = field.signer_subject.clone() else {
            rejections.push(FieldRejection::NoCertificate {
                field: field.name.clone(),
            });
            continue;
        };
        let Some(found) = field.identity.clone() else {
            rejections.push(FieldRejection::MissingIdentityAttribute {
                field: field.name.clone(),
                subject,
            });
            continue;
        };
        if found != expected {
            log::debug!("Field '{}' signed by '{}', not '{}'", field.name, found, expected);
            rejections.push(FieldRejection::IdentityMismatch {
                field: field.name.clone(),
                found: found.into_inner(),
            });
            continue;
        }

        return check_match(data, field, i == last, &signed, expected, found, subject);
    }

    Err(Error::SignatureIdentityMismatch {
        expected: expected.into_inner(),
        rejections,
    })
}

fn check_match(
    data: &[u8],
    field: &SignatureField,
    is_latest: bool,
    signed: &SignedContents,
    expected: SerialIdentity,
    found: SerialIdentity,
    subject: String,
) -> Result<SignMatch> {
    let coverage_violation = |reason: String| Error::SignatureCoverageViolation {
        field: field.name.clone(),
        reason,
    };
    let byte_range = field
        .byte_range()
        .ok_or_else(|| coverage_violation(format!("malformed ByteRange {:?}", field.byte_range)))?;
    ByteRangeCalculator::validate_byte_range(data, &byte_range)
        .map_err(|e| coverage_violation(e.to_string()))?;
    let covers = ByteRangeCalculator::covers_whole_document(data, &byte_range);
    if is_latest && !covers {
        return Err(coverage_violation(
            "unsigned content was appended after the latest signature".to_string(),
        ));
    }

    let covered = ByteRangeCalculator::extract_signed_bytes(data, &byte_range)
        .map_err(|e| coverage_violation(e.to_string()))?;
    signed
        .verify(&covered)
        .map_err(|e| Error::CryptographicVerificationFailure {
            field: field.name.clone(),
            reason: e.to_string(),
        })?;

    log::info!(
        "Signature '{}' matches identity '{}'{}",
        field.name,
        expected,
        if covers { "" } else { " (covered by a later revision)" }
    );
    Ok(SignMatch {
        field: field.name.clone(),
        expected_identity: expected,
        found_identity: found,
        subject,
        covers_whole_document: covers,
        integrity: true,
    })
}

/// Targeted verification of a document on disk. See [`verify_signed_by`].
pub fn verify_file_signed_by(path: impl AsRef<Path>, credential: &CredentialHandle) -> Result<SignMatch> {
    let path = path.as_ref();
    // The identity precondition comes before any file access
    if credential.identity().is_none() {
        return Err(Error::IdentityAttributeMissing(credential.subject().to_string()));
    }
    let data = std::fs::read(path).map_err(|_| Error::InputNotFound(path.to_path_buf()))?;
    verify_signed_by(&data, credential)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signatures::testing::classic_pdf;
    use crate::signatures::{PdfSigner, SignOptions};
    use crate::store::testing::{ec_credential, rsa_credential};

    fn sign(data: Vec<u8>, credential: &CredentialHandle) -> Vec<u8> {
        PdfSigner::new(credential.clone(), SignOptions::default())
            .sign_bytes(data)
            .unwrap()
    }

    #[test]
    fn test_unsigned_document() {
        assert!(matches!(verify_document(&classic_pdf()), Err(Error::NoSignaturesPresent)));
        let alice = rsa_credential("CN=Alice,2.5.4.5=A1", 1, 365);
        assert!(matches!(
            verify_signed_by(&classic_pdf(), &alice),
            Err(Error::NoSignaturesPresent)
        ));
    }

    #[test]
    fn test_signature_fields_carry_signer() {
        let alice = rsa_credential("CN=Alice,2.5.4.5=A1", 1, 365);
        let bob = ec_credential("CN=Bob,2.5.4.5=B2", 2, 365);
        let signed = sign(sign(classic_pdf(), &alice), &bob);

        let fields = signature_fields(&signed).unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].signer_subject.as_deref(), Some(alice.subject()));
        assert_eq!(fields[0].identity.as_ref().map(|i| i.as_str()), Some("A1"));
        assert_eq!(fields[1].signer_subject.as_deref(), Some(bob.subject()));
        assert_eq!(fields[1].identity.as_ref().map(|i| i.as_str()), Some("B2"));
        assert!(signature_fields(&classic_pdf()).unwrap().is_empty());
    }

    #[test]
    fn test_single_signature_valid() {
        let alice = rsa_credential("CN=Alice,2.5.4.5=A1", 1, 365);
        let signed = sign(classic_pdf(), &alice);

        let outcome = verify_document(&signed).unwrap();
        assert_eq!(outcome.total, 1);
        assert!(outcome.all_valid);
        let field = &outcome.fields[0];
        assert!(field.integrity && field.covers_whole_document && field.is_latest);
        assert_eq!(field.identity.as_ref().map(|i| i.as_str()), Some("A1"));
    }

    #[test]
    fn test_identity_less_signer_reported_invalid() {
        let anon = ec_credential("CN=Anonymous", 3, 365);
        let outcome = verify_document(&sign(classic_pdf(), &anon)).unwrap();
        assert!(!outcome.all_valid);
        let field = &outcome.fields[0];
        assert!(field.integrity);
        assert!(field.error.as_deref().unwrap().contains("identity attribute missing"));
    }

    #[test]
    fn test_appended_bytes_invalidate_latest() {
        let alice = rsa_credential("CN=Alice,2.5.4.5=A1", 1, 365);
        let mut signed = sign(classic_pdf(), &alice);
        signed.extend_from_slice(b"% trailing comment\n");

        let outcome = verify_document(&signed).unwrap();
        let field = &outcome.fields[0];
        assert!(field.integrity);
        assert!(!field.covers_whole_document);
        assert!(!field.valid);

        let err = verify_signed_by(&signed, &alice).unwrap_err();
        assert!(matches!(err, Error::SignatureCoverageViolation { .. }));
    }

    #[test]
    fn test_tampering_breaks_integrity() {
        let alice = rsa_credential("CN=Alice,2.5.4.5=A1", 1, 365);
        let mut signed = sign(classic_pdf(), &alice);
        // Inside the MediaBox of the page, a covered byte
        let pos = signed.windows(3).position(|w| w == b"612").unwrap();
        signed[pos] = b'7';

        let outcome = verify_document(&signed).unwrap();
        assert!(!outcome.fields[0].integrity);
        assert!(!outcome.all_valid);
        assert!(matches!(
            verify_signed_by(&signed, &alice),
            Err(Error::CryptographicVerificationFailure { .. })
        ));
    }

    #[test]
    fn test_targeted_match_across_revisions() {
        let alice = rsa_credential("CN=Alice,2.5.4.5=A1", 1, 365);
        let bob = ec_credential("CN=Bob,2.5.4.5=B2", 2, 365);
        let signed = sign(sign(classic_pdf(), &alice), &bob);

        let a = verify_signed_by(&signed, &alice).unwrap();
        assert_eq!(a.field, "Signature1");
        assert_eq!(a.found_identity.as_str(), "A1");
        assert!(a.integrity);
        assert!(!a.covers_whole_document);

        let b = verify_signed_by(&signed, &bob).unwrap();
        assert_eq!(b.field, "Signature2");
        assert!(b.covers_whole_document);

        assert!(verify_document(&signed).unwrap().all_valid);
    }

    #[test]
    fn test_mismatch_lists_every_field() {
        let alice = rsa_credential("CN=Alice,2.5.4.5=A1", 1, 365);
        let anon = ec_credential("CN=Anonymous", 3, 365);
        let carol = rsa_credential("CN=Carol,2.5.4.5=C3", 4, 365);
        let signed = sign(sign(classic_pdf(), &alice), &anon);

        match verify_signed_by(&signed, &carol).unwrap_err() {
            Error::SignatureIdentityMismatch { expected, rejections } => {
                assert_eq!(expected, "C3");
                assert_eq!(rejections.len(), 2);
                assert!(matches!(
                    &rejections[0],
                    FieldRejection::IdentityMismatch { found, .. } if found == "A1"
                ));
                assert!(matches!(
                    &rejections[1],
                    FieldRejection::MissingIdentityAttribute { .. }
                ));
            },
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_identity_less_credential_fails_first() {
        let anon = rsa_credential("CN=Anonymous", 3, 365);
        // Not even a PDF; the precondition is checked before parsing
        assert!(matches!(
            verify_signed_by(b"garbage", &anon),
            Err(Error::IdentityAttributeMissing(_))
        ));
        assert!(matches!(
            verify_file_signed_by("/nonexistent.pdf", &anon),
            Err(Error::IdentityAttributeMissing(_))
        ));
    }
}
