//! PDF signing implementation.
//!
//! A signature is added as one incremental update holding:
//!
//! - the signature dictionary, with fixed-width `/ByteRange` and
//!   `/Contents` placeholders;
//! - an invisible widget annotation that is also the signature field;
//! - the catalog or `/AcroForm` with the new field and `/SigFlags 3`;
//! - the first page with the widget in its `/Annots`.
//!
//! Once the update is written the byte range is filled in, the covered
//! bytes are signed and the CMS blob is written into the `/Contents` hole.
//! Both placeholders are overwritten in place, so no offset moves.

use super::byterange::ByteRangeCalculator;
use super::cms::sign_detached;
use super::fields::field_names;
use super::types::{SignOptions, PKCS7_DETACHED};
use crate::config::IdentityPolicy;
use crate::decoders::encode_hex_upper;
use crate::document::PdfDocument;
use crate::error::{Error, Result};
use crate::object::{encode_text_string, Dictionary, Object, ObjectRef};
use crate::store::{CredentialHandle, KeyAlgorithm, SigningKey};
use crate::writer::{IncrementalUpdate, ObjectSerializer};
use chrono::{DateTime, Utc};
use sha2::Sha256;
use std::path::Path;

/// Annotation flags: Print | Locked.
const WIDGET_FLAGS: i64 = 4 | 128;
/// SignaturesExist | AppendOnly.
const SIG_FLAGS: i64 = 3;

/// Placeholder positions inside a signature dictionary body.
#[derive(Debug, Clone, Copy)]
struct Placeholders {
    byte_range: usize,
    contents: usize,
}

/// PDF signer that creates detached CMS signatures.
pub struct PdfSigner {
    credential: CredentialHandle,
    options: SignOptions,
    byte_range_calc: ByteRangeCalculator,
}

impl PdfSigner {
    /// Create a signer for `credential`.
    pub fn new(credential: CredentialHandle, options: SignOptions) -> Self {
        let byte_range_calc = ByteRangeCalculator::new(options.estimated_size);
        Self {
            credential,
            options,
            byte_range_calc,
        }
    }

    /// Get the signing options.
    pub fn options(&self) -> &SignOptions {
        &self.options
    }

    /// The credential signatures are made with.
    pub fn credential(&self) -> &CredentialHandle {
        &self.credential
    }

    /// Sign `input` and write the result to `output`.
    ///
    /// The input is never modified. Any failure is reported as
    /// [`Error::Signing`] wrapping the cause, and nothing is written.
    pub fn sign(&self, input: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<()> {
        let input = input.as_ref();
        self.sign_file(input, output.as_ref())
            .map_err(|e| Error::signing(input, e))
    }

    fn sign_file(&self, input: &Path, output: &Path) -> Result<()> {
        if same_file(input, output) {
            return Err(Error::OutputUnwritable {
                path: output.to_path_buf(),
                reason: "output would overwrite the input document".to_string(),
            });
        }
        let data = std::fs::read(input).map_err(|e| {
            log::debug!("Cannot read {}: {}", input.display(), e);
            Error::InputNotFound(input.to_path_buf())
        })?;

        let signed = self.sign_bytes(data)?;

        std::fs::write(output, &signed).map_err(|e| Error::OutputUnwritable {
            path: output.to_path_buf(),
            reason: e.to_string(),
        })?;
        log::info!(
            "Signed {} -> {} as '{}'",
            input.display(),
            output.display(),
            self.credential.subject()
        );
        Ok(())
    }

    /// Sign a document held in memory and return the updated bytes.
    ///
    /// The returned bytes start with `data` unchanged.
    pub fn sign_bytes(&self, data: Vec<u8>) -> Result<Vec<u8>> {
        self.check_credential()?;

        let mut doc = PdfDocument::from_bytes(data)?;
        let mut update = IncrementalUpdate::new(&doc)?;

        let field_name = next_field_name(&field_names(&mut doc)?);
        let page_ref = doc.first_page_ref()?;
        let sig_ref = update.allocate()?;
        let widget_ref = update.allocate()?;

        let (sig_body, placeholders) = self.signature_dictionary(Utc::now());
        update.set_raw(sig_ref, sig_body);
        update.set_object(widget_ref, widget(&field_name, sig_ref, page_ref));
        register_field(&mut doc, &mut update, widget_ref)?;
        add_annotation(&mut doc, &mut update, page_ref, widget_ref)?;

        let written = update.write(&doc.into_data())?;
        let mut bytes = written.bytes;
        let sig_offset = written
            .offsets
            .get(&sig_ref.id)
            .copied()
            .ok_or_else(|| Error::InvalidPdf("signature dictionary was not written".to_string()))?
            as usize;
        let body_start = sig_offset + format!("{} {} obj\n", sig_ref.id, sig_ref.gen).len();
        let byte_range_offset = body_start + placeholders.byte_range;
        let contents_offset = body_start + placeholders.contents;

        let byte_range = self
            .byte_range_calc
            .calculate_byte_range(bytes.len(), contents_offset);
        let formatted = ByteRangeCalculator::format_byte_range(&byte_range)?;
        bytes[byte_range_offset..byte_range_offset + formatted.len()]
            .copy_from_slice(formatted.as_bytes());

        let covered = ByteRangeCalculator::extract_signed_bytes(&bytes, &byte_range)?;
        let cms = self.create_signature(&covered)?;
        self.byte_range_calc
            .insert_signature(&mut bytes, contents_offset, &encode_hex_upper(&cms))?;

        log::debug!(
            "Added field '{}' ({} byte CMS, ByteRange {:?})",
            field_name,
            cms.len(),
            byte_range
        );
        Ok(bytes)
    }

    fn check_credential(&self) -> Result<()> {
        if let KeyAlgorithm::Other(alg) = self.credential.key_algorithm() {
            return Err(Error::UnsupportedKeyAlgorithm(alg.clone()));
        }
        if !self.credential.has_private_key() {
            return Err(Error::CredentialNotFound(self.credential.subject().to_string()));
        }
        if self.credential.identity().is_none() {
            match self.options.identity_policy {
                IdentityPolicy::Warn => log::warn!(
                    "Certificate '{}' has no serial-identity attribute; the signature cannot be matched by identity",
                    self.credential.subject()
                ),
                IdentityPolicy::Require => {
                    return Err(Error::IdentityAttributeMissing(
                        self.credential.subject().to_string(),
                    ))
                },
            }
        }
        Ok(())
    }

    /// Signature dictionary body and where its placeholders start.
    fn signature_dictionary(&self, signing_time: DateTime<Utc>) -> (Vec<u8>, Placeholders) {
        let serializer = ObjectSerializer::compact();
        let mut body = format!(
            "<< /Type /Sig /Filter /Adobe.PPKLite /SubFilter /{} /ByteRange ",
            PKCS7_DETACHED
        )
        .into_bytes();

        let byte_range = body.len();
        body.extend_from_slice(ByteRangeCalculator::byte_range_placeholder().as_bytes());
        body.extend_from_slice(b" /Contents ");
        let contents = body.len();
        body.extend_from_slice(self.byte_range_calc.generate_placeholder().as_bytes());

        body.extend_from_slice(b" /M ");
        serializer.write_object(&mut body, &Object::String(format_pdf_date(signing_time).into_bytes()));
        let entries = [
            ("Name", &self.options.name),
            ("Reason", &self.options.reason),
            ("Location", &self.options.location),
            ("ContactInfo", &self.options.contact_info),
        ];
        for (key, value) in entries {
            if let Some(text) = value {
                body.extend_from_slice(format!(" /{} ", key).as_bytes());
                serializer.write_object(&mut body, &Object::String(encode_text_string(text)));
            }
        }
        body.extend_from_slice(b" >>");

        (body, Placeholders { byte_range, contents })
    }

    fn create_signature(&self, covered: &[u8]) -> Result<Vec<u8>> {
        let certificate = self.credential.der();
        let chain = self.credential.chain();
        match self.credential.signing_key() {
            Some(SigningKey::Rsa(key)) => {
                let signer = rsa::pkcs1v15::SigningKey::<Sha256>::new(key.clone());
                sign_detached::<_, rsa::pkcs1v15::Signature>(covered, &signer, certificate, chain)
            },
            Some(SigningKey::EcP256(key)) => {
                sign_detached::<_, p256::ecdsa::DerSignature>(covered, key, certificate, chain)
            },
            None => Err(Error::CredentialNotFound(self.credential.subject().to_string())),
        }
    }
}

impl std::fmt::Debug for PdfSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfSigner")
            .field("subject", &self.credential.subject())
            .field("options", &self.options)
            .finish()
    }
}

/// `SignatureN` with the smallest N not already taken.
fn next_field_name(existing: &[String]) -> String {
    (1..)
        .map(|n| format!("Signature{}", n))
        .find(|name| !existing.iter().any(|e| e == name))
        .unwrap_or_else(|| "Signature".to_string())
}

/// Merged field and widget dictionary.
fn widget(name: &str, sig_ref: ObjectRef, page_ref: ObjectRef) -> Object {
    let name_obj = |n: &str| Object::Name(n.to_string());
    let mut dict = Dictionary::new();
    dict.insert("Type".to_string(), name_obj("Annot"));
    dict.insert("Subtype".to_string(), name_obj("Widget"));
    dict.insert("FT".to_string(), name_obj("Sig"));
    dict.insert("T".to_string(), Object::String(encode_text_string(name)));
    dict.insert("V".to_string(), Object::Reference(sig_ref));
    dict.insert("P".to_string(), Object::Reference(page_ref));
    dict.insert("F".to_string(), Object::Integer(WIDGET_FLAGS));
    dict.insert("Rect".to_string(), Object::Array(vec![Object::Integer(0); 4]));
    Object::Dictionary(dict)
}

/// Add `widget_ref` to the AcroForm `/Fields`, creating the form if needed.
fn register_field(
    doc: &mut PdfDocument,
    update: &mut IncrementalUpdate,
    widget_ref: ObjectRef,
) -> Result<()> {
    let catalog_ref = doc.catalog_ref()?;
    let mut catalog = doc.catalog()?;

    let (form_ref, mut form) = match catalog.get("AcroForm") {
        Some(Object::Reference(r)) => (Some(*r), doc.resolve_dict(&Object::Reference(*r))?),
        Some(Object::Dictionary(d)) => (None, d.clone()),
        Some(other) => {
            log::warn!("Ignoring malformed /AcroForm ({})", other.type_name());
            (None, Dictionary::new())
        },
        None => (None, Dictionary::new()),
    };

    match form.get("Fields") {
        Some(Object::Reference(fields_ref)) => {
            let fields_ref = *fields_ref;
            let mut fields = array_at(doc, fields_ref)?;
            fields.push(Object::Reference(widget_ref));
            update.set_object(fields_ref, Object::Array(fields));
        },
        Some(Object::Array(fields)) => {
            let mut fields = fields.clone();
            fields.push(Object::Reference(widget_ref));
            form.insert("Fields".to_string(), Object::Array(fields));
        },
        _ => {
            form.insert("Fields".to_string(), Object::Array(vec![Object::Reference(widget_ref)]));
        },
    }
    let flags = form.get("SigFlags").and_then(|f| f.as_integer()).unwrap_or(0);
    form.insert("SigFlags".to_string(), Object::Integer(flags | SIG_FLAGS));

    match form_ref {
        Some(r) => update.set_object(r, Object::Dictionary(form)),
        None => {
            catalog.insert("AcroForm".to_string(), Object::Dictionary(form));
            update.set_object(catalog_ref, Object::Dictionary(catalog));
        },
    }
    Ok(())
}

/// Append `widget_ref` to the page's `/Annots`.
fn add_annotation(
    doc: &mut PdfDocument,
    update: &mut IncrementalUpdate,
    page_ref: ObjectRef,
    widget_ref: ObjectRef,
) -> Result<()> {
    let mut page = doc.resolve_dict(&Object::Reference(page_ref))?;
    match page.get("Annots") {
        Some(Object::Reference(annots_ref)) => {
            let annots_ref = *annots_ref;
            let mut annots = array_at(doc, annots_ref)?;
            annots.push(Object::Reference(widget_ref));
            update.set_object(annots_ref, Object::Array(annots));
            return Ok(());
        },
        Some(Object::Array(annots)) => {
            let mut annots = annots.clone();
            annots.push(Object::Reference(widget_ref));
            page.insert("Annots".to_string(), Object::Array(annots));
        },
        _ => {
            page.insert("Annots".to_string(), Object::Array(vec![Object::Reference(widget_ref)]));
        },
    }
    update.set_object(page_ref, Object::Dictionary(page));
    Ok(())
}

fn array_at(doc: &mut PdfDocument, obj_ref: ObjectRef) -> Result<Vec<Object>> {
    match doc.load_object(obj_ref)? {
        Object::Array(items) => Ok(items),
        other => Err(Error::InvalidObjectType {
            expected: "Array".to_string(),
            found: other.type_name().to_string(),
        }),
    }
}

/// `D:YYYYMMDDHHmmSS+00'00'`
fn format_pdf_date(time: DateTime<Utc>) -> String {
    time.format("D:%Y%m%d%H%M%S+00'00'").to_string()
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signatures::fields::collect_fields;
    use crate::signatures::testing::{classic_pdf, xref_stream_pdf};
    use crate::store::testing::{ec_credential, rsa_credential, without_key};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn signer(subject: &str) -> PdfSigner {
        PdfSigner::new(
            rsa_credential(subject, 7, 365),
            SignOptions::default().with_estimated_size(4096),
        )
    }

    #[test]
    fn test_format_pdf_date() {
        let time = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap();
        assert_eq!(format_pdf_date(time), "D:20240309140500+00'00'");
    }

    #[test]
    fn test_next_field_name() {
        assert_eq!(next_field_name(&[]), "Signature1");
        let taken = vec!["Signature1".to_string(), "Signature3".to_string()];
        assert_eq!(next_field_name(&taken), "Signature2");
    }

    #[test]
    fn test_signature_dictionary_layout() {
        let signer = PdfSigner::new(
            rsa_credential("CN=Alice", 1, 365),
            SignOptions::default()
                .with_estimated_size(1024)
                .with_reason("Approved (final)")
                .with_location("Zürich"),
        );
        let time = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let (body, placeholders) = signer.signature_dictionary(time);
        let text = String::from_utf8_lossy(&body);

        assert!(text.starts_with("<< /Type /Sig /Filter /Adobe.PPKLite /SubFilter /adbe.pkcs7.detached"));
        assert!(text.contains("/M (D:20240101000000+00'00')"));
        assert!(text.contains("/Reason (Approved \\(final\\))"));
        assert!(text.contains("/Location <FEFF"));
        assert_eq!(body[placeholders.byte_range], b'[');
        assert_eq!(body[placeholders.contents], b'<');
        assert_eq!(body[placeholders.contents + 2049], b'>');
    }

    #[test]
    fn test_sign_bytes_appends_update() {
        let original = classic_pdf();
        let signed = signer("CN=Alice,2.5.4.5=A1").sign_bytes(original.clone()).unwrap();
        assert!(signed.starts_with(&original));

        let mut doc = PdfDocument::from_bytes(signed.clone()).unwrap();
        let fields = collect_fields(&mut doc).unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].name, "Signature1");
        let br = fields[0].byte_range().unwrap();
        assert!(ByteRangeCalculator::covers_whole_document(&signed, &br));

        let catalog = doc.catalog().unwrap();
        let form = catalog.get("AcroForm").and_then(|f| f.as_dict()).unwrap();
        assert_eq!(form.get("SigFlags").and_then(|f| f.as_integer()), Some(3));
        let page = doc.first_page_ref().unwrap();
        let page = doc.resolve_dict(&Object::Reference(page)).unwrap();
        assert_eq!(page.get("Annots").and_then(|a| a.as_array()).map(|a| a.len()), Some(1));
    }

    #[test]
    fn test_second_signature_keeps_first() {
        let once = signer("CN=Alice").sign_bytes(classic_pdf()).unwrap();
        let bob = PdfSigner::new(ec_credential("CN=Bob", 2, 365), SignOptions::default());
        let twice = bob.sign_bytes(once.clone()).unwrap();
        assert!(twice.starts_with(&once));

        let mut doc = PdfDocument::from_bytes(twice.clone()).unwrap();
        let fields = collect_fields(&mut doc).unwrap();
        let names: Vec<_> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Signature1", "Signature2"]);
        assert!(!ByteRangeCalculator::covers_whole_document(&twice, &fields[0].byte_range().unwrap()));
        assert!(ByteRangeCalculator::covers_whole_document(&twice, &fields[1].byte_range().unwrap()));
    }

    #[test]
    fn test_xref_stream_document() {
        let signed = signer("CN=Alice").sign_bytes(xref_stream_pdf()).unwrap();
        let mut doc = PdfDocument::from_bytes(signed).unwrap();
        assert!(doc.last_xref_is_stream());
        assert_eq!(collect_fields(&mut doc).unwrap().len(), 1);
    }

    #[test]
    fn test_signature_too_large_for_reserve() {
        let signer = PdfSigner::new(
            rsa_credential("CN=Alice", 1, 365),
            SignOptions::default().with_estimated_size(16),
        );
        assert!(matches!(signer.sign_bytes(classic_pdf()), Err(Error::Crypto(_))));
    }

    #[test]
    fn test_keyless_credential_refused() {
        let keyless = without_key(&rsa_credential("CN=Alice", 1, 365));
        let signer = PdfSigner::new(keyless, SignOptions::default());
        assert!(matches!(signer.sign_bytes(classic_pdf()), Err(Error::CredentialNotFound(_))));
    }

    #[test]
    fn test_identity_policy_require() {
        let signer = PdfSigner::new(
            rsa_credential("CN=No Serial", 1, 365),
            SignOptions::default().with_identity_policy(IdentityPolicy::Require),
        );
        assert!(matches!(
            signer.sign_bytes(classic_pdf()),
            Err(Error::IdentityAttributeMissing(_))
        ));
    }

    #[test]
    fn test_sign_file_errors_are_wrapped() {
        let dir = TempDir::new().unwrap();
        let signer = signer("CN=Alice");

        let missing = dir.path().join("missing.pdf");
        let err = signer.sign(&missing, dir.path().join("out.pdf")).unwrap_err();
        assert!(matches!(err, Error::Signing { .. }));
        assert!(matches!(err.root_cause(), Error::InputNotFound(_)));

        let input = dir.path().join("in.pdf");
        std::fs::write(&input, classic_pdf()).unwrap();
        let err = signer.sign(&input, &input).unwrap_err();
        assert!(matches!(err.root_cause(), Error::OutputUnwritable { .. }));
        assert_eq!(std::fs::read(&input).unwrap(), classic_pdf());
    }

    #[test]
    fn test_sign_file() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.pdf");
        let output = dir.path().join("out.pdf");
        std::fs::write(&input, classic_pdf()).unwrap();

        signer("CN=Alice").sign(&input, &output).unwrap();
        assert_eq!(std::fs::read(&input).unwrap(), classic_pdf());
        assert!(std::fs::read(&output).unwrap().starts_with(&classic_pdf()));
    }
}
