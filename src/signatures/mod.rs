//! PDF digital signatures.
//!
//! Signing and verification of detached CMS signatures
//! (`adbe.pkcs7.detached`), applied as incremental updates so that every
//! earlier signature keeps covering exactly the bytes it signed.
//!
//! ## Example
//!
//! ```no_run
//! use pdf_seal::signatures::{verify_file_signed_by, PdfSigner, SignOptions};
//! use pdf_seal::store::{locator, DirectoryStore};
//! use pdf_seal::SealConfig;
//!
//! # fn main() -> pdf_seal::Result<()> {
//! let config = SealConfig::from_env();
//! let store = DirectoryStore::from_config(&config);
//! let credential = locator::find_credential(&store, "CN=Alice")
//!     .ok_or_else(|| pdf_seal::Error::CredentialNotFound("CN=Alice".into()))?;
//!
//! let signer = PdfSigner::new(credential.clone(), SignOptions::from_config(&config).with_reason("Approved"));
//! signer.sign("contract.pdf", "contract-signed.pdf")?;
//!
//! let matched = verify_file_signed_by("contract-signed.pdf", &credential)?;
//! println!("signed by {} in {}", matched.found_identity, matched.field);
//! # Ok(())
//! # }
//! ```
//!
//! ## PDF Specification Reference
//!
//! - ISO 32000-1:2008 Section 12.8 - Digital Signatures
//! - ISO 32000-1:2008 Section 7.5.6 - Incremental Updates

mod byterange;
pub mod cms;
pub mod fields;
mod signer;
mod types;
mod verifier;

#[cfg(test)]
pub(crate) mod testing;

pub use byterange::{ByteRangeCalculator, BYTE_RANGE_WIDTH};
pub use signer::PdfSigner;
pub use types::{
    DigestAlgorithm, FieldReport, SignMatch, SignOptions, SignatureField, VerificationOutcome,
    PKCS7_DETACHED,
};
pub use verifier::{
    signature_fields, verify_document, verify_file, verify_file_signed_by, verify_signed_by,
};
