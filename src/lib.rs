// Allow some clippy lints that are too pedantic for this project
#![allow(clippy::too_many_arguments)]
#![allow(clippy::enum_variant_names)]
// Allow unused for tests
#![cfg_attr(test, allow(dead_code))]

//! # PDF Seal
//!
//! Detached PDF signing with certificate-store lookup, incremental
//! multi-signature updates and serial-identity verification.
//!
//! ## Core Features
//!
//! - **Certificate lookup**: find a signing certificate by thumbprint or
//!   subject across a per-user and a machine-wide store
//! - **Detached CMS signatures**: `adbe.pkcs7.detached` with RSA (PKCS#1
//!   v1.5) or ECDSA P-256 keys and SHA-256
//! - **Incremental updates**: every signature is appended, so earlier
//!   signatures stay valid
//! - **Verification**: report on every signature, or find the one made by
//!   a given signer through the `serialNumber` attribute of its certificate
//! - **Batch signing**: sign every file matching a pattern
//!
//! ## Architecture
//!
//! ```text
//! store::locator ──► CredentialHandle ──► signatures::PdfSigner ──► writer::IncrementalUpdate
//!                                              │
//!                          document::PdfDocument (parser, xref, objstm)
//!                                              │
//!                     signatures::verify_document / verify_signed_by ◄── identity
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use pdf_seal::signatures::{verify_file, PdfSigner, SignOptions};
//! use pdf_seal::store::{locator, DirectoryStore};
//! use pdf_seal::SealConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SealConfig::from_env();
//! let store = DirectoryStore::from_config(&config);
//! let credential = locator::find_credential(&store, "CN=Alice").ok_or("no certificate")?;
//!
//! PdfSigner::new(credential, SignOptions::default().with_reason("Approved"))
//!     .sign("in.pdf", "out.pdf")?;
//!
//! let outcome = verify_file("out.pdf")?;
//! assert!(outcome.all_valid);
//! # Ok(())
//! # }
//! ```
//!
//! ## License
//!
//! Licensed under either of:
//!
//! * Apache License, Version 2.0 ([LICENSE-APACHE](LICENSE-APACHE) or <http://www.apache.org/licenses/LICENSE-2.0>)
//! * MIT license ([LICENSE-MIT](LICENSE-MIT) or <http://opensource.org/licenses/MIT>)
//!
//! at your option.

#![warn(missing_docs)]

// Error handling
pub mod error;

// Core PDF parsing
pub mod document;
pub mod lexer;
pub mod object;
pub mod objstm;
pub mod parser;
pub mod xref;
pub mod xref_reconstruction;

// Stream decoders
pub mod decoders;

// Incremental updates
pub mod writer;

// Signing and verification
pub mod identity;
pub mod signatures;
pub mod store;

// Batch signing
pub mod batch;

// Configuration
pub mod config;

// Re-exports
pub use batch::{BatchOptions, BatchReport, BatchStatus};
pub use config::{IdentityPolicy, SealConfig};
pub use document::PdfDocument;
pub use error::{Error, FieldRejection, Result};
pub use identity::SerialIdentity;
pub use signatures::{PdfSigner, SignOptions};
pub use store::{CertificateStore, CredentialHandle, StoreScope};

// Version info
/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
