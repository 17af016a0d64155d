//! Batch signing.
//!
//! Signs every file matching a pattern such as `incoming/*.pdf` with one
//! credential, resolved once up front. Files are processed one after the
//! other and a failure on one file is recorded in the report without
//! stopping the batch. Only setup problems (no credential, missing input
//! directory, output directory that cannot be created) are returned as
//! errors.

use crate::config::SealConfig;
use crate::error::{Error, Result};
use crate::signatures::{verify_file_signed_by, PdfSigner, SignOptions};
use crate::store::{locator, CertificateStore, CredentialHandle};
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// What happened to one input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason")]
pub enum BatchStatus {
    /// Signed, and the signature was found and checked afterwards
    SignedAndVerified,
    /// Signed, but checking the output failed
    SignedVerificationFailed(String),
    /// Signed; verification is disabled
    Signed,
    /// Not signed
    Failed(String),
}

impl BatchStatus {
    /// Whether the file counts as a success.
    pub fn is_success(&self) -> bool {
        matches!(self, BatchStatus::SignedAndVerified | BatchStatus::Signed)
    }
}

/// Per-file entry of a [`BatchReport`].
#[derive(Debug, Clone, Serialize)]
pub struct BatchEntry {
    /// Input document
    pub input: PathBuf,
    /// Output document
    pub output: PathBuf,
    /// Outcome
    pub status: BatchStatus,
}

/// Summary of a batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    /// Entries in file-name order
    pub entries: Vec<BatchEntry>,
    /// Files signed (and verified, when enabled)
    pub succeeded: usize,
    /// Files that failed to sign or to verify
    pub failed: usize,
    /// Where the signed files were written
    pub output_dir: PathBuf,
}

/// Settings of a batch run.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Inserted between the file stem and the extension
    pub suffix: String,
    /// Check every output with a targeted identity match
    pub verify_after_sign: bool,
    /// Options for each signature
    pub sign: SignOptions,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self::from_config(&SealConfig::default())
    }
}

impl BatchOptions {
    /// Options from configuration defaults.
    pub fn from_config(config: &SealConfig) -> Self {
        Self {
            suffix: config.suffix.clone(),
            verify_after_sign: config.verify_after_sign,
            sign: SignOptions::from_config(config),
        }
    }

    /// Set the output suffix.
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Enable or disable verification of each output.
    pub fn with_verify_after_sign(mut self, enable: bool) -> Self {
        self.verify_after_sign = enable;
        self
    }

    /// Set the per-signature options.
    pub fn with_sign_options(mut self, sign: SignOptions) -> Self {
        self.sign = sign;
        self
    }
}

/// Resolve `identifier` in `store`, then sign every file matching `pattern`.
pub fn sign_batch(
    store: &dyn CertificateStore,
    identifier: &str,
    pattern: &str,
    output_dir: impl AsRef<Path>,
    options: &BatchOptions,
) -> Result<BatchReport> {
    let credential = locator::find_credential(store, identifier)
        .ok_or_else(|| Error::CredentialNotFound(identifier.to_string()))?;
    sign_batch_with(&credential, pattern, output_dir, options)
}

/// Sign every file matching `pattern` with `credential`.
pub fn sign_batch_with(
    credential: &CredentialHandle,
    pattern: &str,
    output_dir: impl AsRef<Path>,
    options: &BatchOptions,
) -> Result<BatchReport> {
    let output_dir = output_dir.as_ref();
    let (input_dir, matcher) = split_pattern(pattern)?;
    if !input_dir.is_dir() {
        return Err(Error::DirectoryNotFound(input_dir));
    }
    std::fs::create_dir_all(output_dir).map_err(|e| Error::OutputUnwritable {
        path: output_dir.to_path_buf(),
        reason: e.to_string(),
    })?;
    let in_place = same_directory(&input_dir, output_dir);

    let mut inputs = Vec::new();
    for entry in std::fs::read_dir(&input_dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if path.is_file() && matcher.is_match(name) {
            inputs.push(path);
        }
    }
    inputs.sort();
    log::info!(
        "Batch signing {} files from {} into {}",
        inputs.len(),
        input_dir.display(),
        output_dir.display()
    );

    let signer = PdfSigner::new(credential.clone(), options.sign.clone());
    let mut entries = Vec::with_capacity(inputs.len());
    for input in inputs {
        if in_place && already_suffixed(&input, &options.suffix) {
            log::debug!("Skipping {}: already carries the suffix", input.display());
            continue;
        }
        let output = output_dir.join(output_name(&input, &options.suffix));
        let status = process(&signer, credential, &input, &output, options.verify_after_sign);
        match &status {
            BatchStatus::Failed(reason) | BatchStatus::SignedVerificationFailed(reason) => {
                log::warn!("{}: {}", input.display(), reason)
            },
            _ => log::debug!("{}: {:?}", input.display(), status),
        }
        entries.push(BatchEntry {
            input,
            output,
            status,
        });
    }

    let succeeded = entries.iter().filter(|e| e.status.is_success()).count();
    Ok(BatchReport {
        failed: entries.len() - succeeded,
        succeeded,
        entries,
        output_dir: output_dir.to_path_buf(),
    })
}

fn process(
    signer: &PdfSigner,
    credential: &CredentialHandle,
    input: &Path,
    output: &Path,
    verify: bool,
) -> BatchStatus {
    if let Err(e) = signer.sign(input, output) {
        return BatchStatus::Failed(e.to_string());
    }
    if !verify {
        return BatchStatus::Signed;
    }
    match verify_file_signed_by(output, credential) {
        Ok(_) => BatchStatus::SignedAndVerified,
        Err(e) => BatchStatus::SignedVerificationFailed(e.to_string()),
    }
}

/// Split `dir/name-pattern` into the directory and a file-name matcher.
///
/// Only the file-name part may contain `*` (any run of characters) and `?`
/// (one character). A bare file pattern refers to the current directory.
fn split_pattern(pattern: &str) -> Result<(PathBuf, Regex)> {
    let path = Path::new(pattern);
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Config(format!("pattern '{}' has no file-name part", pattern)))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, wildcard_regex(name)?))
}

fn wildcard_regex(name_pattern: &str) -> Result<Regex> {
    let mut re = String::with_capacity(name_pattern.len() + 8);
    re.push('^');
    for c in name_pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            other => re.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| Error::Config(format!("bad file pattern '{}': {}", name_pattern, e)))
}

/// `report.pdf` with suffix `-sig` becomes `report-sig.pdf`.
fn output_name(input: &Path, suffix: &str) -> String {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("document");
    match input.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}{}.{}", stem, suffix, ext),
        None => format!("{}{}", stem, suffix),
    }
}

fn already_suffixed(input: &Path, suffix: &str) -> bool {
    !suffix.is_empty()
        && input
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|stem| stem.ends_with(suffix))
}

fn same_directory(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
