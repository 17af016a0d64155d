//! Command-line interface for pdf_seal.
//!
//! Lists signing certificates, signs single documents or whole directories
//! and verifies signed documents.

#![forbid(unsafe_code)]

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use pdf_seal::batch::{sign_batch, BatchOptions};
use pdf_seal::signatures::{verify_file, verify_file_signed_by, PdfSigner, SignOptions};
use pdf_seal::store::{locator, DirectoryStore, StoreScope};
use pdf_seal::{BatchStatus, SealConfig};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "pdfseal", version, about = "Sign and verify PDF documents")]
struct Cli {
    /// Write human-readable output to this file instead of the console
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Also echo to the console when --output is given
    #[arg(short, long, global = true)]
    console: bool,

    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List signing certificates in both stores
    List,
    /// Sign one document
    Sign {
        /// Document to sign
        input: PathBuf,
        /// Where to write the signed document
        #[arg(value_name = "OUT")]
        signed: PathBuf,
        /// Certificate thumbprint or subject
        identifier: String,
        /// Reason for signing
        reason: Option<String>,
        /// Where the document was signed
        location: Option<String>,
    },
    /// Sign every document matching a pattern such as `dir/*.pdf`
    Batch {
        /// File pattern; wildcards are allowed in the file name only
        pattern: String,
        /// Directory for the signed documents
        outdir: PathBuf,
        /// Certificate thumbprint or subject
        identifier: String,
        /// Reason for signing
        reason: Option<String>,
        /// Where the documents were signed
        location: Option<String>,
        /// Inserted before the extension of each output name
        suffix: Option<String>,
    },
    /// Verify the signatures of a document
    Verify {
        /// Signed document
        file: PathBuf,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
        /// Only look for the signature of this certificate (thumbprint or subject)
        #[arg(long)]
        signer: Option<String>,
    },
}

/// Human-readable output sink honoring --output and --console.
struct Report {
    file: Option<File>,
    console: bool,
}

impl Report {
    fn new(output: Option<&Path>, console: bool) -> anyhow::Result<Self> {
        let file = output
            .map(|path| File::create(path).with_context(|| format!("cannot create {}", path.display())))
            .transpose()?;
        Ok(Self {
            console: console || file.is_none(),
            file,
        })
    }

    fn line(&mut self, text: impl AsRef<str>) -> anyhow::Result<()> {
        let text = text.as_ref();
        if let Some(file) = &mut self.file {
            writeln!(file, "{}", text)?;
        }
        if self.console {
            println!("{}", text);
        }
        Ok(())
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<SealConfig> {
    let defaults = SealConfig::from_env();
    let Some(path) = path else {
        return Ok(defaults);
    };
    let mut config = SealConfig::from_json_file(path)?;
    if config.user_store.is_none() {
        config.user_store = defaults.user_store;
    }
    if config.machine_store.is_none() {
        config.machine_store = defaults.machine_store;
    }
    Ok(config.with_env_overrides())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let store = DirectoryStore::from_config(&config);
    let mut out = Report::new(cli.output.as_deref(), cli.console)?;

    match cli.command {
        Commands::List => {
            for scope in StoreScope::SEARCH_ORDER {
                out.line(format!("[{}]", scope))?;
                for cert in locator::list(&store, scope)? {
                    out.line(format!(
                        "  {}  {}  valid {} .. {}  key: {}  identity: {}",
                        cert.thumbprint(),
                        cert.subject(),
                        cert.not_before().format("%Y-%m-%d"),
                        cert.not_after().format("%Y-%m-%d"),
                        if cert.has_private_key() { cert.key_algorithm().to_string() } else { "none".to_string() },
                        cert.identity().map(|i| i.into_inner()).unwrap_or_else(|| "-".to_string()),
                    ))?;
                }
            }
        },
        Commands::Sign {
            input,
            signed,
            identifier,
            reason,
            location,
        } => {
            let credential = locator::find_credential(&store, &identifier)
                .with_context(|| format!("no usable signing certificate found for '{}'", identifier))?;
            let options = sign_options(&config, reason, location);
            PdfSigner::new(credential.clone(), options).sign(&input, &signed)?;
            out.line(format!(
                "Signed {} -> {} as {}",
                input.display(),
                signed.display(),
                credential.subject()
            ))?;
        },
        Commands::Batch {
            pattern,
            outdir,
            identifier,
            reason,
            location,
            suffix,
        } => {
            let mut options = BatchOptions::from_config(&config)
                .with_sign_options(sign_options(&config, reason, location));
            if let Some(suffix) = suffix {
                options = options.with_suffix(suffix);
            }
            let report = sign_batch(&store, &identifier, &pattern, &outdir, &options)?;
            for entry in &report.entries {
                let status = match &entry.status {
                    BatchStatus::SignedAndVerified => "signed and verified".to_string(),
                    BatchStatus::Signed => "signed".to_string(),
                    BatchStatus::SignedVerificationFailed(reason) => {
                        format!("signed, verification failed: {}", reason)
                    },
                    BatchStatus::Failed(reason) => format!("failed: {}", reason),
                };
                out.line(format!("{} -> {}: {}", entry.input.display(), entry.output.display(), status))?;
            }
            out.line(format!(
                "{} succeeded, {} failed, output in {}",
                report.succeeded,
                report.failed,
                report.output_dir.display()
            ))?;
        },
        Commands::Verify { file, json, signer } => {
            if let Some(identifier) = signer {
                let credential = locator::find_credential(&store, &identifier)
                    .with_context(|| format!("no certificate found for '{}'", identifier))?;
                let matched = verify_file_signed_by(&file, &credential)?;
                if json {
                    out.line(serde_json::to_string_pretty(&matched)?)?;
                } else {
                    out.line(format!(
                        "{}: signed by {} (identity {}){}",
                        matched.field,
                        matched.subject,
                        matched.found_identity,
                        if matched.covers_whole_document { "" } else { ", covered by a later revision" }
                    ))?;
                }
                return Ok(());
            }

            let outcome = verify_file(&file)?;
            if json {
                out.line(serde_json::to_string_pretty(&outcome)?)?;
            } else {
                for field in &outcome.fields {
                    out.line(format!(
                        "{}: {}  signer: {}  identity: {}{}",
                        field.name,
                        if field.valid { "VALID" } else { "INVALID" },
                        field.signer_subject.as_deref().unwrap_or("-"),
                        field.identity.as_ref().map(|i| i.as_str()).unwrap_or("-"),
                        field.error.as_deref().map(|e| format!("  ({})", e)).unwrap_or_default()
                    ))?;
                }
            }
            if !outcome.all_valid {
                bail!("{} of {} signatures are invalid", outcome.fields.iter().filter(|f| !f.valid).count(), outcome.total);
            }
        },
    }
    Ok(())
}

fn sign_options(config: &SealConfig, reason: Option<String>, location: Option<String>) -> SignOptions {
    let mut options = SignOptions::from_config(config);
    if let Some(reason) = reason {
        options = options.with_reason(reason);
    }
    if let Some(location) = location {
        options = options.with_location(location);
    }
    options
}
