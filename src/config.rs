//! Configuration for signing and verification.
//!
//! Settings come from three places, later ones winning:
//!
//! 1. built-in defaults ([`SealConfig::default`]);
//! 2. a JSON file ([`SealConfig::from_json_file`]);
//! 3. environment variables ([`SealConfig::with_env_overrides`]).
//!
//! ```json
//! {
//!   "user_store": "/home/alice/.config/pdfseal/certs",
//!   "reason": "Approved",
//!   "suffix": "-sig",
//!   "identity_policy": "require"
//! }
//! ```

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming the per-user store directory.
pub const ENV_USER_STORE: &str = "PDFSEAL_USER_STORE";
/// Environment variable naming the machine-wide store directory.
pub const ENV_MACHINE_STORE: &str = "PDFSEAL_MACHINE_STORE";

/// Default signature reserve in bytes.
pub const DEFAULT_SIGNATURE_SIZE: usize = 8192;
/// Default output suffix for batch signing.
pub const DEFAULT_SUFFIX: &str = "-signed";

const MIN_SIGNATURE_SIZE: usize = 1024;
const MAX_SIGNATURE_SIZE: usize = 1024 * 1024;

/// What to do when the signing certificate has no serial-identity attribute.
///
/// Such a signature is valid CMS but can never satisfy a targeted identity
/// match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityPolicy {
    /// Log a warning and sign anyway
    #[default]
    Warn,
    /// Refuse with [`Error::IdentityAttributeMissing`]
    Require,
}

/// Signing configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SealConfig {
    /// Directory of the per-user certificate store.
    pub user_store: Option<PathBuf>,

    /// Directory of the machine-wide certificate store.
    pub machine_store: Option<PathBuf>,

    /// Default `/Reason` for new signatures.
    pub reason: Option<String>,

    /// Default `/Location` for new signatures.
    pub location: Option<String>,

    /// Default `/ContactInfo` for new signatures.
    pub contact_info: Option<String>,

    /// Suffix inserted before the extension of batch outputs.
    pub suffix: String,

    /// Bytes reserved for the CMS signature.
    pub signature_size: usize,

    /// Verify each document right after signing it in batch mode.
    pub verify_after_sign: bool,

    /// Handling of certificates without a serial identity.
    pub identity_policy: IdentityPolicy,
}

impl Default for SealConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SealConfig {
    /// Configuration with built-in defaults and no store directories.
    pub fn new() -> Self {
        Self {
            user_store: None,
            machine_store: None,
            reason: None,
            location: None,
            contact_info: None,
            suffix: DEFAULT_SUFFIX.to_string(),
            signature_size: DEFAULT_SIGNATURE_SIZE,
            verify_after_sign: true,
            identity_policy: IdentityPolicy::Warn,
        }
    }

    /// Defaults plus store directories from the environment.
    ///
    /// Without `PDFSEAL_USER_STORE` the user store is
    /// `$HOME/.config/pdfseal/certs`; without `PDFSEAL_MACHINE_STORE` the
    /// machine store is `/etc/pdfseal/certs`.
    pub fn from_env() -> Self {
        let mut config = Self::new();
        config.user_store = std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".config").join("pdfseal").join("certs"));
        config.machine_store = Some(PathBuf::from("/etc/pdfseal/certs"));
        config.with_env_overrides()
    }

    /// Load a JSON configuration file. Missing keys keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Replace the store directories with the environment variables that are set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(dir) = std::env::var_os(ENV_USER_STORE) {
            self.user_store = Some(PathBuf::from(dir));
        }
        if let Some(dir) = std::env::var_os(ENV_MACHINE_STORE) {
            self.machine_store = Some(PathBuf::from(dir));
        }
        self
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_SIGNATURE_SIZE..=MAX_SIGNATURE_SIZE).contains(&self.signature_size) {
            return Err(Error::Config(format!(
                "signature_size must be between {} and {} bytes, got {}",
                MIN_SIGNATURE_SIZE, MAX_SIGNATURE_SIZE, self.signature_size
            )));
        }
        if self.suffix.contains(['/', '\\']) {
            return Err(Error::Config(format!("suffix '{}' contains a path separator", self.suffix)));
        }
        Ok(())
    }

    /// Set the per-user store directory.
    pub fn with_user_store(mut self, dir: impl Into<PathBuf>) -> Self {
        self.user_store = Some(dir.into());
        self
    }

    /// Set the machine-wide store directory.
    pub fn with_machine_store(mut self, dir: impl Into<PathBuf>) -> Self {
        self.machine_store = Some(dir.into());
        self
    }

    /// Set the default signing reason.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Set the default signing location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set the batch output suffix.
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Set the signature reserve.
    pub fn with_signature_size(mut self, bytes: usize) -> Self {
        self.signature_size = bytes;
        self
    }

    /// Enable or disable verification after batch signing.
    pub fn with_verify_after_sign(mut self, enable: bool) -> Self {
        self.verify_after_sign = enable;
        self
    }

    /// Set the identity policy.
    pub fn with_identity_policy(mut self, policy: IdentityPolicy) -> Self {
        self.identity_policy = policy;
        self
    }
}
