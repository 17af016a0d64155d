//! File-system certificate store.
//!
//! Each scope maps to one directory of certificate files:
//!
//! ```text
//! <user dir>/
//!     alice.pem      key + certificate (+ chain)
//!     partner.crt    certificate only
//!     root.der       binary certificate
//! ```
//!
//! Files that cannot be parsed are logged and skipped, so one damaged file
//! does not hide the rest of the scope.

use super::{CertificateStore, CredentialHandle, StoreHandle, StoreScope};
use crate::config::SealConfig;
use crate::error::Result;
use std::path::{Path, PathBuf};

/// Extensions recognized as certificate files.
const CERTIFICATE_EXTENSIONS: &[&str] = &["pem", "crt", "cer", "der"];

/// Store backed by one directory per scope.
#[derive(Debug, Clone, Default)]
pub struct DirectoryStore {
    user_dir: Option<PathBuf>,
    machine_dir: Option<PathBuf>,
}

impl DirectoryStore {
    /// Create a store over the given scope directories.
    pub fn new(user_dir: Option<PathBuf>, machine_dir: Option<PathBuf>) -> Self {
        Self {
            user_dir,
            machine_dir,
        }
    }

    /// Store over the directories named in `config`.
    pub fn from_config(config: &SealConfig) -> Self {
        Self::new(config.user_store.clone(), config.machine_store.clone())
    }

    /// Directory backing `scope`, if configured.
    pub fn directory(&self, scope: StoreScope) -> Option<&Path> {
        match scope {
            StoreScope::CurrentUser => self.user_dir.as_deref(),
            StoreScope::LocalMachine => self.machine_dir.as_deref(),
        }
    }
}

impl CertificateStore for DirectoryStore {
    fn open(&self, scope: StoreScope) -> Result<StoreHandle> {
        let Some(dir) = self.directory(scope) else {
            log::debug!("No directory configured for the {} store", scope);
            return Ok(StoreHandle::new(scope, Vec::new()));
        };
        if !dir.is_dir() {
            log::debug!("{} store directory {} does not exist", scope, dir.display());
            return Ok(StoreHandle::new(scope, Vec::new()));
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && has_certificate_extension(path))
            .collect();
        paths.sort();

        let mut certificates = Vec::with_capacity(paths.len());
        for path in paths {
            match CredentialHandle::from_file(&path) {
                Ok(handle) => certificates.push(handle),
                Err(e) => log::warn!("Skipping {}: {}", path.display(), e),
            }
        }

        Ok(StoreHandle::new(scope, certificates))
    }
}

fn has_certificate_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| CERTIFICATE_EXTENSIONS.iter().any(|c| c.eq_ignore_ascii_case(ext)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::rsa_credential_pem;
    use tempfile::TempDir;

    #[test]
    fn test_missing_scope_opens_empty() {
        let store = DirectoryStore::new(None, Some(PathBuf::from("/nonexistent/pdfseal/store")));
        assert!(store.open(StoreScope::CurrentUser).unwrap().certificates().is_empty());
        assert!(store.open(StoreScope::LocalMachine).unwrap().certificates().is_empty());
    }

    #[test]
    fn test_loads_certificate_files_and_skips_others() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("alice.pem"), rsa_credential_pem("CN=Alice", 1, 365)).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a certificate").unwrap();
        std::fs::write(dir.path().join("broken.pem"), "-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n").unwrap();

        let store = DirectoryStore::new(Some(dir.path().to_path_buf()), None);
        let handle = store.open(StoreScope::CurrentUser).unwrap();
        assert_eq!(handle.certificates().len(), 1);
        assert!(handle.certificates()[0].has_private_key());
    }

    #[test]
    fn test_binary_der_certificate() {
        let dir = TempDir::new().unwrap();
        let pem = rsa_credential_pem("CN=Root", 9, 365);
        let handle = CredentialHandle::from_pem(pem.as_bytes()).unwrap();
        std::fs::write(dir.path().join("root.DER"), handle.der()).unwrap();

        let store = DirectoryStore::new(None, Some(dir.path().to_path_buf()));
        let opened = store.open(StoreScope::LocalMachine).unwrap();
        assert_eq!(opened.certificates().len(), 1);
        assert!(!opened.certificates()[0].has_private_key());
    }
}
