//! Certificate stores.
//!
//! A store is organized in two scopes, searched user first:
//!
//! ```text
//! CurrentUser   -> certificates installed for the invoking user
//! LocalMachine  -> certificates shared by every user of the machine
//! ```
//!
//! Opening a scope yields a [`StoreHandle`] that holds a read-only snapshot
//! of its certificates. The handle is released when dropped, on every exit
//! path, so lookups never leave a scope open.

mod certificate;
mod directory;
pub mod locator;
mod memory;

#[cfg(test)]
pub(crate) mod testing;

pub use certificate::{CredentialHandle, KeyAlgorithm, SigningKey};
pub use directory::DirectoryStore;
pub use memory::MemoryStore;

use crate::error::Result;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Scope of a certificate store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum StoreScope {
    /// Per-user certificates
    CurrentUser,
    /// Machine-wide certificates
    LocalMachine,
}

impl StoreScope {
    /// Scopes in search order.
    pub const SEARCH_ORDER: [StoreScope; 2] = [StoreScope::CurrentUser, StoreScope::LocalMachine];
}

impl fmt::Display for StoreScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreScope::CurrentUser => f.write_str("CurrentUser"),
            StoreScope::LocalMachine => f.write_str("LocalMachine"),
        }
    }
}

/// Source of certificates, opened one scope at a time.
pub trait CertificateStore {
    /// Open `scope` for reading.
    ///
    /// A scope that does not exist opens as empty; errors are reserved for
    /// stores that exist but cannot be read.
    fn open(&self, scope: StoreScope) -> Result<StoreHandle>;
}

/// Open scope of a store. Released on drop.
pub struct StoreHandle {
    scope: StoreScope,
    certificates: Vec<CredentialHandle>,
    open_count: Option<Arc<AtomicUsize>>,
}

impl StoreHandle {
    /// Handle over an already loaded snapshot.
    pub fn new(scope: StoreScope, certificates: Vec<CredentialHandle>) -> Self {
        log::trace!("Opened {} store ({} certificates)", scope, certificates.len());
        Self {
            scope,
            certificates,
            open_count: None,
        }
    }

    /// Track this handle in `counter` until it is dropped.
    pub(crate) fn tracked(mut self, counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        self.open_count = Some(counter);
        self
    }

    /// Scope this handle was opened for.
    pub fn scope(&self) -> StoreScope {
        self.scope
    }

    /// Every certificate of the scope.
    pub fn certificates(&self) -> &[CredentialHandle] {
        &self.certificates
    }

    /// Certificates whose SHA-1 or SHA-256 thumbprint equals `hex`
    /// (case-insensitive).
    pub fn find_by_thumbprint(&self, hex: &str) -> Vec<&CredentialHandle> {
        let hex = hex.to_ascii_uppercase();
        self.certificates.iter().filter(|c| c.matches_thumbprint(&hex)).collect()
    }

    /// Certificates whose subject equals `dn`, ignoring ASCII case and the
    /// whitespace around separators.
    pub fn find_by_subject(&self, dn: &str) -> Vec<&CredentialHandle> {
        let wanted = normalize_dn(dn);
        self.certificates
            .iter()
            .filter(|c| normalize_dn(c.subject()) == wanted)
            .collect()
    }

    /// Certificates whose subject contains `fragment` (case-insensitive).
    pub fn find_by_subject_fragment(&self, fragment: &str) -> Vec<&CredentialHandle> {
        let fragment = fragment.trim().to_lowercase();
        if fragment.is_empty() {
            return Vec::new();
        }
        self.certificates
            .iter()
            .filter(|c| c.subject().to_lowercase().contains(&fragment))
            .collect()
    }
}

impl Drop for StoreHandle {
    fn drop(&mut self) {
        if let Some(counter) = self.open_count.take() {
            counter.fetch_sub(1, Ordering::SeqCst);
        }
        log::trace!("Closed {} store", self.scope);
    }
}

impl fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreHandle")
            .field("scope", &self.scope)
            .field("certificates", &self.certificates.len())
            .finish()
    }
}

/// `CN = Alice ,SN=A1` and `cn=alice, sn=a1` normalize identically.
fn normalize_dn(dn: &str) -> String {
    dn.split([',', ';', '+'])
        .map(|rdn| match rdn.split_once('=') {
            Some((key, value)) => format!("{}={}", key.trim(), value.trim()),
            None => rdn.trim().to_string(),
        })
        .filter(|rdn| !rdn.is_empty())
        .collect::<Vec<_>>()
        .join(",")
        .to_ascii_lowercase()
}
