//! In-process certificate store.

use super::{CertificateStore, CredentialHandle, StoreHandle, StoreScope};
use crate::error::Result;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Store holding certificates in memory, for embedders and tests.
///
/// Counts the handles currently open, which lets callers check that every
/// lookup released its scope.
#[derive(Debug, Default)]
pub struct MemoryStore {
    scopes: HashMap<StoreScope, Vec<CredentialHandle>>,
    open_handles: Arc<AtomicUsize>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a certificate to `scope`.
    pub fn add(&mut self, scope: StoreScope, credential: CredentialHandle) {
        self.scopes.entry(scope).or_default().push(credential);
    }

    /// Builder form of [`MemoryStore::add`].
    pub fn with(mut self, scope: StoreScope, credential: CredentialHandle) -> Self {
        self.add(scope, credential);
        self
    }

    /// Number of handles not yet dropped.
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }
}

impl CertificateStore for MemoryStore {
    fn open(&self, scope: StoreScope) -> Result<StoreHandle> {
        let certificates = self.scopes.get(&scope).cloned().unwrap_or_default();
        Ok(StoreHandle::new(scope, certificates).tracked(self.open_handles.clone()))
    }
}
