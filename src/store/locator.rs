//! Signing certificate lookup.
//!
//! An identifier is either a thumbprint (SHA-1 or SHA-256 hex, spaces and
//! colons allowed) or a subject name. Scopes are searched in
//! [`StoreScope::SEARCH_ORDER`]; the first scope yielding a certificate with
//! a private key wins.
//!
//! Among the matches of one scope, a certificate that has a private key and
//! is inside its validity window is preferred. Failing that, any match with
//! a private key is used and a warning is logged. Matches without a private
//! key are never returned.

use super::{CertificateStore, CredentialHandle, StoreScope};
use crate::error::Result;
use chrono::{DateTime, Utc};

/// How an identifier is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    /// Certificate hash in hex
    Thumbprint,
    /// Full subject DN or a fragment of it
    Subject,
}

/// Classify `identifier`.
///
/// ```
/// use pdf_seal::store::locator::{classify, IdentifierKind};
///
/// assert_eq!(classify("3f:a1:00:9c:de:ad:be:ef:00:11:22:33:44:55:66:77"), IdentifierKind::Thumbprint);
/// assert_eq!(classify("CN=Alice"), IdentifierKind::Subject);
/// ```
pub fn classify(identifier: &str) -> IdentifierKind {
    let hex = normalize_thumbprint(identifier);
    if (32..=128).contains(&hex.len()) && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        IdentifierKind::Thumbprint
    } else {
        IdentifierKind::Subject
    }
}

fn normalize_thumbprint(identifier: &str) -> String {
    identifier
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect::<String>()
        .to_ascii_uppercase()
}

/// Find a usable signing certificate for `identifier`.
///
/// Returns `None` when no scope holds a matching certificate with a private
/// key. Scopes that fail to open are logged and skipped.
pub fn find_credential(store: &dyn CertificateStore, identifier: &str) -> Option<CredentialHandle> {
    find_credential_at(store, identifier, Utc::now())
}

/// [`find_credential`] with an explicit notion of "now" for validity checks.
pub fn find_credential_at(
    store: &dyn CertificateStore,
    identifier: &str,
    now: DateTime<Utc>,
) -> Option<CredentialHandle> {
    let kind = classify(identifier);
    log::debug!("Looking up certificate '{}' as {:?}", identifier, kind);

    for scope in StoreScope::SEARCH_ORDER {
        let handle = match store.open(scope) {
            Ok(handle) => handle,
            Err(e) => {
                log::warn!("Cannot open {} store: {}", scope, e);
                continue;
            },
        };

        let found = match kind {
            IdentifierKind::Thumbprint => {
                select(handle.find_by_thumbprint(&normalize_thumbprint(identifier)), now)
            },
            IdentifierKind::Subject => select(handle.find_by_subject(identifier), now)
                .or_else(|| select(handle.find_by_subject_fragment(identifier), now)),
        };

        if let Some(credential) = found {
            log::info!(
                "Using certificate '{}' ({}) from the {} store",
                credential.subject(),
                credential.thumbprint(),
                scope
            );
            return Some(credential);
        }
    }

    log::info!("No usable certificate found for '{}'", identifier);
    None
}

/// Apply the selection policy to the matches of one scope.
fn select(matches: Vec<&CredentialHandle>, now: DateTime<Utc>) -> Option<CredentialHandle> {
    if let Some(best) = matches.iter().find(|c| c.has_private_key() && c.is_valid_at(now)) {
        return Some((*best).clone());
    }
    if let Some(fallback) = matches.iter().find(|c| c.has_private_key()) {
        log::warn!(
            "Certificate '{}' is outside its validity window ({} to {}); using it anyway",
            fallback.subject(),
            fallback.not_before(),
            fallback.not_after()
        );
        return Some((*fallback).clone());
    }
    if !matches.is_empty() {
        log::debug!("{} matching certificates have no private key", matches.len());
    }
    None
}

/// Every certificate of `scope`, for listing.
pub fn list(store: &dyn CertificateStore, scope: StoreScope) -> Result<Vec<CredentialHandle>> {
    let handle = store.open(scope)?;
    Ok(handle.certificates().to_vec())
}
