//! Serial-identity extraction from certificate subjects.
//!
//! Signers are recognized by the `serialNumber` attribute (OID 2.5.4.5) of
//! their certificate subject rather than by chain validation. This is an
//! application convention: anyone able to obtain a certificate carrying the
//! same attribute value is treated as the same signer. Callers that need
//! trust decisions must validate certificate chains themselves.
//!
//! Subject strings reach this module in several serializations
//! (`serialNumber=A1, CN=Alice`, `CN=Alice;SERIALNUMBER=A1`,
//! `OID.2.5.4.5=A1`, one attribute per line), so the parser splits on every
//! separator those formats use and compares keys case-insensitively.

use std::fmt;

/// Spellings of the serial-number attribute key, compared case-insensitively.
const IDENTITY_KEYS: &[&str] = &["2.5.4.5", "OID.2.5.4.5", "SERIALNUMBER", "SN"];

/// Identity string taken from a certificate subject.
///
/// Equality is exact: no case folding or whitespace normalization is applied
/// to the value once it has been extracted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(transparent)]
pub struct SerialIdentity(String);

impl SerialIdentity {
    /// Extract the identity from a subject DN.
    pub fn from_subject(dn: &str) -> Option<Self> {
        extract_serial_identity(dn).map(SerialIdentity)
    }

    /// The identity value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for SerialIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SerialIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Whether `key` names the serial-number attribute.
///
/// ```
/// use pdf_seal::identity::is_identity_key;
///
/// assert!(is_identity_key("serialNumber"));
/// assert!(is_identity_key(" oid.2.5.4.5 "));
/// assert!(!is_identity_key("CN"));
/// ```
pub fn is_identity_key(key: &str) -> bool {
    let key = key.trim();
    IDENTITY_KEYS.iter().any(|k| k.eq_ignore_ascii_case(key))
}

/// Extract the serial identity from a subject distinguished name.
///
/// Returns `None` when the attribute is absent or empty. Malformed tokens
/// are skipped, never reported.
///
/// ```
/// use pdf_seal::identity::extract_serial_identity;
///
/// assert_eq!(extract_serial_identity("CN=Alice, SERIALNUMBER=A1").as_deref(), Some("A1"));
/// assert_eq!(extract_serial_identity("CN=Alice"), None);
/// ```
pub fn extract_serial_identity(dn: &str) -> Option<String> {
    for token in dn.split([',', ';', '\r', '\n']) {
        let Some((key, value)) = token.trim().split_once('=') else {
            continue;
        };
        if !is_identity_key(key) {
            continue;
        }
        let value = value.trim();
        if value.is_empty() {
            log::debug!("Empty identity attribute in '{}'", dn);
            return None;
        }
        return Some(value.to_string());
    }
    None
}

/// [`extract_serial_identity`] for a subject that may be unavailable.
pub fn extract_serial_identity_opt(dn: Option<&str>) -> Option<String> {
    dn.and_then(extract_serial_identity)
}
