use crate::{Result, constants::MAX_CREDENTIAL_LENGTH, error::Error};
use serde::{Serialize, Serializer};
use std::fmt::{self, Write as _};
use subtle::ConstantTimeEq;

/// Render card UID bytes in the canonical transport form.
///
/// Every byte becomes a space followed by two uppercase hexadecimal digits,
/// so the result starts with a space whenever `bytes` is non-empty:
///
/// ```
/// use latchkey_core::format_uid;
///
/// assert_eq!(format_uid(&[0x04, 0xA2, 0x3B, 0x9C]), " 04 A2 3B 9C");
/// assert_eq!(format_uid(&[0x0F]), " 0F");
/// assert_eq!(format_uid(&[]), "");
/// ```
///
/// The authorization service matches credentials on this exact string, so
/// no trimming or byte reordering is applied.
#[must_use]
pub fn format_uid(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for byte in bytes {
        // Writing into a String cannot fail.
        let _ = write!(out, " {byte:02X}");
    }
    out
}

/// Card UID captured from the reader (1-10 bytes).
///
/// The canonical string is computed once at capture time and reused for
/// transport and logging. Serializes as the canonical string.
///
/// # Security
/// Equality compares the raw UID bytes in constant time.
#[derive(Debug, Clone, Eq)]
pub struct CredentialId {
    bytes: Vec<u8>,
    canonical: String,
}

impl CredentialId {
    /// Create a credential from raw UID bytes.
    ///
    /// # Errors
    /// Returns `Error::InvalidCredential` if the UID is empty or longer than
    /// `MAX_CREDENTIAL_LENGTH` bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();

        if bytes.is_empty() {
            return Err(Error::InvalidCredential("UID cannot be empty".to_string()));
        }

        let len = bytes.len();
        if len > MAX_CREDENTIAL_LENGTH {
            return Err(Error::InvalidCredential(format!(
                "UID must be at most {MAX_CREDENTIAL_LENGTH} bytes, got {len}"
            )));
        }

        let canonical = format_uid(&bytes);
        Ok(CredentialId { bytes, canonical })
    }

    /// Raw UID bytes as read from the card.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Canonical string form (see [`format_uid`]).
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// UID length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always `false`; empty credentials are rejected at construction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Display for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.canonical)
    }
}

impl PartialEq for CredentialId {
    fn eq(&self, other: &Self) -> bool {
        self.bytes.as_slice().ct_eq(other.bytes.as_slice()).into()
    }
}

impl std::hash::Hash for CredentialId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

impl Serialize for CredentialId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.canonical)
    }
}

impl TryFrom<&[u8]> for CredentialId {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        CredentialId::new(bytes)
    }
}
