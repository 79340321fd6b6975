//! Content-addressed cache key generation.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::Error;

/// Content-derived cache key for a normalized formula.
///
/// Always 64 lowercase hex characters (SHA-256).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Parse a previously rendered fingerprint.
    pub fn parse(s: &str) -> Result<Self, Error> {
        if s.len() == 64 && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
            Ok(Self(s.to_string()))
        } else {
            Err(Error::InvalidFingerprint)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Compute the cache key for already-normalized formula text.
///
/// Does not validate; callers normalize first.
pub fn fingerprint(normalized: &str) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    Fingerprint(hex::encode(hasher.finalize()))
}
