use std::fmt;
use std::hash::{Hash, Hasher};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use thiserror::Error;

/// The encoded remainder was not valid base64.
#[derive(Debug, Error)]
#[error("invalid digest encoding '{0}'")]
pub struct DigestDecodeError(pub String);

/// A content hash in the service's wire form: `"SHA256 <base64>"`.
///
/// The encoded string is stored as-is; equality is decided on the decoded
/// bytes so that two encodings of the same hash compare equal. Hashing uses
/// the canonical encoded string, which construction from raw bytes produces
/// deterministically.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest {
    encoded: String,
}

impl Digest {
    pub const SHA256: &'static str = "SHA256";

    /// Build a digest from the raw hash bytes, encoding them canonically.
    pub fn from_decoded(decoded: &[u8]) -> Self {
        Self {
            encoded: format!("{} {}", Self::SHA256, BASE64.encode(decoded)),
        }
    }

    /// Wrap an already-encoded digest string without re-encoding it.
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self {
            encoded: encoded.into(),
        }
    }

    /// Hash `data` with SHA-256 and wrap the result.
    pub fn compute(data: &[u8]) -> Self {
        Self::from_decoded(&Sha256::digest(data))
    }

    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// Split off the algorithm tag and base64-decode the remainder.
    pub fn decode(&self) -> Result<Vec<u8>, DigestDecodeError> {
        let value = self
            .encoded
            .split_once(' ')
            .map(|(_, rest)| rest)
            .unwrap_or(&self.encoded);
        BASE64
            .decode(value)
            .map_err(|_| DigestDecodeError(self.encoded.clone()))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

impl PartialEq for Digest {
    fn eq(&self, other: &Self) -> bool {
        match (self.decode(), other.decode()) {
            (Ok(a), Ok(b)) => a == b,
            // Undecodable digests fall back to the literal encoding so
            // equality stays total.
            _ => self.encoded == other.encoded,
        }
    }
}

impl Eq for Digest {}

impl Hash for Digest {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.encoded.hash(state);
    }
}

impl PartialEq<[u8]> for Digest {
    fn eq(&self, other: &[u8]) -> bool {
        self.decode().is_ok_and(|bytes| bytes == other)
    }
}

impl PartialEq<&[u8]> for Digest {
    fn eq(&self, other: &&[u8]) -> bool {
        self == *other
    }
}

impl PartialEq<str> for Digest {
    fn eq(&self, other: &str) -> bool {
        *self == Digest::from_encoded(other)
    }
}

impl PartialEq<&str> for Digest {
    fn eq(&self, other: &&str) -> bool {
        self == *other
    }
}
