// SPDX-License-Identifier: MIT OR Apache-2.0
//! The 32-byte SHA-256 hash every stored artifact is addressed by.
//!
//! Content hashes and ID hashes share this representation; the *meaning*
//! differs only in what was hashed (full microdata vs. ID microdata).

use one_error::{ErrorKind, OneError, codes};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// The well-known SHA-256 of zero bytes — the hash of the empty BLOB.
pub const EMPTY_HASH: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// A 32-byte SHA-256 value, rendered as 64 lowercase hexadecimal characters.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash([u8; 32]);

impl Hash {
    /// Wrap raw digest bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The raw digest bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Compute the SHA-256 of `data`.
    #[must_use]
    pub fn digest(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Finalize an incrementally-fed hasher into a [`Hash`].
    #[must_use]
    pub fn from_hasher(hasher: Sha256) -> Self {
        Self(hasher.finalize().into())
    }

    /// The `k`-character lowercase-hex prefix used for shard placement.
    ///
    /// # Panics
    ///
    /// Panics if `k > 64`; callers validate the shard depth at init.
    #[must_use]
    pub fn hex_prefix(&self, k: usize) -> String {
        let full = self.to_string();
        full[..k].to_string()
    }

    /// Whether `s` has the exact shape of a rendered hash:
    /// 64 lowercase hex characters, nothing else.
    #[must_use]
    pub fn is_hash_string(s: &str) -> bool {
        s.len() == 64 && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({self})")
    }
}

impl FromStr for Hash {
    type Err = OneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !Self::is_hash_string(s) {
            return Err(OneError::new(
                ErrorKind::BadReference,
                codes::O2M_RTYC4,
                format!("not a 64-char lowercase hex hash: {s:?}"),
            ));
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in s.as_bytes().chunks_exact(2).enumerate() {
            let hi = hex_nibble(chunk[0]);
            let lo = hex_nibble(chunk[1]);
            bytes[i] = (hi << 4) | lo;
        }
        Ok(Self(bytes))
    }
}

fn hex_nibble(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'a'..=b'f' => b - b'a' + 10,
        // Unreachable after is_hash_string validation.
        _ => 0,
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(|e: OneError| D::Error::custom(e.to_string()))
    }
}
