//! Content key shared by the memory and persistent tiers.

use sha2::{Digest, Sha256};

/// Number of digest bytes kept in a key.
const KEY_BYTES: usize = 16;

/// Fixed-width hexadecimal key derived from a source URL.
///
/// The same URL always yields the same key, across process restarts, so a key
/// can address both the in-memory map and the files of the persistent store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Length of every key, in hex characters.
    pub const LEN: usize = KEY_BYTES * 2;

    /// Derives the key for a URL by hashing its UTF-8 bytes.
    #[must_use]
    pub fn from_url(url: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        let digest = hasher.finalize();
        Self(hex::encode(&digest[..KEY_BYTES]))
    }

    /// Rebuilds a key from its textual form, e.g. a file name read back from disk.
    ///
    /// Returns `None` unless the input is exactly [`Self::LEN`] lowercase hex digits.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let well_formed = raw.len() == Self::LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        well_formed.then(|| Self(raw.to_string()))
    }

    /// Returns the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
