//! Cache keys derived from query text

use sha2::{Digest, Sha256};
use std::fmt;

/// Prefix shared by every cache record file name
pub(crate) const RECORD_PREFIX: &str = "query_";

/// Extension shared by every cache record file name
pub(crate) const RECORD_EXTENSION: &str = "cache";

/// Length of a hex-encoded SHA-256 digest
const DIGEST_HEX_LEN: usize = 64;

/// Deterministic index into the cache store for a query
///
/// The key is the SHA-256 digest of the raw query bytes. Queries are not
/// normalized, so `"rust"` and `"Rust"` map to different keys. There is no way
/// back from a key to the query that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derives the key for a query
    pub fn from_query(query: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(query.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Parses a key back out of a record file name
    ///
    /// Returns `None` for anything that is not a `query_<digest>.cache` record,
    /// which lets the store ignore temporary and foreign files.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let digest = name
            .strip_prefix(RECORD_PREFIX)?
            .strip_suffix(RECORD_EXTENSION)?
            .strip_suffix('.')?;

        let is_digest = digest.len() == DIGEST_HEX_LEN
            && digest
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));

        is_digest.then(|| Self(digest.to_string()))
    }

    /// Returns the file name of the record stored under this key
    pub fn file_name(&self) -> String {
        format!("{}{}.{}", RECORD_PREFIX, self.0, RECORD_EXTENSION)
    }

    /// Returns the hex digest
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
