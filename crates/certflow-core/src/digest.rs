//! # Content Digest
//!
//! SHA-256 fingerprints for rendered certificate content. A certificate's
//! digest is fixed at issuance; recomputing it over the stored content
//! detects any later edit of the record.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A SHA-256 digest of some content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// The lowercase hex form of the digest.
    pub fn to_hex(&self) -> &str {
        &self.0
    }

    /// Whether this digest matches `content`.
    pub fn matches(&self, content: &[u8]) -> bool {
        sha256_digest(content) == *self
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sha256:{}", self.0)
    }
}

/// Compute the SHA-256 digest of `content`.
pub fn sha256_digest(content: &[u8]) -> ContentDigest {
    let hash = Sha256::digest(content);
    ContentDigest(hash.iter().map(|b| format!("{b:02x}")).collect())
}
