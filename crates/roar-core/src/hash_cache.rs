//! Hash-cache domain type: memoizes digests keyed on `(path, algorithm)`,
//! invalidated by `(size, mtime)` per spec.md §4.1.

use crate::artifact::HashAlgorithm;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A cached digest for a path, valid only while `size`/`mtime` still match
/// the filesystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HashCacheEntry {
    /// Absolute, normalized path.
    pub path: String,
    /// Algorithm the digest is for.
    pub algorithm: HashAlgorithm,
    /// Lowercase-hex digest.
    pub digest: String,
    /// File size at the time the digest was computed.
    pub size: u64,
    /// File mtime (seconds since epoch, fractional) at computation time.
    pub mtime: f64,
    /// When this entry was written.
    pub cached_at: f64,
}

impl HashCacheEntry {
    /// `true` iff this entry is still valid for a file observed with the
    /// given `size`/`mtime`. Any mismatch forces recomputation.
    pub fn is_valid_for(&self, size: u64, mtime: f64) -> bool {
        self.size == size && self.mtime == mtime
    }
}
