//! Streaming multi-algorithm hashing with a freshness-keyed cache (§4.1).
//!
//! `hash`/`hash_all` never read a whole file into memory: each algorithm's
//! streaming hasher consumes the file in 8 MB chunks. A per-path failure
//! (missing file, permission denied, interrupted I/O) never fails a batch —
//! it is reported back in the `errors` map of the batch result.

mod streaming;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use roar_core::hash_cache::HashCacheEntry;
use roar_core::path::normalize;
use roar_core::{ArtifactHash, HashAlgorithm};
use roar_error::{ErrorCode, RoarError};
use streaming::StreamingHasher;

/// 8 MB, per spec.md §4.1.
pub const CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Looks up and stores cached digests. Implementors back this with
/// whatever persistence layer they like (`roar-store`'s SQLite table in
/// production; an in-memory map in tests).
pub trait DigestCache {
    /// Fetch a cached entry for `(path, algorithm)`, if any.
    fn get(&self, path: &Path, algorithm: HashAlgorithm) -> Option<HashCacheEntry>;
    /// Insert or replace the cached entry for `(path, algorithm)`.
    fn put(&mut self, entry: HashCacheEntry);
}

/// A `DigestCache` that never hits: every call recomputes. Useful for
/// one-shot callers (e.g. `roar hash` on a single file) that don't want
/// cache plumbing.
#[derive(Debug, Default)]
pub struct NoCache;

impl DigestCache for NoCache {
    fn get(&self, _path: &Path, _algorithm: HashAlgorithm) -> Option<HashCacheEntry> {
        None
    }

    fn put(&mut self, _entry: HashCacheEntry) {}
}

/// Result of hashing one path across one or more algorithms.
#[derive(Debug, Default)]
pub struct PathHashResult {
    /// Successful digests, keyed by algorithm.
    pub digests: BTreeMap<HashAlgorithm, String>,
    /// Per-algorithm failures (normally there is at most one stat failure
    /// shared across all algorithms, since it's the same file).
    pub errors: Vec<RoarError>,
}

fn stat_freshness_key(path: &Path) -> Result<(u64, f64), RoarError> {
    let meta = fs::metadata(path).map_err(|e| {
        RoarError::new(ErrorCode::HashIoError, format!("stat {}: {e}", path.display()))
            .with_source(e)
    })?;
    let mtime = meta
        .modified()
        .map_err(|e| {
            RoarError::new(ErrorCode::HashIoError, format!("mtime {}: {e}", path.display()))
                .with_source(e)
        })?
        .duration_since(UNIX_EPOCH)
        .map_err(|e| {
            RoarError::new(ErrorCode::HashIoError, format!("mtime before epoch: {e}"))
        })?
        .as_secs_f64();
    Ok((meta.len(), mtime))
}

/// Hash a single `path` under each of `algorithms`, consulting and
/// populating `cache`. Returns a partial result on per-algorithm failure;
/// a failure to even `stat` the path fails every algorithm identically.
pub fn hash(
    path: &Path,
    algorithms: &[HashAlgorithm],
    cache: &mut dyn DigestCache,
) -> PathHashResult {
    let path = normalize(path);
    let mut result = PathHashResult::default();

    let (size, mtime) = match stat_freshness_key(&path) {
        Ok(key) => key,
        Err(err) => {
            result.errors.push(err);
            return result;
        }
    };

    for &algorithm in algorithms {
        if let Some(cached) = cache.get(&path, algorithm) {
            if cached.is_valid_for(size, mtime) {
                result.digests.insert(algorithm, cached.digest);
                continue;
            }
        }
        match compute_digest(&path, algorithm) {
            Ok(digest) => {
                cache.put(HashCacheEntry {
                    path: path.to_string_lossy().into_owned(),
                    algorithm,
                    digest: digest.clone(),
                    size,
                    mtime,
                    cached_at: mtime,
                });
                result.digests.insert(algorithm, digest);
            }
            Err(err) => result.errors.push(err),
        }
    }

    result
}

/// Hash every path in `paths` under every algorithm in `algorithms`.
/// Per-path failures never abort the batch.
pub fn hash_all(
    paths: &[PathBuf],
    algorithms: &[HashAlgorithm],
    cache: &mut dyn DigestCache,
) -> BTreeMap<PathBuf, PathHashResult> {
    paths
        .iter()
        .map(|p| (p.clone(), hash(p, algorithms, cache)))
        .collect()
}

fn compute_digest(path: &Path, algorithm: HashAlgorithm) -> Result<String, RoarError> {
    let mut hasher = StreamingHasher::new(algorithm);
    let mut file = fs::File::open(path).map_err(|e| {
        RoarError::new(ErrorCode::HashIoError, format!("open {}: {e}", path.display()))
            .with_source(e)
    })?;
    let mut buf = vec![0u8; CHUNK_SIZE];
    use std::io::Read;
    loop {
        let n = file.read(&mut buf).map_err(|e| {
            RoarError::new(ErrorCode::HashIoError, format!("read {}: {e}", path.display()))
                .with_source(e)
        })?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize_hex())
}

/// Convenience: turn a completed `PathHashResult` into validated
/// `ArtifactHash` values, dropping any that somehow fail validation
/// (which would indicate a hasher bug, not a caller error).
pub fn to_artifact_hashes(result: &PathHashResult) -> Vec<ArtifactHash> {
    result
        .digests
        .iter()
        .filter_map(|(&algo, digest)| ArtifactHash::new(algo, digest.clone()).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[derive(Default)]
    struct MapCache(HashMap<(PathBuf, HashAlgorithm), HashCacheEntry>);

    impl DigestCache for MapCache {
        fn get(&self, path: &Path, algorithm: HashAlgorithm) -> Option<HashCacheEntry> {
            self.0.get(&(path.to_path_buf(), algorithm)).cloned()
        }

        fn put(&mut self, entry: HashCacheEntry) {
            self.0
                .insert((PathBuf::from(&entry.path), entry.algorithm), entry);
        }
    }

    fn write_temp(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn hashes_known_content() {
        let f = write_temp(b"hello world");
        let mut cache = NoCache;
        let result = hash(f.path(), &[HashAlgorithm::Sha256], &mut cache);
        assert!(result.errors.is_empty());
        assert_eq!(
            result.digests.get(&HashAlgorithm::Sha256).unwrap(),
            "b94d27b9934d3e08a52e52d7da7dacefbd0c4a5c1f6e6eb5e8a10a9b5ee8e6d4"
        );
    }

    #[test]
    fn missing_file_reports_error_not_panic() {
        let mut cache = NoCache;
        let result = hash(
            Path::new("/nonexistent/path/does-not-exist"),
            &[HashAlgorithm::Blake3],
            &mut cache,
        );
        assert!(result.digests.is_empty());
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn cache_hit_avoids_recompute_and_matches_fresh() {
        let f = write_temp(b"cached content");
        let mut cache = MapCache::default();
        let first = hash(f.path(), &[HashAlgorithm::Blake3], &mut cache);
        let second = hash(f.path(), &[HashAlgorithm::Blake3], &mut cache);
        assert_eq!(
            first.digests.get(&HashAlgorithm::Blake3),
            second.digests.get(&HashAlgorithm::Blake3)
        );
    }

    #[test]
    fn multiple_algorithms_all_computed() {
        let f = write_temp(b"multi-algo");
        let mut cache = NoCache;
        let result = hash(
            f.path(),
            &[HashAlgorithm::Blake3, HashAlgorithm::Sha256, HashAlgorithm::Md5],
            &mut cache,
        );
        assert_eq!(result.digests.len(), 3);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn to_artifact_hashes_round_trips() {
        let f = write_temp(b"artifact content");
        let mut cache = NoCache;
        let result = hash(f.path(), &[HashAlgorithm::Blake3], &mut cache);
        let hashes = to_artifact_hashes(&result);
        assert_eq!(hashes.len(), 1);
        assert_eq!(hashes[0].algorithm, HashAlgorithm::Blake3);
    }
}
