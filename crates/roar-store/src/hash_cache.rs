//! `roar_hash::DigestCache` backed by the `hash_cache` table.

use roar_core::hash_cache::HashCacheEntry;
use roar_core::HashAlgorithm;
use roar_hash::DigestCache;
use rusqlite::params;
use std::path::Path;

use crate::Store;

impl DigestCache for Store {
    fn get(&self, path: &Path, algorithm: HashAlgorithm) -> Option<HashCacheEntry> {
        self.conn
            .query_row(
                "SELECT path, algorithm, digest, size, mtime, cached_at
                 FROM hash_cache WHERE path = ?1 AND algorithm = ?2",
                params![path.to_string_lossy(), algorithm.as_str()],
                |row| {
                    let algo_str: String = row.get(1)?;
                    Ok(HashCacheEntry {
                        path: row.get(0)?,
                        algorithm: HashAlgorithm::parse(&algo_str).unwrap_or(HashAlgorithm::Sha256),
                        digest: row.get(2)?,
                        size: row.get::<_, i64>(3)? as u64,
                        mtime: row.get(4)?,
                        cached_at: row.get(5)?,
                    })
                },
            )
            .ok()
    }

    fn put(&mut self, entry: HashCacheEntry) {
        let _ = self.conn.execute(
            "INSERT INTO hash_cache (path, algorithm, digest, size, mtime, cached_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(path, algorithm) DO UPDATE SET
                digest = excluded.digest, size = excluded.size,
                mtime = excluded.mtime, cached_at = excluded.cached_at",
            params![
                entry.path,
                entry.algorithm.as_str(),
                entry.digest,
                entry.size as i64,
                entry.mtime,
                entry.cached_at
            ],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn put_then_get_round_trips() {
        let mut store = Store::open_in_memory().unwrap();
        let entry = HashCacheEntry {
            path: "/data/file.bin".into(),
            algorithm: HashAlgorithm::Blake3,
            digest: "abc123".into(),
            size: 42,
            mtime: 100.0,
            cached_at: 101.0,
        };
        store.put(entry.clone());
        let found = store.get(&PathBuf::from("/data/file.bin"), HashAlgorithm::Blake3).unwrap();
        assert_eq!(found.digest, "abc123");
    }

    #[test]
    fn put_overwrites_existing_entry() {
        let mut store = Store::open_in_memory().unwrap();
        let path = PathBuf::from("/data/file.bin");
        store.put(HashCacheEntry {
            path: path.to_string_lossy().into_owned(),
            algorithm: HashAlgorithm::Sha256,
            digest: "old".into(),
            size: 1,
            mtime: 1.0,
            cached_at: 1.0,
        });
        store.put(HashCacheEntry {
            path: path.to_string_lossy().into_owned(),
            algorithm: HashAlgorithm::Sha256,
            digest: "new".into(),
            size: 2,
            mtime: 2.0,
            cached_at: 2.0,
        });
        let found = store.get(&path, HashAlgorithm::Sha256).unwrap();
        assert_eq!(found.digest, "new");
    }

    #[test]
    fn miss_returns_none() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.get(&PathBuf::from("/nope"), HashAlgorithm::Md5).is_none());
    }
}
