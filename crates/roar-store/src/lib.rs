//! SQLite-backed lineage store (§4.2-§4.3): artifacts, jobs, sessions, the
//! hash cache, and collections, all behind one [`Store`] handle.

mod artifacts;
mod collections;
mod error;
mod hash_cache;
mod jobs;
mod schema;
mod sessions;

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use roar_error::{ErrorCode, RoarError};
use rusqlite::Connection;

pub use artifacts::ArtifactJobs;
pub use jobs::NewJob;

/// A handle on one `.roar/roar.db` database.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (creating if necessary) the database at `path`, with WAL mode
    /// and foreign keys enabled, and the schema applied.
    pub fn open(path: &Path) -> Result<Self, RoarError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                RoarError::new(
                    ErrorCode::DbConnectionFailed,
                    format!("create {}: {e}", parent.display()),
                )
                .with_source(e)
            })?;
        }
        let conn = schema::open(&path.to_string_lossy()).map_err(|e| {
            RoarError::new(ErrorCode::DbConnectionFailed, format!("open {}: {e}", path.display()))
                .with_source(e)
        })?;
        Ok(Self { conn })
    }

    /// Open an in-memory database. Used by tests and by `roar`'s
    /// `--dry-run` style commands that never want to touch disk.
    pub fn open_in_memory() -> Result<Self, RoarError> {
        let conn = schema::open(":memory:").map_err(|e| {
            RoarError::new(ErrorCode::DbConnectionFailed, "open in-memory database").with_source(e)
        })?;
        Ok(Self { conn })
    }
}

fn now_unix() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs_f64()
}

fn short_uid() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..10].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_and_open_in_memory_both_create_schema() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("roar.db")).unwrap();
        assert!(store.get_active_session().unwrap().is_none());

        let mem_store = Store::open_in_memory().unwrap();
        assert!(mem_store.get_active_session().unwrap().is_none());
    }

    #[test]
    fn short_uid_has_expected_length() {
        assert_eq!(short_uid().len(), 10);
    }
}
