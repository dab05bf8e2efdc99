//! Content-addressed artifact store (§4.2).

use roar_core::{Artifact, ArtifactHash, HashAlgorithm};
use roar_error::{ErrorCode, RoarError};
use rusqlite::{params, OptionalExtension};

use crate::error::db_error;
use crate::Store;

/// The two job collections an artifact's edges can belong to.
#[derive(Debug, Default, Clone)]
pub struct ArtifactJobs {
    /// Job ids that wrote this artifact as an output.
    pub produced_by: Vec<i64>,
    /// Job ids that read this artifact as an input.
    pub consumed_by: Vec<i64>,
}

impl Store {
    /// Insert a new artifact, or — if any of `hashes` already identifies
    /// one — attach the remaining hashes to the existing artifact and
    /// return its id. Atomic within the wrapping transaction.
    pub fn put_artifact(
        &self,
        hashes: &[ArtifactHash],
        size: u64,
        first_path: Option<&str>,
        source_type: Option<&str>,
        source_url: Option<&str>,
    ) -> Result<String, RoarError> {
        if hashes.is_empty() {
            return Err(RoarError::new(
                ErrorCode::ValidationFailed,
                "put_artifact requires at least one hash",
            ));
        }

        let existing = self.find_artifact_by_any_hash(hashes)?;
        let id = match existing {
            Some(id) => id,
            None => uuid::Uuid::new_v4().to_string(),
        };

        self.conn
            .execute(
                "INSERT OR IGNORE INTO artifacts
                 (id, size, first_seen_at, first_seen_path, source_type, source_url)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id,
                    size as i64,
                    crate::now_unix(),
                    first_path,
                    source_type,
                    source_url
                ],
            )
            .map_err(|e| db_error("insert artifact", e))?;

        for hash in hashes {
            self.conn
                .execute(
                    "INSERT OR IGNORE INTO artifact_hashes (artifact_id, algorithm, digest)
                     VALUES (?1, ?2, ?3)",
                    params![id, hash.algorithm.as_str(), hash.digest],
                )
                .map_err(|e| db_error("insert artifact hash", e))?;
        }

        Ok(id)
    }

    fn find_artifact_by_any_hash(&self, hashes: &[ArtifactHash]) -> Result<Option<String>, RoarError> {
        for hash in hashes {
            let found: Option<String> = self
                .conn
                .query_row(
                    "SELECT artifact_id FROM artifact_hashes WHERE algorithm = ?1 AND digest = ?2",
                    params![hash.algorithm.as_str(), hash.digest],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| db_error("lookup artifact by hash", e))?;
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }

    /// Look up an artifact by a hash prefix (minimum 8 chars). Returns
    /// `Ok(None)` on no match and `Err(AmbiguousHash)` when more than one
    /// artifact matches.
    pub fn get_by_hash(
        &self,
        prefix: &str,
        algorithm: Option<HashAlgorithm>,
    ) -> Result<Option<Artifact>, RoarError> {
        if prefix.len() < 8 {
            return Err(RoarError::new(
                ErrorCode::ValidationFailed,
                "hash prefix must be at least 8 characters",
            ));
        }
        let like = format!("{}%", prefix.to_lowercase());
        let mut ids: Vec<String> = Vec::new();
        {
            let mut stmt = if let Some(algo) = algorithm {
                self.conn
                    .prepare(
                        "SELECT DISTINCT artifact_id FROM artifact_hashes
                         WHERE algorithm = ?1 AND digest LIKE ?2",
                    )
                    .map_err(|e| db_error("prepare hash lookup", e))?
            } else {
                self.conn
                    .prepare("SELECT DISTINCT artifact_id FROM artifact_hashes WHERE digest LIKE ?1")
                    .map_err(|e| db_error("prepare hash lookup", e))?
            };
            fn get_col0(row: &rusqlite::Row) -> rusqlite::Result<String> {
                row.get::<_, String>(0)
            }
            let rows = if let Some(algo) = algorithm {
                stmt.query_map(params![algo.as_str(), like], get_col0)
            } else {
                stmt.query_map(params![like], get_col0)
            }
            .map_err(|e| db_error("query hash lookup", e))?;
            for row in rows {
                ids.push(row.map_err(|e| db_error("read hash lookup row", e))?);
            }
        }

        match ids.len() {
            0 => Ok(None),
            1 => self.load_artifact(&ids[0]).map(Some),
            _ => Err(RoarError::new(
                ErrorCode::AmbiguousHash,
                format!("prefix {prefix} matches {} artifacts", ids.len()),
            )),
        }
    }

    /// Look up the artifact most recently observed at `absolute_path`,
    /// whether as a first-seen path or as any job's output edge.
    pub fn get_by_path(&self, absolute_path: &str) -> Result<Option<Artifact>, RoarError> {
        let id: Option<String> = self
            .conn
            .query_row(
                "SELECT id FROM artifacts WHERE first_seen_path = ?1
                 UNION
                 SELECT artifact_id FROM job_io WHERE direction = 'output' AND path = ?1
                 ORDER BY 1 DESC LIMIT 1",
                params![absolute_path],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| db_error("lookup artifact by path", e))?;
        match id {
            Some(id) => self.load_artifact(&id).map(Some),
            None => Ok(None),
        }
    }

    /// All paths this artifact has ever been observed at (first-seen path
    /// plus every job I/O edge referencing it).
    pub fn get_locations(&self, artifact_id: &str) -> Result<Vec<String>, RoarError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT path FROM job_io WHERE artifact_id = ?1
                 UNION
                 SELECT first_seen_path FROM artifacts WHERE id = ?1 AND first_seen_path IS NOT NULL",
            )
            .map_err(|e| db_error("prepare locations", e))?;
        let rows = stmt
            .query_map(params![artifact_id], |row| row.get::<_, String>(0))
            .map_err(|e| db_error("query locations", e))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| db_error("read location row", e))?);
        }
        Ok(out)
    }

    /// Every job that produced or consumed this artifact.
    pub fn get_jobs(&self, artifact_id: &str) -> Result<ArtifactJobs, RoarError> {
        let mut out = ArtifactJobs::default();
        let mut stmt = self
            .conn
            .prepare("SELECT job_id, direction FROM job_io WHERE artifact_id = ?1")
            .map_err(|e| db_error("prepare artifact jobs", e))?;
        let rows = stmt
            .query_map(params![artifact_id], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| db_error("query artifact jobs", e))?;
        for row in rows {
            let (job_id, direction) = row.map_err(|e| db_error("read artifact job row", e))?;
            if direction == "output" {
                out.produced_by.push(job_id);
            } else {
                out.consumed_by.push(job_id);
            }
        }
        Ok(out)
    }

    pub(crate) fn load_artifact(&self, id: &str) -> Result<Artifact, RoarError> {
        let mut artifact = self
            .conn
            .query_row(
                "SELECT id, size, first_seen_at, first_seen_path, source_type, source_url,
                        uploaded_to, synced_at, metadata
                 FROM artifacts WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Artifact {
                        id: row.get(0)?,
                        size: row.get::<_, i64>(1)? as u64,
                        first_seen_at: row.get(2)?,
                        first_seen_path: row.get(3)?,
                        source_type: row.get(4)?,
                        source_url: row.get(5)?,
                        uploaded_to: row.get(6)?,
                        synced_at: row.get(7)?,
                        metadata: row.get(8)?,
                        hashes: Vec::new(),
                    })
                },
            )
            .map_err(|e| db_error("load artifact", e))?;

        let mut stmt = self
            .conn
            .prepare("SELECT algorithm, digest FROM artifact_hashes WHERE artifact_id = ?1")
            .map_err(|e| db_error("prepare artifact hashes", e))?;
        let rows = stmt
            .query_map(params![id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| db_error("query artifact hashes", e))?;
        for row in rows {
            let (algo, digest) = row.map_err(|e| db_error("read artifact hash row", e))?;
            let algorithm = HashAlgorithm::parse(&algo).ok_or_else(|| {
                RoarError::new(ErrorCode::DbSchemaMismatch, format!("unknown algorithm {algo}"))
            })?;
            artifact.hashes.push(ArtifactHash::new(algorithm, digest)?);
        }
        Ok(artifact)
    }
}
