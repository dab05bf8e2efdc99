//! Session lifecycle (§4.3): at most one active session at a time.

use roar_core::Session;
use roar_error::RoarError;
use rusqlite::{params, OptionalExtension};

use crate::error::db_error;
use crate::Store;

impl Store {
    /// The currently active session, if any.
    pub fn get_active_session(&self) -> Result<Option<Session>, RoarError> {
        self.conn
            .query_row(
                "SELECT id, hash, started_at, ended_at, current_step, current_build_step,
                        git_repo, git_commit_start, git_commit_end, git_branch
                 FROM sessions WHERE is_active = 1",
                [],
                Self::row_to_session,
            )
            .optional()
            .map_err(|e| db_error("load active session", e))
    }

    /// Open a new active session, deactivating the previous one as a
    /// single transaction.
    pub fn create_session(
        &self,
        hash: &str,
        git_repo: Option<&str>,
        git_commit_start: Option<&str>,
        git_branch: Option<&str>,
    ) -> Result<Session, RoarError> {
        let hash = Session::normalize_hash(hash)?;
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| db_error("begin session transaction", e))?;
        tx.execute("UPDATE sessions SET is_active = 0, ended_at = ?1 WHERE is_active = 1",
            params![crate::now_unix()])
            .map_err(|e| db_error("deactivate previous session", e))?;
        tx.execute(
            "INSERT INTO sessions (hash, started_at, current_step, current_build_step,
                                    git_repo, git_commit_start, git_branch, is_active)
             VALUES (?1, ?2, 0, 0, ?3, ?4, ?5, 1)",
            params![hash, crate::now_unix(), git_repo, git_commit_start, git_branch],
        )
        .map_err(|e| db_error("insert session", e))?;
        let id = tx.last_insert_rowid();
        tx.commit().map_err(|e| db_error("commit session transaction", e))?;

        self.conn
            .query_row(
                "SELECT id, hash, started_at, ended_at, current_step, current_build_step,
                        git_repo, git_commit_start, git_commit_end, git_branch
                 FROM sessions WHERE id = ?1",
                params![id],
                Self::row_to_session,
            )
            .map_err(|e| db_error("reload created session", e))
    }

    /// Advance `current_step`/`current_build_step` for a session after
    /// recording a job, per the sequence `job_type` belongs to.
    pub(crate) fn bump_session_step(&self, session_id: i64, is_build: bool, step: u32) -> Result<(), RoarError> {
        let column = if is_build { "current_build_step" } else { "current_step" };
        self.conn
            .execute(
                &format!("UPDATE sessions SET {column} = ?1 WHERE id = ?2"),
                params![step, session_id],
            )
            .map_err(|e| db_error("bump session step", e))?;
        Ok(())
    }

    fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
        Ok(Session {
            id: row.get(0)?,
            hash: row.get(1)?,
            started_at: row.get(2)?,
            ended_at: row.get(3)?,
            current_step: row.get::<_, i64>(4)? as u32,
            current_build_step: row.get::<_, i64>(5)? as u32,
            git_repo: row.get(6)?,
            git_commit_start: row.get(7)?,
            git_commit_end: row.get(8)?,
            git_branch: row.get(9)?,
        })
    }
}
