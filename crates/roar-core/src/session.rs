//! Session domain type: groups jobs sharing a working tree and time window.

use roar_error::{ErrorCode, RoarError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A recording session: the scope `@N` step references resolve within.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Session {
    /// Database row id.
    pub id: i64,
    /// Stable, lowercase session identifier (8-64 chars).
    pub hash: String,
    /// Unix timestamp the session was opened.
    pub started_at: f64,
    /// Unix timestamp the session was closed, if it has been.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<f64>,
    /// Highest `run`-type step number recorded so far.
    pub current_step: u32,
    /// Highest `build`-type step number recorded so far.
    pub current_build_step: u32,
    /// Git repository root the session was opened in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_repo: Option<String>,
    /// Commit SHA at session start.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_commit_start: Option<String>,
    /// Commit SHA at session end.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_commit_end: Option<String>,
    /// Branch name at session start.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_branch: Option<String>,
}

impl Session {
    /// Validate a candidate `hash` (8-64 chars, lowercased). Mirrors the
    /// original model's session-hash validator.
    pub fn normalize_hash(hash: &str) -> Result<String, RoarError> {
        let hash = hash.to_lowercase();
        if hash.len() < 8 || hash.len() > 64 {
            return Err(RoarError::new(
                ErrorCode::ValidationFailed,
                format!("session hash length {} out of range [8, 64]", hash.len()),
            ));
        }
        Ok(hash)
    }

    /// `true` iff the session has been closed.
    pub fn is_closed(&self) -> bool {
        self.ended_at.is_some()
    }

    /// Next step number to assign for `job_type`, per spec.md §4.4 step
    /// numbering (separate sequences for `run` and `build`).
    pub fn next_step(&self, is_build: bool) -> u32 {
        if is_build {
            self.current_build_step + 1
        } else {
            self.current_step + 1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Session {
        Session {
            id: 1,
            hash: "abcdef01".into(),
            started_at: 1.0,
            ended_at: None,
            current_step: 0,
            current_build_step: 0,
            git_repo: None,
            git_commit_start: None,
            git_commit_end: None,
            git_branch: None,
        }
    }

    #[test]
    fn normalize_hash_lowercases() {
        assert_eq!(Session::normalize_hash("ABCDEF01").unwrap(), "abcdef01");
    }

    #[test]
    fn normalize_hash_rejects_too_short() {
        assert!(Session::normalize_hash("abc").is_err());
    }

    #[test]
    fn is_closed_reflects_ended_at() {
        let mut s = base();
        assert!(!s.is_closed());
        s.ended_at = Some(2.0);
        assert!(s.is_closed());
    }

    #[test]
    fn next_step_tracks_separate_sequences() {
        let mut s = base();
        assert_eq!(s.next_step(false), 1);
        assert_eq!(s.next_step(true), 1);
        s.current_step = 3;
        s.current_build_step = 1;
        assert_eq!(s.next_step(false), 4);
        assert_eq!(s.next_step(true), 2);
    }
}
