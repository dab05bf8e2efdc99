//! Job domain types: executed commands with typed input/output edges.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// `run` (the default) or `build`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    /// A regular traced command.
    Run,
    /// A build-tool invocation, recorded under a separate step sequence.
    Build,
}

impl Default for JobType {
    fn default() -> Self {
        Self::Run
    }
}

/// Lifecycle marker distinct from `exit_code` (supplemented field; see
/// `SPEC_FULL.md` §3). With the current single-shot CLI architecture only
/// `Completed`/`Failed` are ever persisted — `Pending`/`Running` exist for
/// API completeness should a long-running daemon ever record jobs
/// incrementally, which is out of scope here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Recorded but not yet started (unused by the CLI today).
    Pending,
    /// In flight (unused by the CLI today).
    Running,
    /// Traced command exited zero.
    Completed,
    /// Traced command exited non-zero, or the tracer itself crashed.
    Failed,
}

impl JobStatus {
    /// Derive a status from an exit code the way `run`/`build` do when
    /// persisting a job.
    pub fn from_exit_code(exit_code: Option<i32>) -> Self {
        match exit_code {
            Some(0) => Self::Completed,
            _ => Self::Failed,
        }
    }
}

/// An input or output edge: a reference to an artifact with the path it
/// was observed at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct JobIoEdge {
    /// Id of the referenced artifact.
    pub artifact_id: String,
    /// Absolute, normalized path the artifact was observed at.
    pub path: String,
    /// Digest observed at record time, if known (denormalized for display).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Size observed at record time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// A recorded command execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Database row id.
    pub id: i64,
    /// Short, lowercase, system-generated id (6-12 hex chars).
    pub job_uid: String,
    /// Unix start timestamp.
    pub timestamp: f64,
    /// Raw command string as invoked.
    pub command: String,
    /// First token interpretable as a script path, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    /// Content hash of `command` + sorted input hashes; used for re-run
    /// detection (§4.4).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_identity: Option<String>,
    /// Owning session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<i64>,
    /// Position within `(session, job_type)`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_number: Option<u32>,
    /// Optional human label for the step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_name: Option<String>,
    /// Git repository root, if run inside one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_repo: Option<String>,
    /// Git commit SHA (7-40 chars).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_commit: Option<String>,
    /// Git branch name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_branch: Option<String>,
    /// Wall-clock duration in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    /// Exit code of the traced command.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Last time this job was registered with the LaaS server
    /// (supplemented field).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<f64>,
    /// Lifecycle marker (supplemented field).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    /// `run` or `build`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_type: Option<JobType>,
    /// Opaque JSON metadata (packages, runtime facts, env, analyzer output).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    /// Opaque JSON telemetry (external tracker URLs).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telemetry: Option<String>,
    /// Input edges, in observed order.
    #[serde(default)]
    pub inputs: Vec<JobIoEdge>,
    /// Output edges, in observed order.
    #[serde(default)]
    pub outputs: Vec<JobIoEdge>,
}

impl Job {
    /// `true` iff `job_type == Build`.
    pub fn is_build(&self) -> bool {
        matches!(self.job_type, Some(JobType::Build))
    }

    /// `true` iff the traced command exited zero.
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// The I/O signature used for re-run detection (§4.4): sorted input
    /// hashes paired with sorted output hashes, or the job's own uid if it
    /// has no I/O at all (a job with no I/O can never be a re-run of
    /// anything else).
    pub fn io_signature(&self) -> String {
        if self.inputs.is_empty() && self.outputs.is_empty() {
            return self.job_uid.clone();
        }
        let mut inputs: Vec<&str> = self
            .inputs
            .iter()
            .filter_map(|e| e.hash.as_deref())
            .collect();
        let mut outputs: Vec<&str> = self
            .outputs
            .iter()
            .filter_map(|e| e.hash.as_deref())
            .collect();
        inputs.sort_unstable();
        outputs.sort_unstable();
        format!("{}|{}", inputs.join(","), outputs.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(hash: &str) -> JobIoEdge {
        JobIoEdge {
            artifact_id: format!("art-{hash}"),
            path: format!("/tmp/{hash}"),
            hash: Some(hash.to_string()),
            size: Some(10),
        }
    }

    fn base_job(uid: &str) -> Job {
        Job {
            id: 1,
            job_uid: uid.into(),
            timestamp: 1.0,
            command: "echo hi".into(),
            script: None,
            step_identity: None,
            session_id: Some(1),
            step_number: Some(1),
            step_name: None,
            git_repo: None,
            git_commit: None,
            git_branch: None,
            duration_seconds: Some(0.1),
            exit_code: Some(0),
            synced_at: None,
            status: None,
            job_type: None,
            metadata: None,
            telemetry: None,
            inputs: vec![],
            outputs: vec![],
        }
    }

    #[test]
    fn is_build_reflects_job_type() {
        let mut job = base_job("abc123");
        assert!(!job.is_build());
        job.job_type = Some(JobType::Build);
        assert!(job.is_build());
    }

    #[test]
    fn succeeded_requires_zero_exit() {
        let mut job = base_job("abc123");
        assert!(job.succeeded());
        job.exit_code = Some(1);
        assert!(!job.succeeded());
    }

    #[test]
    fn io_signature_uses_job_uid_when_no_io() {
        let job = base_job("zzz999");
        assert_eq!(job.io_signature(), "zzz999");
    }

    #[test]
    fn io_signature_is_order_independent() {
        let mut a = base_job("aaa111");
        a.inputs = vec![edge("h2"), edge("h1")];
        a.outputs = vec![edge("o1")];
        let mut b = base_job("bbb222");
        b.inputs = vec![edge("h1"), edge("h2")];
        b.outputs = vec![edge("o1")];
        assert_eq!(a.io_signature(), b.io_signature());
    }

    #[test]
    fn status_from_exit_code() {
        assert_eq!(JobStatus::from_exit_code(Some(0)), JobStatus::Completed);
        assert_eq!(JobStatus::from_exit_code(Some(1)), JobStatus::Failed);
        assert_eq!(JobStatus::from_exit_code(None), JobStatus::Failed);
    }
}
