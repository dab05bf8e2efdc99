//! Four-phase registration orchestration (§4.12), grounded on
//! `original_source/roar/services/registration/coordinator.py`'s
//! `RegistrationCoordinator.register_lineage`.
//!
//! The session itself is assumed already registered by the caller
//! (mirroring the Python docstring: "Session already registered, passed
//! as session_hash") — this coordinator only runs phases 2-4.

use roar_core::{Artifact, Job};
use roar_git::GitContext;
use roar_secrets::SecretFilter;
use serde_json::{json, Value};
use std::collections::BTreeSet;

use crate::batching::{batch_by_count, batch_by_size};
use crate::client_trait::LineageClient;
use crate::result::BatchRegistrationResult;
use crate::validate::{is_placeholder, validate_artifact, validate_job, JobFields};

/// Run phases 2-4 of lineage registration against `client`.
///
/// `link_batch_max_count` applies independently to a job's inputs and
/// outputs, matching `job.py`'s `_batch_artifacts`.
pub async fn register_lineage(
    client: &dyn LineageClient,
    secrets: &SecretFilter,
    session_hash: &str,
    git_context: &GitContext,
    jobs: &[Job],
    artifacts: &[Artifact],
    batch_max_bytes: usize,
    link_batch_max_count: usize,
) -> BatchRegistrationResult {
    let mut result = BatchRegistrationResult { session_registered: true, ..Default::default() };

    // Phase 2: per-job creation, no I/O edges yet.
    let mut created_uids: BTreeSet<String> = BTreeSet::new();
    for job in jobs {
        if is_placeholder(Some(&job.job_uid)) {
            result.jobs_failed += 1;
            result.errors.push("job missing job_uid, skipped".to_string());
            continue;
        }

        let git_commit = job.git_commit.clone().or_else(|| Some(git_context.commit.clone()));
        let git_branch = job.git_branch.clone().or_else(|| git_context.branch.clone());

        let fields = JobFields {
            command: Some(job.command.as_str()),
            timestamp: job.timestamp,
            session_hash,
            job_uid: Some(job.job_uid.as_str()),
            git_commit: git_commit.as_deref(),
            git_branch: git_branch.as_deref(),
            step_number: job.step_number,
        };

        let errors = validate_job(&fields);
        if !errors.is_empty() {
            result.jobs_failed += 1;
            result.errors.extend(errors.into_iter().map(|e| format!("job {}: {e}", job.job_uid)));
            continue;
        }

        let filtered_command = secrets.filter_command(&job.command).filtered;
        let filtered_git_repo = job
            .git_repo
            .as_deref()
            .map(|url| secrets.filter_git_url(url).filtered);
        let filtered_metadata = job.metadata.as_deref().and_then(|raw| {
            serde_json::from_str::<Value>(raw)
                .ok()
                .map(|v| secrets.filter_metadata(&v).0)
        });

        let payload = json!({
            "job_uid": job.job_uid,
            "command": filtered_command,
            "timestamp": job.timestamp,
            "git_repo": filtered_git_repo,
            "git_commit": git_commit,
            "git_branch": git_branch,
            "job_type": if job.is_build() { "build" } else { "run" },
            "step_number": job.step_number.unwrap_or(0),
            "exit_code": job.exit_code,
            "duration_seconds": job.duration_seconds,
            "metadata": filtered_metadata,
        });

        match client.register_job(session_hash, &payload).await {
            Ok(_) => {
                result.jobs_created += 1;
                created_uids.insert(job.job_uid.clone());
            }
            Err(e) => {
                result.jobs_failed += 1;
                result.errors.push(format!("job {}: {e}", job.job_uid));
            }
        }
    }

    // Phase 3: batch artifact registration.
    if !artifacts.is_empty() {
        let mut payloads = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            let errors = validate_artifact(artifact, session_hash);
            if !errors.is_empty() {
                result.artifacts_failed += 1;
                result.errors.extend(errors.into_iter().map(|e| format!("artifact {}: {e}", artifact.id)));
                continue;
            }
            payloads.push(json!({
                "hashes": artifact.hashes.iter().map(|h| json!({
                    "algorithm": h.algorithm.as_str(),
                    "digest": h.digest,
                })).collect::<Vec<_>>(),
                "size": artifact.size,
                "source_type": artifact.source_type,
                "session_hash": session_hash,
                "source_url": artifact.source_url,
                "metadata": artifact.metadata,
            }));
        }

        for batch in batch_by_size(&payloads, batch_max_bytes) {
            match client.register_artifacts_batch(&batch).await {
                Ok(_) => result.artifacts_registered += batch.len() as u32,
                Err(e) => {
                    result.artifacts_failed += batch.len() as u32;
                    result.errors.push(format!("artifact batch: {e}"));
                    break;
                }
            }
        }
    }

    // Phase 4: per-job I/O linking, only for jobs that were created this run.
    for job in jobs {
        if !created_uids.contains(&job.job_uid) {
            continue;
        }

        let inputs = extract_io_list(job, true);
        let outputs = extract_io_list(job, false);
        if inputs.is_empty() && outputs.is_empty() {
            continue;
        }

        let mut link_errors = Vec::new();

        if !inputs.is_empty() {
            for batch in batch_by_count(&inputs, link_batch_max_count) {
                match client.register_job_inputs(session_hash, &job.job_uid, &batch).await {
                    Ok(resp) => {
                        result.links_created += linked_count(&resp, "inputs_linked", batch.len());
                    }
                    Err(e) => {
                        link_errors.push(format!("inputs: {e}"));
                        break;
                    }
                }
            }
        }

        if !outputs.is_empty() {
            for batch in batch_by_count(&outputs, link_batch_max_count) {
                match client.register_job_outputs(session_hash, &job.job_uid, &batch).await {
                    Ok(resp) => {
                        result.links_created += linked_count(&resp, "outputs_linked", batch.len());
                    }
                    Err(e) => {
                        link_errors.push(format!("outputs: {e}"));
                        break;
                    }
                }
            }
        }

        if !link_errors.is_empty() {
            result.links_failed += 1;
            result.errors.push(format!("job {}: {}", job.job_uid, link_errors.join("; ")));
        }
    }

    result
}

/// Build the `{hash, path}` list for one side of a job's I/O, dropping
/// edges missing either a hash or a path (mirrors `coordinator.py`'s
/// `_extract_io_list`'s `if h and p:` guard).
fn extract_io_list(job: &Job, inputs: bool) -> Vec<Value> {
    let edges = if inputs { &job.inputs } else { &job.outputs };
    edges
        .iter()
        .filter(|e| !e.path.is_empty() && e.hash.is_some())
        .map(|e| json!({"hash": e.hash, "path": e.path}))
        .collect()
}

fn linked_count(response: &Value, key: &str, batch_len: usize) -> u32 {
    response
        .get(key)
        .and_then(|v| v.as_u64())
        .map(|n| n as u32)
        .unwrap_or(batch_len as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use roar_core::{ArtifactHash, HashAlgorithm, JobIoEdge};
    use roar_error::RoarError;
    use std::path::PathBuf;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockClient {
        fail_job_uids: Vec<String>,
        fail_artifact_batches_after: Option<usize>,
        artifact_batch_calls: Mutex<usize>,
        fail_inputs: bool,
    }

    #[async_trait]
    impl LineageClient for MockClient {
        async fn register_job(&self, _session_hash: &str, job: &Value) -> Result<Value, RoarError> {
            let uid = job["job_uid"].as_str().unwrap_or_default();
            if self.fail_job_uids.iter().any(|u| u == uid) {
                return Err(RoarError::new(roar_error::ErrorCode::HttpServerError, "boom"));
            }
            Ok(json!({}))
        }

        async fn register_artifacts_batch(&self, artifacts: &[Value]) -> Result<Value, RoarError> {
            let mut calls = self.artifact_batch_calls.lock().unwrap();
            *calls += 1;
            if let Some(limit) = self.fail_artifact_batches_after {
                if *calls > limit {
                    return Err(RoarError::new(roar_error::ErrorCode::HttpServerError, "boom"));
                }
            }
            Ok(json!({"created": artifacts.len()}))
        }

        async fn register_job_inputs(&self, _session_hash: &str, _job_uid: &str, batch: &[Value]) -> Result<Value, RoarError> {
            if self.fail_inputs {
                return Err(RoarError::new(roar_error::ErrorCode::HttpServerError, "boom"));
            }
            Ok(json!({"inputs_linked": batch.len()}))
        }

        async fn register_job_outputs(&self, _session_hash: &str, _job_uid: &str, batch: &[Value]) -> Result<Value, RoarError> {
            Ok(json!({"outputs_linked": batch.len()}))
        }
    }

    fn base_job(uid: &str) -> Job {
        Job {
            id: 1,
            job_uid: uid.to_string(),
            timestamp: 1.0,
            command: "python train.py".into(),
            script: None,
            step_identity: None,
            session_id: Some(1),
            step_number: Some(1),
            step_name: None,
            git_repo: None,
            git_commit: Some("deadbeef".into()),
            git_branch: Some("main".into()),
            duration_seconds: Some(1.0),
            exit_code: Some(0),
            synced_at: None,
            status: None,
            job_type: Some(roar_core::JobType::Run),
            metadata: None,
            telemetry: None,
            inputs: vec![],
            outputs: vec![],
        }
    }

    fn git_context() -> GitContext {
        GitContext {
            repo_root: PathBuf::from("/repo"),
            commit: "deadbeef".into(),
            branch: Some("main".into()),
            remote_url: None,
            clean: true,
        }
    }

    #[tokio::test]
    async fn creates_jobs_and_reports_failures() {
        let client = MockClient { fail_job_uids: vec!["bad".into()], ..Default::default() };
        let secrets = SecretFilter::from_config(&Default::default());
        let jobs = vec![base_job("good"), base_job("bad")];

        let result = register_lineage(&client, &secrets, "session1", &git_context(), &jobs, &[], 90 * 1024, 100).await;

        assert_eq!(result.jobs_created, 1);
        assert_eq!(result.jobs_failed, 1);
        assert!(!result.is_success());
    }

    #[tokio::test]
    async fn job_missing_uid_is_skipped_as_failure() {
        let client = MockClient::default();
        let secrets = SecretFilter::from_config(&Default::default());
        let mut job = base_job("");
        job.job_uid = String::new();

        let result = register_lineage(&client, &secrets, "session1", &git_context(), &[job], &[], 90 * 1024, 100).await;
        assert_eq!(result.jobs_failed, 1);
    }

    fn base_artifact(id: &str) -> Artifact {
        Artifact {
            id: id.into(),
            size: 10,
            first_seen_at: 1.0,
            first_seen_path: None,
            source_type: None,
            source_url: None,
            uploaded_to: None,
            synced_at: None,
            metadata: None,
            hashes: vec![ArtifactHash::new(HashAlgorithm::Blake3, "abcdef01").unwrap()],
        }
    }

    #[tokio::test]
    async fn artifact_batch_stops_on_first_error() {
        let client = MockClient { fail_artifact_batches_after: Some(1), ..Default::default() };
        let secrets = SecretFilter::from_config(&Default::default());
        // force multiple batches with a tiny max_bytes
        let artifacts: Vec<Artifact> = (0..5).map(|i| base_artifact(&format!("a{i}"))).collect();

        let result = register_lineage(&client, &secrets, "session1", &git_context(), &[], &artifacts, 40, 100).await;

        assert!(result.artifacts_registered > 0);
        assert!(result.artifacts_failed > 0);
    }

    #[tokio::test]
    async fn links_created_for_jobs_with_io() {
        let client = MockClient::default();
        let secrets = SecretFilter::from_config(&Default::default());
        let mut job = base_job("j1");
        job.inputs = vec![JobIoEdge { artifact_id: "a1".into(), path: "/data/in.csv".into(), hash: Some("abc".into()), size: Some(1) }];
        job.outputs = vec![JobIoEdge { artifact_id: "a2".into(), path: "/data/out.csv".into(), hash: Some("def".into()), size: Some(1) }];

        let result = register_lineage(&client, &secrets, "session1", &git_context(), &[job], &[], 90 * 1024, 100).await;

        assert_eq!(result.jobs_created, 1);
        assert_eq!(result.links_created, 2);
        assert_eq!(result.links_failed, 0);
    }

    #[tokio::test]
    async fn link_failure_on_one_side_still_reports_the_other() {
        let client = MockClient { fail_inputs: true, ..Default::default() };
        let secrets = SecretFilter::from_config(&Default::default());
        let mut job = base_job("j1");
        job.inputs = vec![JobIoEdge { artifact_id: "a1".into(), path: "/data/in.csv".into(), hash: Some("abc".into()), size: Some(1) }];
        job.outputs = vec![JobIoEdge { artifact_id: "a2".into(), path: "/data/out.csv".into(), hash: Some("def".into()), size: Some(1) }];

        let result = register_lineage(&client, &secrets, "session1", &git_context(), &[job], &[], 90 * 1024, 100).await;

        assert_eq!(result.links_failed, 1);
        assert_eq!(result.links_created, 1);
    }
}
