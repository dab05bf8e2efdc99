//! Resolves a `@N`/`@BN` reference against the active session's recorded
//! steps, applying parameter overrides and reporting stale upstream
//! producers (§4.4).
//!
//! Grounded on
//! `original_source/roar/services/execution/dag_resolver.py`'s
//! `DAGReferenceResolver.resolve`/`_find_stale_upstream`.

use std::collections::{BTreeMap, BTreeSet};

use roar_core::{Job, JobType};
use roar_error::{ErrorCode, RoarError};
use roar_store::Store;

use crate::reference::{apply_overrides, parse_reference};

/// The outcome of resolving a DAG reference.
#[derive(Debug, Clone)]
pub struct ResolvedStep {
    pub step_number: u32,
    pub is_build: bool,
    pub command: String,
    pub original_step: Job,
    /// Step numbers of upstream producers that are themselves stale,
    /// sorted ascending. Always empty unless `step_number` itself is
    /// stale.
    pub stale_upstream: Vec<u32>,
}

/// Resolve `reference` (`@N` or `@BN`) within `session_id`, applying
/// `overrides` to the recorded command.
pub fn resolve(
    store: &Store,
    session_id: i64,
    reference: &str,
    overrides: &BTreeMap<String, String>,
) -> Result<ResolvedStep, RoarError> {
    let step_ref = parse_reference(reference)?;
    let job_type = if step_ref.is_build { JobType::Build } else { JobType::Run };

    let step = store.get_step_by_number(session_id, step_ref.number, Some(job_type))?.ok_or_else(|| {
        let prefix = if step_ref.is_build { "@B" } else { "@" };
        RoarError::new(ErrorCode::ValidationFailed, format!("no node {prefix}{} in DAG", step_ref.number))
    })?;

    let stale_steps = store.get_stale_steps(session_id)?;
    let all_steps = store.get_steps(session_id)?;
    let stale_upstream = find_stale_upstream(&step, &stale_steps, &all_steps);

    let command = apply_overrides(&step.command, overrides);

    Ok(ResolvedStep { step_number: step_ref.number, is_build: step_ref.is_build, command, original_step: step, stale_upstream })
}

/// Immediate producers of `step`'s inputs that are themselves stale.
/// Mirrors `_find_stale_upstream`: only computed when `step` itself is in
/// `stale_steps` (if it weren't, none of its producers could be stale
/// either, since staleness propagates downstream through consumption).
fn find_stale_upstream(step: &Job, stale_steps: &BTreeSet<u32>, all_steps: &[Job]) -> Vec<u32> {
    let Some(step_number) = step.step_number else { return Vec::new() };
    if !stale_steps.contains(&step_number) {
        return Vec::new();
    }

    let mut upstream = BTreeSet::new();
    for input in &step.inputs {
        for other in all_steps {
            let Some(other_number) = other.step_number else { continue };
            if other_number == step_number || !stale_steps.contains(&other_number) {
                continue;
            }
            if other.outputs.iter().any(|output| output.path == input.path) {
                upstream.insert(other_number);
            }
        }
    }
    upstream.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use roar_core::{ArtifactHash, HashAlgorithm, JobIoEdge};
    use roar_store::NewJob;

    fn edge(artifact_id: &str, path: &str, hash: &str) -> JobIoEdge {
        JobIoEdge { artifact_id: artifact_id.into(), path: path.into(), hash: Some(hash.into()), size: Some(1) }
    }

    fn base_job(command: &str) -> NewJob {
        NewJob {
            command: command.into(),
            script: None,
            timestamp: 1.0,
            git_repo: None,
            git_commit: None,
            git_branch: None,
            duration_seconds: Some(0.1),
            exit_code: Some(0),
            inputs: vec![],
            outputs: vec![],
            metadata: None,
            telemetry: None,
            job_type: JobType::Run,
        }
    }

    fn hash(value: &str) -> ArtifactHash {
        ArtifactHash::new(HashAlgorithm::Blake3, value).unwrap()
    }

    #[test]
    fn resolves_reference_and_applies_overrides() {
        let store = Store::open_in_memory().unwrap();
        store.create_session("abcdef01", None, None, None).unwrap();
        store.record_job(base_job("python train.py --epochs=3")).unwrap();
        let session = store.get_active_session().unwrap().unwrap();

        let mut overrides = BTreeMap::new();
        overrides.insert("epochs".to_string(), "10".to_string());
        let resolved = resolve(&store, session.id, "@1", &overrides).unwrap();
        assert_eq!(resolved.command, "python train.py --epochs=10");
        assert_eq!(resolved.step_number, 1);
        assert!(!resolved.is_build);
    }

    #[test]
    fn unknown_step_number_is_an_error() {
        let store = Store::open_in_memory().unwrap();
        store.create_session("abcdef01", None, None, None).unwrap();
        let session = store.get_active_session().unwrap().unwrap();
        assert!(resolve(&store, session.id, "@9", &BTreeMap::new()).is_err());
    }

    #[test]
    fn malformed_reference_is_an_error() {
        let store = Store::open_in_memory().unwrap();
        store.create_session("abcdef01", None, None, None).unwrap();
        let session = store.get_active_session().unwrap().unwrap();
        assert!(resolve(&store, session.id, "not-a-ref", &BTreeMap::new()).is_err());
    }

    #[test]
    fn stale_upstream_reported_for_stale_consumer() {
        let store = Store::open_in_memory().unwrap();
        store.create_session("abcdef01", None, None, None).unwrap();
        store.put_artifact(&[hash("11112222")], 5, None, None, None).unwrap();

        let mut producer = base_job("gen data.csv");
        producer.timestamp = 1.0;
        producer.outputs = vec![edge("art1", "/data.csv", "hash1")];
        store.record_job(producer).unwrap();

        let mut consumer = base_job("python train.py");
        consumer.timestamp = 2.0;
        consumer.inputs = vec![edge("art1", "/data.csv", "hash1")];
        let (consumer_id, _) = store.record_job(consumer).unwrap();

        let mut new_producer = base_job("regen data.csv");
        new_producer.timestamp = 3.0;
        new_producer.outputs = vec![edge("art2", "/data.csv", "hash2")];
        store.record_job(new_producer).unwrap();

        let session = store.get_active_session().unwrap().unwrap();
        let consumer_step = store.get_steps(session.id).unwrap().into_iter().find(|j| j.id == consumer_id).unwrap().step_number.unwrap();

        let resolved = resolve(&store, session.id, &format!("@{consumer_step}"), &BTreeMap::new()).unwrap();
        assert_eq!(resolved.stale_upstream, vec![1]);
    }
}
