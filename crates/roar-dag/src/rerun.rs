//! Re-run grouping (§4.4): jobs sharing an I/O signature are re-runs of
//! one another; only the latest-timestamp member of each group is "on
//! the current path".
//!
//! Grounded on spec.md §4.4's re-run signature definition; the signature
//! itself is `Job::io_signature` (`roar-core`).

use std::collections::BTreeMap;

use roar_core::Job;

/// One group of jobs sharing an I/O signature, ordered by ascending
/// timestamp.
#[derive(Debug, Clone)]
pub struct RerunGroup {
    pub signature: String,
    pub job_ids: Vec<i64>,
    /// The latest-timestamp job in the group — the one on the current path.
    pub current_job_id: i64,
}

/// Group `jobs` by [`Job::io_signature`]. Groups are returned in
/// signature order; each group's `job_ids` is timestamp-ascending.
pub fn group_reruns(jobs: &[Job]) -> Vec<RerunGroup> {
    let mut groups: BTreeMap<String, Vec<&Job>> = BTreeMap::new();
    for job in jobs {
        groups.entry(job.io_signature()).or_default().push(job);
    }

    groups
        .into_iter()
        .map(|(signature, mut members)| {
            members.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
            let current_job_id = members.last().expect("group is never empty").id;
            RerunGroup { signature, job_ids: members.iter().map(|j| j.id).collect(), current_job_id }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use roar_core::JobIoEdge;

    fn edge(hash: &str) -> JobIoEdge {
        JobIoEdge { artifact_id: format!("art-{hash}"), path: format!("/data/{hash}"), hash: Some(hash.into()), size: Some(1) }
    }

    fn job(id: i64, timestamp: f64, inputs: Vec<JobIoEdge>, outputs: Vec<JobIoEdge>) -> Job {
        Job {
            id,
            job_uid: format!("uid{id}"),
            timestamp,
            command: "python train.py".into(),
            script: None,
            step_identity: None,
            session_id: Some(1),
            step_number: Some(id as u32),
            step_name: None,
            git_repo: None,
            git_commit: None,
            git_branch: None,
            duration_seconds: None,
            exit_code: Some(0),
            synced_at: None,
            status: None,
            job_type: None,
            metadata: None,
            telemetry: None,
            inputs,
            outputs,
        }
    }

    #[test]
    fn jobs_with_same_io_signature_are_grouped() {
        let a = job(1, 1.0, vec![edge("h1")], vec![edge("o1")]);
        let b = job(2, 2.0, vec![edge("h1")], vec![edge("o1")]);
        let groups = group_reruns(&[a, b]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].job_ids, vec![1, 2]);
        assert_eq!(groups[0].current_job_id, 2);
    }

    #[test]
    fn jobs_with_different_io_are_separate_groups() {
        let a = job(1, 1.0, vec![edge("h1")], vec![edge("o1")]);
        let b = job(2, 2.0, vec![edge("h2")], vec![edge("o2")]);
        let groups = group_reruns(&[a, b]);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn jobs_with_no_io_never_group_with_each_other() {
        let a = job(1, 1.0, vec![], vec![]);
        let b = job(2, 2.0, vec![], vec![]);
        let groups = group_reruns(&[a, b]);
        assert_eq!(groups.len(), 2);
    }
}
