//! Job recording and DAG-support queries (§4.3, §4.4).

use std::collections::{BTreeSet, HashMap, HashSet};

use roar_core::{Job, JobIoEdge, JobStatus, JobType};
use roar_error::{ErrorCode, RoarError};
use rusqlite::{params, OptionalExtension};

use crate::error::db_error;
use crate::Store;

/// Everything needed to persist one job in a single call, mirroring
/// `record_job` from spec.md §4.3.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub command: String,
    pub script: Option<String>,
    pub timestamp: f64,
    pub git_repo: Option<String>,
    pub git_commit: Option<String>,
    pub git_branch: Option<String>,
    pub duration_seconds: Option<f64>,
    pub exit_code: Option<i32>,
    pub inputs: Vec<JobIoEdge>,
    pub outputs: Vec<JobIoEdge>,
    pub metadata: Option<String>,
    pub telemetry: Option<String>,
    pub job_type: JobType,
}

impl Store {
    /// Record a job against the active session, assigning the next step
    /// number for `job_type` and linking I/O edges to their artifacts
    /// (creating artifacts on first sight is the caller's responsibility —
    /// `inputs`/`outputs` must already carry resolved `artifact_id`s).
    pub fn record_job(&self, new_job: NewJob) -> Result<(i64, String), RoarError> {
        let session = self
            .get_active_session()?
            .ok_or_else(|| RoarError::new(ErrorCode::NotInitialized, "no active session"))?;

        let is_build = matches!(new_job.job_type, JobType::Build);
        let step_number = session.next_step(is_build);
        let job_uid = crate::short_uid();
        let step_identity = compute_step_identity(&new_job.command, &new_job.inputs);

        self.conn
            .execute(
                "INSERT INTO jobs (job_uid, session_id, timestamp, command, script,
                                    step_identity, step_number, job_type, git_repo,
                                    git_commit, git_branch, duration_seconds, exit_code,
                                    status, metadata, telemetry)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                params![
                    job_uid,
                    session.id,
                    new_job.timestamp,
                    new_job.command,
                    new_job.script,
                    step_identity,
                    step_number,
                    if is_build { "build" } else { "run" },
                    new_job.git_repo,
                    new_job.git_commit,
                    new_job.git_branch,
                    new_job.duration_seconds,
                    new_job.exit_code,
                    job_status_as_db_str(JobStatus::from_exit_code(new_job.exit_code)),
                    new_job.metadata,
                    new_job.telemetry,
                ],
            )
            .map_err(|e| db_error("insert job", e))?;
        let job_id = self.conn.last_insert_rowid();

        for (direction, edges) in [("input", &new_job.inputs), ("output", &new_job.outputs)] {
            for (position, edge) in edges.iter().enumerate() {
                self.conn
                    .execute(
                        "INSERT INTO job_io (job_id, artifact_id, direction, path, hash, size, position)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                        params![
                            job_id,
                            edge.artifact_id,
                            direction,
                            edge.path,
                            edge.hash,
                            edge.size.map(|s| s as i64),
                            position as i64
                        ],
                    )
                    .map_err(|e| db_error("insert job io edge", e))?;
            }
        }

        self.bump_session_step(session.id, is_build, step_number)?;

        Ok((job_id, job_uid))
    }

    /// Look up the step at `n` within `session`, optionally scoped to
    /// `job_type`.
    pub fn get_step_by_number(
        &self,
        session_id: i64,
        n: u32,
        job_type: Option<JobType>,
    ) -> Result<Option<Job>, RoarError> {
        let job_type_str = job_type.map(|t| if matches!(t, JobType::Build) { "build" } else { "run" });
        let id: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM jobs WHERE session_id = ?1 AND step_number = ?2
                 AND (?3 IS NULL OR job_type = ?3)",
                params![session_id, n, job_type_str],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| db_error("lookup step by number", e))?;
        match id {
            Some(id) => self.load_job(id).map(Some),
            None => Ok(None),
        }
    }

    /// All steps recorded for `session`, ordered by `(job_type, step_number)`.
    pub fn get_steps(&self, session_id: i64) -> Result<Vec<Job>, RoarError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id FROM jobs WHERE session_id = ?1 ORDER BY job_type, step_number",
            )
            .map_err(|e| db_error("prepare get_steps", e))?;
        let ids: Vec<i64> = stmt
            .query_map(params![session_id], |row| row.get(0))
            .map_err(|e| db_error("query get_steps", e))?
            .collect::<rusqlite::Result<_>>()
            .map_err(|e| db_error("read get_steps row", e))?;
        ids.into_iter().map(|id| self.load_job(id)).collect()
    }

    /// Input edges of `job_id`, in recorded order.
    pub fn get_inputs(&self, job_id: i64) -> Result<Vec<JobIoEdge>, RoarError> {
        self.load_io_edges(job_id, "input")
    }

    /// Output edges of `job_id`, in recorded order.
    pub fn get_outputs(&self, job_id: i64) -> Result<Vec<JobIoEdge>, RoarError> {
        self.load_io_edges(job_id, "output")
    }

    /// Step numbers in `session` that are stale: some input they consumed
    /// was later superseded at the same path by a different hash (§4.4).
    pub fn get_stale_steps(&self, session_id: i64) -> Result<BTreeSet<u32>, RoarError> {
        let steps = self.get_steps(session_id)?;
        let mut directly_stale = BTreeSet::new();

        for step in &steps {
            let Some(step_number) = step.step_number else { continue };
            for input in &step.inputs {
                let Some(input_hash) = input.hash.as_deref() else { continue };
                let superseded: bool = self
                    .conn
                    .query_row(
                        "SELECT EXISTS (
                            SELECT 1 FROM job_io jio
                            JOIN jobs j ON j.id = jio.job_id
                            WHERE jio.direction = 'output'
                              AND jio.path = ?1
                              AND jio.hash IS NOT NULL
                              AND jio.hash != ?2
                              AND j.timestamp > ?3
                        )",
                        params![input.path, input_hash, step.timestamp],
                        |row| row.get(0),
                    )
                    .map_err(|e| db_error("check supersession", e))?;
                if superseded {
                    directly_stale.insert(step_number);
                    break;
                }
            }
        }

        propagate_downstream(&steps, directly_stale)
    }

    /// Transitive descendants of `step` within `session`: steps that
    /// consume an output of `step` or of any of its descendants.
    pub fn get_downstream_steps(&self, session_id: i64, step: u32) -> Result<Vec<u32>, RoarError> {
        let steps = self.get_steps(session_id)?;
        let graph = build_dependency_graph(&steps);
        let mut downstream = BTreeSet::new();
        let mut frontier = vec![step];
        let mut visited = HashSet::new();
        visited.insert(step);
        while let Some(current) = frontier.pop() {
            if let Some(children) = graph.children.get(&current) {
                for &child in children {
                    if visited.insert(child) {
                        downstream.insert(child);
                        frontier.push(child);
                    }
                }
            }
        }
        Ok(downstream.into_iter().collect())
    }

    /// Delete a job and its I/O edges.
    pub fn delete_job(&self, job_id: i64) -> Result<(), RoarError> {
        self.conn
            .execute("DELETE FROM jobs WHERE id = ?1", params![job_id])
            .map_err(|e| db_error("delete job", e))?;
        Ok(())
    }

    /// Delete any artifact in `ids` no longer referenced by a job's I/O
    /// edges or by a collection.
    pub fn cleanup_orphaned_artifacts(&self, ids: &[String]) -> Result<Vec<String>, RoarError> {
        let mut removed = Vec::new();
        for id in ids {
            let referenced: bool = self
                .conn
                .query_row(
                    "SELECT EXISTS (
                        SELECT 1 FROM job_io WHERE artifact_id = ?1
                        UNION
                        SELECT 1 FROM collection_members WHERE artifact_id = ?1
                    )",
                    params![id],
                    |row| row.get(0),
                )
                .map_err(|e| db_error("check artifact references", e))?;
            if !referenced {
                self.conn
                    .execute("DELETE FROM artifacts WHERE id = ?1", params![id])
                    .map_err(|e| db_error("delete orphaned artifact", e))?;
                removed.push(id.clone());
            }
        }
        Ok(removed)
    }

    fn load_io_edges(&self, job_id: i64, direction: &str) -> Result<Vec<JobIoEdge>, RoarError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT artifact_id, path, hash, size FROM job_io
                 WHERE job_id = ?1 AND direction = ?2 ORDER BY position",
            )
            .map_err(|e| db_error("prepare io edges", e))?;
        let rows = stmt
            .query_map(params![job_id, direction], |row| {
                Ok(JobIoEdge {
                    artifact_id: row.get(0)?,
                    path: row.get(1)?,
                    hash: row.get(2)?,
                    size: row.get::<_, Option<i64>>(3)?.map(|s| s as u64),
                })
            })
            .map_err(|e| db_error("query io edges", e))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| db_error("read io edge row", e))?);
        }
        Ok(out)
    }

    fn load_job(&self, id: i64) -> Result<Job, RoarError> {
        let mut job = self
            .conn
            .query_row(
                "SELECT id, job_uid, timestamp, command, script, step_identity, session_id,
                        step_number, step_name, git_repo, git_commit, git_branch,
                        duration_seconds, exit_code, synced_at, status, job_type, metadata, telemetry
                 FROM jobs WHERE id = ?1",
                params![id],
                |row| {
                    let job_type_str: String = row.get(16)?;
                    let status_str: Option<String> = row.get(15)?;
                    Ok(Job {
                        id: row.get(0)?,
                        job_uid: row.get(1)?,
                        timestamp: row.get(2)?,
                        command: row.get(3)?,
                        script: row.get(4)?,
                        step_identity: row.get(5)?,
                        session_id: row.get(6)?,
                        step_number: row.get::<_, Option<i64>>(7)?.map(|v| v as u32),
                        step_name: row.get(8)?,
                        git_repo: row.get(9)?,
                        git_commit: row.get(10)?,
                        git_branch: row.get(11)?,
                        duration_seconds: row.get(12)?,
                        exit_code: row.get(13)?,
                        synced_at: row.get(14)?,
                        status: status_str.and_then(|s| job_status_from_db_str(&s)),
                        job_type: Some(if job_type_str == "build" {
                            JobType::Build
                        } else {
                            JobType::Run
                        }),
                        metadata: row.get(17)?,
                        telemetry: row.get(18)?,
                        inputs: Vec::new(),
                        outputs: Vec::new(),
                    })
                },
            )
            .map_err(|e| db_error("load job", e))?;
        job.inputs = self.get_inputs(id)?;
        job.outputs = self.get_outputs(id)?;
        Ok(job)
    }
}

/// Dependency graph over step numbers within a session: an edge `a -> b`
/// means step `b` consumes an output path that step `a` produced.
struct DependencyGraph {
    children: HashMap<u32, Vec<u32>>,
}

fn build_dependency_graph(steps: &[Job]) -> DependencyGraph {
    let mut producers_by_path: HashMap<&str, Vec<u32>> = HashMap::new();
    for step in steps {
        let Some(n) = step.step_number else { continue };
        for output in &step.outputs {
            producers_by_path.entry(output.path.as_str()).or_default().push(n);
        }
    }

    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for step in steps {
        let Some(n) = step.step_number else { continue };
        for input in &step.inputs {
            if let Some(producers) = producers_by_path.get(input.path.as_str()) {
                for &producer in producers {
                    if producer != n {
                        children.entry(producer).or_default().push(n);
                    }
                }
            }
        }
    }
    DependencyGraph { children }
}

fn propagate_downstream(steps: &[Job], mut stale: BTreeSet<u32>) -> Result<BTreeSet<u32>, RoarError> {
    let graph = build_dependency_graph(steps);
    let mut frontier: Vec<u32> = stale.iter().copied().collect();
    while let Some(step) = frontier.pop() {
        if let Some(children) = graph.children.get(&step) {
            for &child in children {
                if stale.insert(child) {
                    frontier.push(child);
                }
            }
        }
    }
    Ok(stale)
}

fn compute_step_identity(command: &str, inputs: &[JobIoEdge]) -> String {
    let mut hashes: Vec<&str> = inputs.iter().filter_map(|e| e.hash.as_deref()).collect();
    hashes.sort_unstable();
    format!("{:x}", md5_like_digest(command, &hashes))
}

/// Cheap, deterministic content digest for `step_identity`; not a
/// cryptographic hash, just a stable fingerprint for grouping re-runs.
fn md5_like_digest(command: &str, hashes: &[&str]) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    command.hash(&mut hasher);
    hashes.hash(&mut hasher);
    hasher.finish()
}

fn job_status_as_db_str(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "pending",
        JobStatus::Running => "running",
        JobStatus::Completed => "completed",
        JobStatus::Failed => "failed",
    }
}

fn job_status_from_db_str(s: &str) -> Option<JobStatus> {
    match s {
        "pending" => Some(JobStatus::Pending),
        "running" => Some(JobStatus::Running),
        "completed" => Some(JobStatus::Completed),
        "failed" => Some(JobStatus::Failed),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(artifact_id: &str, path: &str, hash: &str) -> JobIoEdge {
        JobIoEdge {
            artifact_id: artifact_id.into(),
            path: path.into(),
            hash: Some(hash.into()),
            size: Some(1),
        }
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

    #[test]
    fn record_job_assigns_step_one_initially() {
        let store = Store::open_in_memory().unwrap();
        store.create_session("abcdef01", None, None, None).unwrap();
        let (job_id, uid) = store.record_job(base_job("echo a")).unwrap();
        let job = store.load_job(job_id).unwrap();
        assert_eq!(job.step_number, Some(1));
        assert_eq!(job.job_uid, uid);
    }

    #[test]
    fn record_job_separates_run_and_build_sequences() {
        let store = Store::open_in_memory().unwrap();
        store.create_session("abcdef01", None, None, None).unwrap();
        let mut run_job = base_job("python train.py");
        run_job.job_type = JobType::Run;
        let mut build_job = base_job("make build");
        build_job.job_type = JobType::Build;
        let (run_id, _) = store.record_job(run_job).unwrap();
        let (build_id, _) = store.record_job(build_job).unwrap();
        assert_eq!(store.load_job(run_id).unwrap().step_number, Some(1));
        assert_eq!(store.load_job(build_id).unwrap().step_number, Some(1));
    }

    #[test]
    fn stale_step_detected_when_input_superseded() {
        let store = Store::open_in_memory().unwrap();
        store.create_session("abcdef01", None, None, None).unwrap();

        let mut producer = base_job("gen data.csv");
        producer.timestamp = 1.0;
        producer.outputs = vec![edge("art1", "/data.csv", "hash1")];
        store.record_job(producer).unwrap();

        let mut consumer = base_job("train on data.csv");
        consumer.timestamp = 2.0;
        consumer.inputs = vec![edge("art1", "/data.csv", "hash1")];
        let (consumer_id, _) = store.record_job(consumer).unwrap();
        let consumer_step = store.load_job(consumer_id).unwrap().step_number.unwrap();

        let mut new_producer = base_job("regen data.csv");
        new_producer.timestamp = 3.0;
        new_producer.outputs = vec![edge("art2", "/data.csv", "hash2")];
        store.record_job(new_producer).unwrap();

        let session = store.get_active_session().unwrap().unwrap();
        let stale = store.get_stale_steps(session.id).unwrap();
        assert!(stale.contains(&consumer_step));
    }

    #[test]
    fn fresh_step_is_not_stale() {
        let store = Store::open_in_memory().unwrap();
        store.create_session("abcdef01", None, None, None).unwrap();
        let (job_id, _) = store.record_job(base_job("echo a")).unwrap();
        let job = store.load_job(job_id).unwrap();
        let session = store.get_active_session().unwrap().unwrap();
        let stale = store.get_stale_steps(session.id).unwrap();
        assert!(!stale.contains(&job.step_number.unwrap()));
    }

    #[test]
    fn delete_job_and_cleanup_orphans() {
        let store = Store::open_in_memory().unwrap();
        store.create_session("abcdef01", None, None, None).unwrap();
        let artifact_id = store
            .put_artifact(
                &[roar_core::ArtifactHash::new(roar_core::HashAlgorithm::Blake3, "11112222").unwrap()],
                5,
                None,
                None,
                None,
            )
            .unwrap();
        let mut job = base_job("echo a");
        job.outputs = vec![edge(&artifact_id, "/out.txt", "11112222")];
        let (job_id, _) = store.record_job(job).unwrap();
        store.delete_job(job_id).unwrap();
        let removed = store.cleanup_orphaned_artifacts(&[artifact_id.clone()]).unwrap();
        assert_eq!(removed, vec![artifact_id]);
    }
}
