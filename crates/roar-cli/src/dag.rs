//! `roar dag` (§6): render the active session's dependency graph.
//!
//! Grounded on `Store::get_steps`/`get_stale_steps` (roar-store) and
//! `roar-dag`'s `@N`/`@BN` reference syntax. This is a deliberately
//! simplified renderer next to the Python original's
//! `dag.py`/`dag_renderer.py` (which draws ASCII box-and-arrow diagrams
//! with edge tracing) — it prints one line per step in order, latest job
//! per step number, with the same `--stale-only`/`--show-artifacts`
//! filters.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use roar_core::{Job, JobType};
use roar_store::Store;

use crate::format::{format_size, step_label, truncate};
use crate::paths::find_roar_dir;

pub struct DagOptions {
    pub expanded: bool,
    pub stale_only: bool,
    pub show_artifacts: bool,
    pub json: bool,
}

/// One step number's latest job, keyed by `(is_build, step_number)`.
fn latest_per_step(jobs: Vec<Job>) -> BTreeMap<(bool, u32), Job> {
    let mut latest: BTreeMap<(bool, u32), Job> = BTreeMap::new();
    for job in jobs {
        let Some(step) = job.step_number else { continue };
        let key = (job.job_type == Some(JobType::Build), step);
        match latest.get(&key) {
            Some(existing) if existing.timestamp >= job.timestamp => {}
            _ => {
                latest.insert(key, job);
            }
        }
    }
    latest
}

pub fn cmd_dag(opts: DagOptions) -> Result<i32> {
    let cwd = std::env::current_dir().context("get current directory")?;
    let paths = find_roar_dir(&cwd);
    if !paths.is_initialized() {
        anyhow::bail!("not a roar project (run `roar init` first)");
    }
    let store = Store::open(&paths.db_path()).context("open store")?;

    let Some(session) = store.get_active_session().context("load active session")? else {
        if opts.json {
            println!("{}", serde_json::json!({"steps": []}));
        } else {
            println!("No active session.");
        }
        return Ok(0);
    };

    let all_jobs = store.get_steps(session.id).context("load session jobs")?;
    let stale = store.get_stale_steps(session.id).context("load stale steps")?;

    let steps: BTreeMap<(bool, u32), Job> = if opts.expanded {
        all_jobs.into_iter().filter_map(|j| j.step_number.map(|n| ((j.job_type == Some(JobType::Build), n), j))).collect()
    } else {
        latest_per_step(all_jobs)
    };

    let mut rows: Vec<_> = steps.into_iter().collect();
    rows.sort_by_key(|(key, _)| *key);

    if opts.stale_only {
        rows.retain(|((is_build, n), _)| !is_build && stale.contains(n));
    }

    if opts.json {
        let entries: Vec<_> = rows
            .iter()
            .map(|((is_build, n), job)| {
                let mut entry = serde_json::json!({
                    "step": step_label(*n, *is_build),
                    "job_uid": job.job_uid,
                    "command": job.command,
                    "exit_code": job.exit_code,
                    "stale": !is_build && stale.contains(n),
                });
                if opts.show_artifacts {
                    entry["inputs"] = serde_json::json!(job.inputs.iter().map(|e| &e.path).collect::<Vec<_>>());
                    entry["outputs"] = serde_json::json!(job.outputs.iter().map(|e| &e.path).collect::<Vec<_>>());
                }
                entry
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(0);
    }

    if rows.is_empty() {
        println!("No steps in the active session.");
        return Ok(0);
    }

    println!("DAG for session {}\n", session.hash);
    for ((is_build, n), job) in &rows {
        let label = step_label(*n, *is_build);
        let flag = if !is_build && stale.contains(n) { " [STALE]" } else { "" };
        println!("{label:<5}  {}{flag}", truncate(&job.command, 60));
        if opts.show_artifacts {
            for input in &job.inputs {
                println!("         <- {} ({})", input.path, format_size(input.size.unwrap_or(0)));
            }
            for output in &job.outputs {
                println!("         -> {} ({})", output.path, format_size(output.size.unwrap_or(0)));
            }
        }
    }

    Ok(0)
}
