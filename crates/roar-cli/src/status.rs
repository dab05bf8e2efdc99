//! `roar status` (§6): a summary of the active session's DAG and tracked
//! artifacts.
//!
//! Grounded on `original_source/roar/cli/commands/status.py`.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use roar_core::JobType;
use roar_store::Store;

use crate::format::format_size;
use crate::paths::find_roar_dir;

pub fn cmd_status(json: bool) -> Result<i32> {
    let cwd = std::env::current_dir().context("get current directory")?;
    let paths = find_roar_dir(&cwd);
    if !paths.is_initialized() {
        anyhow::bail!("not a roar project (run `roar init` first)");
    }
    let store = Store::open(&paths.db_path()).context("open store")?;

    let Some(session) = store.get_active_session().context("load active session")? else {
        if json {
            println!("{}", serde_json::json!({"active_session": null}));
        } else {
            println!("No active session.");
        }
        return Ok(0);
    };

    let jobs = store.get_steps(session.id).context("load session jobs")?;

    let mut build_steps: BTreeSet<u32> = BTreeSet::new();
    let mut run_steps: BTreeSet<u32> = BTreeSet::new();
    for job in &jobs {
        let Some(step) = job.step_number else { continue };
        if job.job_type == Some(JobType::Build) {
            build_steps.insert(step);
        } else {
            run_steps.insert(step);
        }
    }

    let mut seen = BTreeSet::new();
    let mut present = Vec::new();
    let mut missing = Vec::new();
    for job in &jobs {
        let outputs = store.get_outputs(job.id).context("load job outputs")?;
        for output in outputs {
            if !seen.insert(output.artifact_id.clone()) {
                continue;
            }
            if Path::new(&output.path).exists() {
                present.push(output);
            } else {
                missing.push(output);
            }
        }
    }

    if json {
        let to_json = |edges: &[roar_core::JobIoEdge]| {
            edges
                .iter()
                .map(|e| serde_json::json!({"hash": e.hash, "size": e.size, "path": e.path}))
                .collect::<Vec<_>>()
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "build_steps": build_steps.len(),
                "run_steps": run_steps.len(),
                "present": to_json(&present),
                "missing": to_json(&missing),
            }))?
        );
        return Ok(0);
    }

    println!("DAG:");
    println!("  Build steps: {}", build_steps.len());
    println!("  Run steps:   {}", run_steps.len());

    if present.is_empty() && missing.is_empty() {
        return Ok(0);
    }

    let total = present.len() + missing.len();
    println!("\nTracked artifacts ({total} shown):");

    if !present.is_empty() {
        println!("\nPresent:");
        for art in &present {
            let hash_prefix: String = art.hash.as_deref().unwrap_or("").chars().take(12).collect();
            let size = format_size(art.size.unwrap_or(0));
            println!("  {hash_prefix:<20}{size:>6}  {}", art.path);
        }
    }

    if !missing.is_empty() {
        println!("\nMissing:");
        for art in &missing {
            let hash_prefix: String = art.hash.as_deref().unwrap_or("").chars().take(12).collect();
            let size = format_size(art.size.unwrap_or(0));
            println!("  {hash_prefix:<20}{size:>6}  {}", art.path);
        }
    }

    println!("\nTotal: {} present, {} missing", present.len(), missing.len());
    Ok(0)
}
