//! `roar pop` (§6, hidden): remove the most recent job from the active
//! session and delete its unmanaged/repo output files from disk.
//!
//! Grounded on `original_source/roar/cli/commands/pop.py`.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use roar_classify::{Classification, Classifier};
use roar_store::Store;

use crate::paths::find_roar_dir;

fn confirm(prompt: &str, default: bool) -> bool {
    use std::io::Write as _;
    let suffix = if default { "[Y/n]" } else { "[y/N]" };
    print!("{prompt} {suffix} ");
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    if std::io::stdin().read_line(&mut line).is_err() {
        return default;
    }
    match line.trim().to_lowercase().as_str() {
        "" => default,
        "y" | "yes" => true,
        "n" | "no" => false,
        _ => default,
    }
}

pub fn cmd_pop(yes: bool, json: bool) -> Result<i32> {
    let cwd = std::env::current_dir().context("get current directory")?;
    let paths = find_roar_dir(&cwd);
    if !paths.is_initialized() {
        anyhow::bail!("not a roar project (run `roar init` first)");
    }
    let store = Store::open(&paths.db_path()).context("open store")?;

    let Some(session) = store.get_active_session().context("load active session")? else {
        println!("No active session.");
        return Ok(0);
    };

    let steps = store.get_steps(session.id).context("load session steps")?;
    if steps.is_empty() {
        println!("No jobs in the active session.");
        return Ok(0);
    }

    let latest = steps
        .iter()
        .max_by_key(|job| (job.step_number.unwrap_or(0), job.timestamp as i64))
        .expect("steps is non-empty");

    let step_number = latest.step_number;
    println!(
        "Step {}: {} (exit {})",
        step_number.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string()),
        latest.command,
        latest.exit_code.map(|c| c.to_string()).unwrap_or_else(|| "?".to_string())
    );

    if !yes && !confirm("Remove this job?", true) {
        println!("Aborted.");
        return Ok(1);
    }

    let outputs = store.get_outputs(latest.id).context("load job outputs")?;
    let artifact_ids: Vec<String> = outputs.iter().map(|o| o.artifact_id.clone()).collect();

    let repo_root = roar_git::find_repo_root(&cwd).unwrap_or_else(|| cwd.clone());
    let classifier = Classifier::new(repo_root, None, None, None, BTreeMap::new(), BTreeMap::new());

    let mut deleted = Vec::new();
    let mut skipped = Vec::new();
    for output in &outputs {
        let path = Path::new(&output.path);
        let classification = classifier.classify(path).unwrap_or(Classification::External);
        let safe = matches!(classification, Classification::Unmanaged | Classification::Repo);
        if safe {
            if path.exists() {
                match std::fs::remove_file(path) {
                    Ok(()) => deleted.push(output.path.clone()),
                    Err(_) => skipped.push(output.path.clone()),
                }
            } else {
                deleted.push(output.path.clone());
            }
        } else {
            skipped.push(output.path.clone());
        }
    }

    store.delete_job(latest.id).context("delete job")?;
    store.cleanup_orphaned_artifacts(&artifact_ids).context("cleanup orphaned artifacts")?;

    // `bump_session_step` only increases the counter and isn't exposed to
    // callers outside roar-store, so `current_step`/`current_build_step`
    // aren't rolled back here. It's an advisory "highest step seen" value,
    // not load-bearing for any invariant elsewhere.

    if json {
        println!(
            "{}",
            serde_json::json!({
                "job_id": latest.id,
                "step_number": step_number,
                "deleted_files": deleted,
                "skipped_files": skipped,
            })
        );
        return Ok(0);
    }

    println!(
        "Removed job {} (step {}).",
        latest.id,
        step_number.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string())
    );
    if !deleted.is_empty() {
        println!("Deleted {} output file(s).", deleted.len());
    }
    if !skipped.is_empty() {
        println!("Skipped {} protected file(s).", skipped.len());
    }

    Ok(0)
}
