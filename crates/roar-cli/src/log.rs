//! `roar log` (§6): the 20 most recent jobs in the active session.
//!
//! Grounded on `original_source/roar/cli/commands/log.py`.

use anyhow::{Context, Result};
use roar_core::{Job, JobType};
use roar_store::Store;

use crate::format::{format_duration, format_timestamp, truncate};
use crate::paths::find_roar_dir;

fn step_cell(job: &Job) -> String {
    match job.step_number {
        None => "-".to_string(),
        Some(n) => crate::format::step_label(n, job.job_type == Some(JobType::Build)),
    }
}

fn status_cell(exit_code: Option<i32>, use_color: bool) -> (String, bool) {
    match exit_code {
        None => ("?".to_string(), false),
        Some(0) => (if use_color { "\x1b[32mOK\x1b[0m".to_string() } else { "OK".to_string() }, use_color),
        Some(_) => (if use_color { "\x1b[31mFAIL\x1b[0m".to_string() } else { "FAIL".to_string() }, use_color),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_cell_uncolored() {
        assert_eq!(status_cell(Some(0), false), ("OK".to_string(), false));
        assert_eq!(status_cell(Some(1), false), ("FAIL".to_string(), false));
        assert_eq!(status_cell(None, false), ("?".to_string(), false));
    }

    #[test]
    fn status_cell_colored_only_for_known_exit_codes() {
        let (_, colored) = status_cell(Some(0), true);
        assert!(colored);
        let (_, colored) = status_cell(None, true);
        assert!(!colored);
    }
}

pub fn cmd_log(json: bool) -> Result<i32> {
    let cwd = std::env::current_dir().context("get current directory")?;
    let paths = find_roar_dir(&cwd);
    if !paths.is_initialized() {
        anyhow::bail!("not a roar project (run `roar init` first)");
    }
    let store = Store::open(&paths.db_path()).context("open store")?;

    let Some(session) = store.get_active_session().context("load active session")? else {
        if json {
            println!("{}", serde_json::json!({"jobs": []}));
        } else {
            println!("No active session.");
        }
        return Ok(0);
    };

    let mut jobs = store.get_steps(session.id).context("load session jobs")?;
    jobs.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    if jobs.len() > 20 {
        jobs = jobs.split_off(jobs.len() - 20);
    }

    if jobs.is_empty() {
        if json {
            println!("{}", serde_json::json!({"jobs": []}));
        } else {
            println!("No log entries found.");
        }
        return Ok(0);
    }

    if json {
        let entries: Vec<_> = jobs
            .iter()
            .map(|job| {
                serde_json::json!({
                    "job_uid": job.job_uid,
                    "step": step_cell(job),
                    "timestamp": job.timestamp,
                    "duration_seconds": job.duration_seconds,
                    "exit_code": job.exit_code,
                    "command": job.command,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(0);
    }

    let use_color = std::io::IsTerminal::is_terminal(&std::io::stdout());

    println!("\nJob Log ({} jobs)\n", jobs.len());
    println!(
        "{:<8}  {:<5}  {:<19}  {:>9}  {:<6}  COMMAND",
        "UID", "STEP", "TIMESTAMP", "DURATION", "STATUS"
    );
    println!("{}", "-".repeat(72));

    for job in &jobs {
        let uid: String = job.job_uid.chars().take(8).collect();
        let step = step_cell(job);
        let ts = format_timestamp(job.timestamp);
        let dur = job.duration_seconds.map(format_duration).unwrap_or_else(|| "-".to_string());
        let (status, colored) = status_cell(job.exit_code, use_color);
        let status_display = if colored { status } else { format!("{status:<6}") };
        let command = truncate(&job.command, 200);
        println!("{uid:<8}  {step:<5}  {ts:<19}  {dur:>9}  {status_display}  {command}");
    }

    Ok(0)
}
