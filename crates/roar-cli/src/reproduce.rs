//! `roar reproduce [options] <hash_prefix>` (§6): preview or replay the
//! pipeline that produced an artifact, per the LaaS server's recorded DAG.
//!
//! Grounded on `original_source/roar/cli/commands/reproduce.py`. Scoped
//! down from the Python original: no git-clone/venv/package-install
//! bootstrap (no crate in this workspace offers that), so `--run` replays
//! the recorded step commands in the current checkout via the existing
//! tracer plumbing rather than provisioning a fresh environment first.

use anyhow::{bail, Context, Result};
use roar_trace::{find_tracer, run_traced};

use crate::paths::find_roar_dir;

pub fn cmd_reproduce(hash_prefix: &str, run: bool, out: Option<&str>, json: bool) -> Result<i32> {
    if hash_prefix.len() < 8 {
        bail!("hash prefix must be at least 8 characters for uniqueness");
    }

    let cwd = std::env::current_dir().context("get current directory")?;
    let paths = find_roar_dir(&cwd);
    let config = if paths.is_initialized() {
        roar_config::load_config(Some(&paths.config_path())).context("load config")?
    } else {
        roar_config::RoarConfig::default()
    };

    let client = roar_http::GlaasClient::new(config.glaas, None);
    if !client.is_configured() {
        bail!("GLaaS not configured. Run `roar config set glaas.url <url>` first.");
    }

    let rt = tokio::runtime::Runtime::new().context("start tokio runtime")?;
    let dag = rt.block_on(client.get_artifact_dag(hash_prefix)).context("fetch DAG lineage")?;

    if let Some(out_path) = out {
        std::fs::write(out_path, serde_json::to_string_pretty(&dag)?).with_context(|| format!("write {out_path}"))?;
        println!("DAG lineage response written to {out_path}");
        if !run {
            return Ok(0);
        }
    }

    let steps: Vec<serde_json::Value> = dag
        .get("build_steps")
        .and_then(|v| v.as_array())
        .into_iter()
        .flatten()
        .chain(dag.get("run_steps").and_then(|v| v.as_array()).into_iter().flatten())
        .cloned()
        .collect();

    if !run {
        if json {
            println!("{}", serde_json::to_string_pretty(&dag)?);
            return Ok(0);
        }
        println!("Artifact: {hash_prefix}");
        println!("Git repo: {}", dag.get("git_repo").and_then(|v| v.as_str()).unwrap_or("Not available"));
        println!("Git commit: {}", dag.get("git_commit").and_then(|v| v.as_str()).unwrap_or("Not available"));
        println!();
        println!("Steps ({}):", steps.len());
        for step in &steps {
            let command = step.get("command").and_then(|v| v.as_str()).unwrap_or("");
            println!("  - {command}");
        }
        println!();
        println!("To reproduce this artifact (replay the recorded steps in this checkout):");
        println!("  roar reproduce --run {hash_prefix}");
        return Ok(0);
    }

    let repo_root = roar_git::find_repo_root(&cwd).context("not a git repository")?;
    let tracer_path = find_tracer(&repo_root).context("roar-tracer binary not found")?;

    let mut steps_run = 0u32;
    let steps_total = steps.len() as u32;
    for (i, step) in steps.iter().enumerate() {
        let Some(command) = step.get("command").and_then(|v| v.as_str()) else { continue };
        let parts = shell_words(command);
        if parts.is_empty() {
            continue;
        }
        let run_dir = std::env::temp_dir();
        let tracer_log = run_dir.join(format!("reproduce_{}_{i}_tracer.json", std::process::id()));
        let inject_log = run_dir.join(format!("reproduce_{}_{i}_inject.json", std::process::id()));
        let env = std::collections::BTreeMap::new();
        let result = rt.block_on(run_traced(&tracer_path, &tracer_log, &inject_log, &parts, &env))?;
        if result.exit_code != Some(0) {
            bail!("step {i} failed: {command} (exit {:?})", result.exit_code);
        }
        steps_run += 1;
    }

    println!();
    println!("{}", "=".repeat(50));
    println!("Reproduction Complete");
    println!("{}", "=".repeat(50));
    println!("Steps run: {steps_run}/{steps_total}");

    Ok(0)
}

/// Split a recorded command string back into argv; mirrors `run.rs`'s
/// `shell_words`.
fn shell_words(command: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for c in command.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c.is_whitespace() => {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
            }
            None => current.push(c),
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_words_splits_on_whitespace() {
        assert_eq!(shell_words("python train.py --epochs=3"), vec!["python", "train.py", "--epochs=3"]);
    }

    #[test]
    fn shell_words_respects_quotes() {
        assert_eq!(shell_words("echo 'hello world'"), vec!["echo", "hello world"]);
    }
}
