//! `roar show [REF]` (§6): session, job, or artifact detail.
//!
//! Grounded on `original_source/roar/cli/commands/show.py`'s `_classify_ref`
//! resolution order. Job lookups are scoped to the active session: unlike
//! the Python original's `jobs.get_by_uid` (a global lookup), `roar-store`
//! only exposes job queries scoped by session (`get_steps`), so `@N`/`@BN`
//! and job-uid references here only resolve within the current session.

use anyhow::{Context, Result};
use roar_core::{Job, JobType};
use roar_store::Store;

use crate::format::{format_duration, format_size, format_timestamp, step_label, truncate};
use crate::paths::find_roar_dir;

#[cfg_attr(test, derive(Debug, PartialEq))]
enum RefKind {
    JobStep,
    FilePath,
    JobUid,
    ArtifactHash,
    Unknown,
}

fn classify_ref(r: &str, cwd: &std::path::Path) -> RefKind {
    if r.starts_with('@') {
        return RefKind::JobStep;
    }
    if r.contains('/') || r.starts_with("./") || r.starts_with("../") || r.starts_with('~') {
        return RefKind::FilePath;
    }
    if cwd.join(r).exists() {
        return RefKind::FilePath;
    }
    let is_hex = !r.is_empty() && r.chars().all(|c| c.is_ascii_hexdigit());
    if is_hex && r.len() <= 8 {
        return RefKind::JobUid;
    }
    if is_hex && r.len() > 8 {
        return RefKind::ArtifactHash;
    }
    RefKind::Unknown
}

fn resolve_job_step(store: &Store, session_id: i64, r: &str) -> Result<Option<Job>> {
    let rest = &r[1..];
    let (job_type, num_str) = if let Some(stripped) = rest.strip_prefix('B') {
        (Some(JobType::Build), stripped)
    } else {
        (Some(JobType::Run), rest)
    };
    let Ok(step_number) = num_str.parse::<u32>() else { return Ok(None) };
    store.get_step_by_number(session_id, step_number, job_type).context("look up step")
}

fn find_job_by_uid_prefix(store: &Store, session_id: i64, prefix: &str) -> Result<Option<Job>> {
    let steps = store.get_steps(session_id).context("load session steps")?;
    Ok(steps.into_iter().find(|j| j.job_uid.starts_with(prefix)))
}

fn print_session(store: &Store, session: &roar_core::Session) -> Result<()> {
    println!("\nSession: {}", session.hash);
    println!("Started: {}", format_timestamp(session.started_at));
    if let Some(repo) = &session.git_repo {
        println!("Git: {repo}");
    }
    if let Some(commit) = &session.git_commit_start {
        println!("Commit: {commit}");
    }

    let jobs = store.get_steps(session.id).context("load session jobs")?;
    if jobs.is_empty() {
        println!("\nNo jobs in this session.");
        return Ok(());
    }

    println!("\nJobs ({}):\n", jobs.len());
    println!("{:<6}  {:<8}  {:<6}  COMMAND", "STEP", "JOB UID", "STATUS");
    println!("{}", "-".repeat(60));

    for job in &jobs {
        let step = job
            .step_number
            .map(|n| step_label(n, job.job_type == Some(JobType::Build)))
            .unwrap_or_else(|| "-".to_string());
        let uid: String = job.job_uid.chars().take(8).collect();
        let status = match job.exit_code {
            None => "?",
            Some(0) => "OK",
            Some(_) => "FAIL",
        };
        println!("{step:<6}  {uid:<8}  {status:<6}  {}", truncate(&job.command, 50));
    }
    Ok(())
}

fn print_job(store: &Store, job: &Job) -> Result<()> {
    println!("\nJob: {}", job.job_uid);
    let step_ref = job
        .step_number
        .map(|n| format!(" ({})", step_label(n, job.job_type == Some(JobType::Build))))
        .unwrap_or_default();
    println!("Step: {}{step_ref}", job.step_number.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string()));
    if let Some(name) = &job.step_name {
        println!("Name: {name}");
    }
    if let Some(identity) = &job.step_identity {
        println!("Identity: {identity}");
    }
    println!("Timestamp: {}", format_timestamp(job.timestamp));
    println!("Duration: {}", job.duration_seconds.map(format_duration).unwrap_or_else(|| "-".to_string()));
    let status = match job.exit_code {
        None => "Unknown".to_string(),
        Some(0) => "Success".to_string(),
        Some(c) => format!("Failed (exit {c})"),
    };
    println!("Status: {status}");
    println!("\nCommand: {}", job.command);

    if let Some(commit) = &job.git_commit {
        println!("\nGit commit: {commit}");
    }
    if let Some(branch) = &job.git_branch {
        println!("Git branch: {branch}");
    }

    if let Some(meta) = &job.metadata {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(meta) {
            print_metadata(&value);
        }
    }

    if let Some(telem) = &job.telemetry {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(telem) {
            if let Some(obj) = value.as_object() {
                if !obj.is_empty() {
                    println!("\nTelemetry:");
                    for (name, url) in obj {
                        match url.as_array() {
                            Some(urls) => {
                                for u in urls {
                                    println!("  {name}: {}", u.as_str().unwrap_or_default());
                                }
                            }
                            None => println!("  {name}: {}", url.as_str().unwrap_or_default()),
                        }
                    }
                }
            }
        }
    }

    let inputs = store.get_inputs(job.id).context("load job inputs")?;
    if !inputs.is_empty() {
        println!("\nInputs ({}):", inputs.len());
        for edge in &inputs {
            println!("  {}", edge.path);
            println!("    Artifact: {}", edge.artifact_id);
            println!("    Size: {}", format_size(edge.size.unwrap_or(0)));
            if let Some(hash) = &edge.hash {
                println!("    blake3: {hash}");
            }
        }
    }

    let outputs = store.get_outputs(job.id).context("load job outputs")?;
    if !outputs.is_empty() {
        println!("\nOutputs ({}):", outputs.len());
        for edge in &outputs {
            println!("  {}", edge.path);
            println!("    Artifact: {}", edge.artifact_id);
            println!("    Size: {}", format_size(edge.size.unwrap_or(0)));
            if let Some(hash) = &edge.hash {
                println!("    blake3: {hash}");
            }
        }
    }

    Ok(())
}

fn print_metadata(meta: &serde_json::Value) {
    println!("\nMetadata:");
    if let Some(cwd) = meta.pointer("/executables/code/repo_root").and_then(|v| v.as_str()) {
        println!("  Working dir: {cwd}");
    }
    let runtime = meta.get("runtime");
    if let Some(hostname) = runtime.and_then(|r| r.get("hostname")).and_then(|v| v.as_str()) {
        println!("  Hostname: {hostname}");
    }
    if let Some(os) = runtime.and_then(|r| r.get("os")) {
        let system = os.get("system").and_then(|v| v.as_str()).unwrap_or("");
        let release = os.get("release").and_then(|v| v.as_str()).unwrap_or("");
        println!("  OS: {system} {release}");
    }
    if let Some(python) = runtime.and_then(|r| r.get("python")).and_then(|p| p.get("version")).and_then(|v| v.as_str())
    {
        println!("  Python: {python}");
    }
    if let Some(gpus) = runtime.and_then(|r| r.get("gpu")).and_then(|v| v.as_array()) {
        for (i, gpu) in gpus.iter().enumerate() {
            let name = gpu.get("name").and_then(|v| v.as_str()).unwrap_or("unknown");
            let mem = gpu.get("memory_mb").and_then(|v| v.as_u64()).map(|m| m.to_string()).unwrap_or_else(|| "?".into());
            println!("  GPU {i}: {name} ({mem} MB)");
        }
    }
    if let Some(cpu) = runtime.and_then(|r| r.get("cpu")) {
        let model = cpu.get("model").and_then(|v| v.as_str()).unwrap_or("unknown");
        let count = cpu.get("count").and_then(|v| v.as_u64()).map(|c| c.to_string()).unwrap_or_else(|| "?".into());
        println!("  CPU: {model} ({count} cores)");
    }
    if let Some(env_vars) = runtime.and_then(|r| r.get("env_vars")).and_then(|v| v.as_object()) {
        if !env_vars.is_empty() {
            println!("\n  Environment Variables ({}):", env_vars.len());
            let mut names: Vec<_> = env_vars.keys().collect();
            names.sort();
            for name in names {
                let value = env_vars[name].as_str().unwrap_or_default();
                println!("    {name}={}", truncate(value, 60));
            }
        }
    }
    if let Some(packages) = meta.pointer("/executables/packages").and_then(|v| v.as_object()) {
        for (manager, pkgs) in packages {
            if let Some(pkgs) = pkgs.as_object() {
                if pkgs.is_empty() {
                    continue;
                }
                println!("\n  Packages ({manager}, {}):", pkgs.len());
                let mut names: Vec<_> = pkgs.keys().collect();
                names.sort();
                for name in names.iter().take(15) {
                    match pkgs[*name].as_str() {
                        Some(v) if !v.is_empty() => println!("    {name}=={v}"),
                        _ => println!("    {name}"),
                    }
                }
                if names.len() > 15 {
                    println!("    ... and {} more", names.len() - 15);
                }
            }
        }
    }
}

fn print_artifact(store: &Store, artifact: &roar_core::Artifact) -> Result<()> {
    println!("\nArtifact: {}", artifact.id);
    println!("Size: {}", format_size(artifact.size));
    println!("First seen: {}", format_timestamp(artifact.first_seen_at));
    if let Some(path) = &artifact.first_seen_path {
        println!("Original path: {path}");
    }

    if !artifact.hashes.is_empty() {
        println!("\nHashes:");
        for h in &artifact.hashes {
            println!("  {}: {}", h.algorithm.as_str(), h.digest);
        }
    }

    let locations = store.get_locations(&artifact.id).context("load artifact locations")?;
    if !locations.is_empty() {
        println!("\nLocations ({}):", locations.len());
        for loc in &locations {
            println!("  {loc}");
        }
    }

    let jobs = store.get_jobs(&artifact.id).context("load artifact jobs")?;
    if !jobs.produced_by.is_empty() {
        println!("\nProduced by ({} job(s)):", jobs.produced_by.len());
        for id in jobs.produced_by.iter().take(5) {
            println!("  [job {id}]");
        }
    }
    if !jobs.consumed_by.is_empty() {
        println!("\nConsumed by ({} job(s)):", jobs.consumed_by.len());
        for id in jobs.consumed_by.iter().take(5) {
            println!("  [job {id}]");
        }
    }

    Ok(())
}

pub fn cmd_show(reference: Option<&str>) -> Result<i32> {
    let cwd = std::env::current_dir().context("get current directory")?;
    let paths = find_roar_dir(&cwd);
    if !paths.is_initialized() {
        anyhow::bail!("not a roar project (run `roar init` first)");
    }
    let store = Store::open(&paths.db_path()).context("open store")?;

    let Some(r) = reference else {
        let Some(session) = store.get_active_session().context("load active session")? else {
            println!("No active session.");
            return Ok(0);
        };
        print_session(&store, &session)?;
        return Ok(0);
    };

    match classify_ref(r, &cwd) {
        RefKind::JobStep => {
            let Some(session) = store.get_active_session().context("load active session")? else {
                println!("No active session.");
                return Ok(0);
            };
            match resolve_job_step(&store, session.id, r)? {
                Some(job) => print_job(&store, &job)?,
                None => println!("Job not found: {r}"),
            }
        }
        RefKind::FilePath => {
            let expanded = shellexpand_home(r);
            let path = if std::path::Path::new(&expanded).is_absolute() { std::path::PathBuf::from(expanded) } else { cwd.join(expanded) };
            let normalized = path.to_string_lossy().to_string();
            match store.get_by_path(&normalized).context("look up artifact by path")? {
                Some(artifact) => print_artifact(&store, &artifact)?,
                None => println!("No artifact found for path: {r}"),
            }
        }
        RefKind::JobUid => {
            let Some(session) = store.get_active_session().context("load active session")? else {
                println!("No active session.");
                return Ok(0);
            };
            match find_job_by_uid_prefix(&store, session.id, r)? {
                Some(job) => print_job(&store, &job)?,
                None => println!("Job not found: {r}"),
            }
        }
        RefKind::ArtifactHash => {
            let job_hit = match store.get_active_session().context("load active session")? {
                Some(session) => find_job_by_uid_prefix(&store, session.id, r)?,
                None => None,
            };
            if let Some(job) = job_hit {
                print_job(&store, &job)?;
            } else {
                match store.get_by_hash(r, None) {
                    Ok(Some(artifact)) => print_artifact(&store, &artifact)?,
                    Ok(None) => println!("Not found: {r}"),
                    Err(e) => println!("{e}"),
                }
            }
        }
        RefKind::Unknown => println!("Unknown reference format: {r}"),
    }

    Ok(0)
}

fn shellexpand_home(s: &str) -> String {
    if let Some(rest) = s.strip_prefix('~') {
        if let Ok(home) = std::env::var("HOME") {
            return format!("{home}{rest}");
        }
    }
    s.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_ref_recognizes_job_step() {
        assert!(matches!(classify_ref("@3", std::path::Path::new("/tmp")), RefKind::JobStep));
        assert!(matches!(classify_ref("@B1", std::path::Path::new("/tmp")), RefKind::JobStep));
    }

    #[test]
    fn classify_ref_recognizes_file_path() {
        assert!(matches!(classify_ref("./train.py", std::path::Path::new("/tmp")), RefKind::FilePath));
        assert!(matches!(classify_ref("data/raw.csv", std::path::Path::new("/tmp")), RefKind::FilePath));
    }

    #[test]
    fn classify_ref_distinguishes_uid_from_hash_by_length() {
        assert!(matches!(classify_ref("abc12345", std::path::Path::new("/tmp")), RefKind::JobUid));
        assert!(matches!(
            classify_ref("abc1234567890123456789012345678", std::path::Path::new("/tmp")),
            RefKind::ArtifactHash
        ));
    }

    #[test]
    fn classify_ref_unknown_for_non_hex_non_path() {
        assert!(matches!(classify_ref("not_a_ref!", std::path::Path::new("/tmp")), RefKind::Unknown));
    }

    #[test]
    fn shellexpand_home_only_expands_leading_tilde() {
        std::env::set_var("HOME", "/home/tester");
        assert_eq!(shellexpand_home("~/project"), "/home/tester/project");
        assert_eq!(shellexpand_home("/absolute/path"), "/absolute/path");
    }
}
