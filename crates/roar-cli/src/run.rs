//! `roar run` / `roar build` (§4.5, §4.9, §6): trace a command, assemble
//! its provenance record, hash its outputs, and persist everything to the
//! active session.
//!
//! Grounded on
//! `original_source/roar/cli/commands/run.py`'s `run_command` pipeline
//! (git preflight, tracer invocation, then provenance assembly) and
//! `original_source/roar/services/execution/dag_resolver.py` for the
//! `@N` replay path.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use roar_classify::{ClassifyResult, Classifier};
use roar_collect::{
    collect_runtime, dpkg_build_tool_packages, dpkg_packages_for_libs, pip_build_tool_packages, pip_packages,
    InterpreterInfo, OsInfo, PackageReport,
};
use roar_core::{ArtifactHash, HashAlgorithm, JobIoEdge, JobType};
use roar_dag::resolve;
use roar_provenance::{assemble, AssembleConfig};
use roar_provenance::{filter_files, FilteredFiles, FilterConfig};
use roar_provenance::{summarize, ProcessNode};
use roar_store::{NewJob, Store};
use roar_trace::{find_tracer, load_sidecar_output, load_tracer_output, run_traced};

use crate::paths::find_roar_dir;

#[allow(clippy::too_many_arguments)]
pub async fn cmd_run(
    job_type: JobType,
    reference: Option<String>,
    overrides: BTreeMap<String, String>,
    mut command: Vec<String>,
    quiet: bool,
    hash_algs: Vec<String>,
    step_name: Option<String>,
    json: bool,
) -> Result<i32> {
    let cwd = std::env::current_dir().context("get current directory")?;
    let paths = find_roar_dir(&cwd);
    if !paths.is_initialized() {
        bail!("not a roar project (run `roar init` first)");
    }

    let repo_root = roar_git::find_repo_root(&cwd).context("not a git repository")?;
    if !roar_git::is_clean(&repo_root)? {
        bail!("working tree is dirty; commit or stash before `roar {}`", job_type_name(job_type));
    }
    let git = roar_git::context(&cwd)?;

    let config = roar_config::load_config(Some(&paths.config_path()))
        .with_context(|| format!("load config at {}", paths.config_path().display()))?;

    let mut store = Store::open(&paths.db_path()).context("open lineage store")?;
    let session = match store.get_active_session()? {
        Some(s) => s,
        None => {
            let hash = new_session_hash();
            store.create_session(
                &hash,
                git.as_ref().map(|g| g.repo_root.to_string_lossy().into_owned()).as_deref(),
                git.as_ref().map(|g| g.commit.as_str()),
                git.as_ref().and_then(|g| g.branch.as_deref()),
            )?
        }
    };

    if let Some(reference) = reference.as_deref() {
        let resolved = resolve(&store, session.id, reference, &overrides)?;
        if !resolved.stale_upstream.is_empty() && !quiet {
            eprintln!(
                "warning: upstream step(s) {:?} are themselves stale",
                resolved.stale_upstream
            );
        }
        command = shell_words(&resolved.command);
    }

    if command.is_empty() {
        bail!("no command given");
    }

    let tracer_path = find_tracer(&repo_root).context("roar-tracer binary not found")?;
    let run_dir = std::env::temp_dir();
    let pid = std::process::id();
    let tracer_log = run_dir.join(format!("run_{pid}_tracer.json"));
    let inject_log = run_dir.join(format!("run_{pid}_inject.json"));

    let started_at = unix_now();
    let mut env = BTreeMap::new();
    env.insert("ROAR_INJECT_LOG".to_string(), inject_log.to_string_lossy().into_owned());

    let tracer_result = run_traced(&tracer_path, &tracer_log, &inject_log, &command, &env).await?;

    let algorithms: Vec<HashAlgorithm> = if hash_algs.is_empty() {
        config.hash.algorithms.iter().filter_map(|a| HashAlgorithm::parse(a)).collect()
    } else {
        hash_algs.iter().filter_map(|a| HashAlgorithm::parse(a)).collect()
    };

    let tracer_output = load_tracer_output(&tracer_log).ok();
    let sidecar_output = load_sidecar_output(&inject_log);

    let (mut inputs, mut outputs) = (Vec::new(), Vec::new());
    let mut classification = ClassifyResult::default();
    let mut packages = PackageReport::default();
    let mut processes_summary = Vec::new();

    if let Some(ref tracer) = tracer_output {
        let sys_prefix = sidecar_output.as_ref().and_then(|s| s.sys_prefix.as_deref()).map(PathBuf::from);
        let sys_base_prefix =
            sidecar_output.as_ref().and_then(|s| s.sys_base_prefix.as_deref()).map(PathBuf::from);
        let inject_dir = sidecar_output.as_ref().and_then(|s| s.roar_inject_dir.as_deref()).map(PathBuf::from);

        let filter_config = FilterConfig {
            ignore_system_reads: config.filters.system_reads,
            ignore_package_reads: config.filters.package_reads,
            ignore_torch_cache: config.filters.torch_cache,
            ignore_tmp_files: config.filters.temp_files,
            delete_tmp_writes: config.cleanup.strict,
        };
        let modules_files = sidecar_output.as_ref().map(|s| s.modules_files.clone()).unwrap_or_default();
        let filtered = filter_files(
            &tracer.opened_files,
            &tracer.read_files,
            &modules_files,
            &tracer.written_files,
            &filter_config,
            sys_prefix.as_deref(),
            sys_base_prefix.as_deref(),
        );

        // File-to-package attribution requires the interpreter's installed
        // package manifest (importlib.metadata's RECORD files); without a
        // live sidecar providing it, files only classify into repo/system/
        // unmanaged buckets, never a named package.
        let classifier = Classifier::new(
            repo_root.clone(),
            sys_prefix.clone(),
            sys_base_prefix.clone(),
            inject_dir,
            BTreeMap::new(),
            sidecar_output.as_ref().map(|s| s.installed_packages.clone()).unwrap_or_default(),
        );
        let mut all_paths: Vec<PathBuf> = filtered
            .opened_files
            .iter()
            .chain(filtered.read_files.iter())
            .chain(filtered.written_files.iter())
            .map(PathBuf::from)
            .collect();
        all_paths.sort();
        all_paths.dedup();
        classification = classifier.classify_all(&all_paths)?;

        let shared_libs: Vec<PathBuf> = sidecar_output
            .as_ref()
            .map(|s| s.shared_libs.iter().map(PathBuf::from).collect())
            .unwrap_or_default();
        let process_commands: Vec<Vec<String>> = tracer.processes.iter().map(|p| p.command.clone()).collect();
        packages = PackageReport {
            pip: pip_packages(
                &sidecar_output.as_ref().map(|s| s.used_packages.clone()).unwrap_or_default(),
                &classification.packages,
            ),
            dpkg: dpkg_packages_for_libs(&shared_libs, sys_prefix.as_deref()),
            build_dpkg: dpkg_build_tool_packages(&process_commands, sys_prefix.as_deref()),
            build_pip: pip_build_tool_packages(&process_commands, sys_prefix.as_deref()),
        };

        for path in &filtered.written_files {
            let result = roar_hash::hash(&PathBuf::from(path), &algorithms, &mut store);
            if !result.digests.is_empty() {
                let hashes: Vec<ArtifactHash> = roar_hash::to_artifact_hashes(&result);
                let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
                let artifact_id = store.put_artifact(&hashes, size, Some(path.as_str()), None, None)?;
                outputs.push(JobIoEdge {
                    artifact_id,
                    path: path.clone(),
                    hash: hashes.first().map(|h| h.digest.clone()),
                    size: Some(size),
                });
            }
        }
        for path in &filtered.read_files {
            if let Some(artifact) = store.get_by_path(path)? {
                let hash = artifact.primary_hash().map(|h| h.to_string());
                inputs.push(JobIoEdge {
                    artifact_id: artifact.id,
                    path: path.clone(),
                    hash,
                    size: Some(artifact.size),
                });
            }
        }

        let processes: Vec<ProcessNode> = tracer
            .processes
            .iter()
            .map(|p| ProcessNode { pid: p.pid, parent_pid: p.parent_pid, command: p.command.clone() })
            .collect();
        processes_summary = summarize(&processes);
    }

    let ended_at = unix_now();
    let os = detect_os();
    let interpreter = detect_interpreter(&command);
    let runtime = collect_runtime(
        command.clone(),
        os,
        interpreter,
        sidecar_output.as_ref().map(|s| s.env_reads.clone()).unwrap_or_default(),
        started_at,
        ended_at,
    );

    let record = assemble(
        &AssembleConfig { track_repo_files: config.analyzers.experiment_trackers },
        repo_root.clone(),
        git.clone(),
        &classification,
        packages,
        &tracer_output
            .as_ref()
            .map(|t| FilteredFiles {
                opened_files: t.opened_files.clone(),
                read_files: t.read_files.clone(),
                modules_files: Vec::new(),
                written_files: t.written_files.clone(),
                tmp_files_deleted: 0,
            })
            .unwrap_or_default(),
        processes_summary,
        runtime,
        Vec::new(),
    );

    let metadata = serde_json::to_string(&record).ok();
    let command_str = command.join(" ");
    let new_job = NewJob {
        command: command_str.clone(),
        script: command.first().cloned(),
        timestamp: started_at,
        git_repo: git.as_ref().map(|g| g.repo_root.to_string_lossy().into_owned()),
        git_commit: git.as_ref().map(|g| g.commit.clone()),
        git_branch: git.as_ref().and_then(|g| g.branch.clone()),
        duration_seconds: Some(ended_at - started_at),
        exit_code: tracer_result.exit_code,
        inputs,
        outputs,
        metadata,
        telemetry: None,
        job_type,
    };

    let (_job_id, job_uid) = store.record_job(new_job)?;

    if !quiet {
        if json {
            println!("{}", serde_json::json!({"job_uid": job_uid, "exit_code": tracer_result.exit_code}));
        } else {
            let label = step_name.as_deref().unwrap_or(&job_uid);
            println!("recorded {label} (exit {:?})", tracer_result.exit_code);
        }
    }

    if tracer_result.interrupted {
        return Ok(130);
    }
    Ok(tracer_result.exit_code.unwrap_or(0))
}

fn job_type_name(job_type: JobType) -> &'static str {
    match job_type {
        JobType::Run => "run",
        JobType::Build => "build",
    }
}

fn new_session_hash() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn unix_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs_f64()
}

/// Split a recorded command string back into argv, honoring single and
/// double quotes the way a shell would for the simple cases `roar`
/// records (no nested quoting, no `$()`).
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

fn detect_os() -> OsInfo {
    let uname = |flag: &str| -> String {
        std::process::Command::new("uname")
            .arg(flag)
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    };
    OsInfo { system: uname("-s"), release: uname("-r"), version: uname("-v"), machine: uname("-m") }
}

fn detect_interpreter(command: &[String]) -> InterpreterInfo {
    let is_python = command.first().map(|c| c.contains("python")).unwrap_or(false);
    if !is_python {
        return InterpreterInfo::default();
    }
    let version = std::process::Command::new(&command[0])
        .arg("--version")
        .output()
        .ok()
        .and_then(|o| String::from_utf8(o.stdout).ok().or_else(|| String::from_utf8(o.stderr).ok()))
        .map(|s| s.trim().to_string())
        .unwrap_or_default();
    InterpreterInfo { version, implementation: "cpython".to_string() }
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

    #[test]
    fn job_type_name_matches_cli_verbs() {
        assert_eq!(job_type_name(JobType::Run), "run");
        assert_eq!(job_type_name(JobType::Build), "build");
    }
}
