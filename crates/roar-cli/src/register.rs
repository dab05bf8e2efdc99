//! `roar register` (§6): submit the active session's lineage to the LaaS
//! server for a tracked artifact.
//!
//! Grounded on `original_source/roar/cli/commands/register.py` and
//! `services/registration/register_service.py`. Scoped down to the active
//! session rather than a full cross-session backward trace: `roar-store`
//! only exposes job lookups scoped by session (`get_steps`), not an
//! arbitrary job-by-id lookup, so the lineage collected here is "every job
//! in the active session plus the artifacts they touch" rather than the
//! Python original's full transitive closure over the whole database.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use roar_core::{Artifact, HashAlgorithm, Job};
use roar_dag::group_reruns;
use roar_http::GlaasClient;
use roar_register::register_lineage;
use roar_secrets::{SecretFilter, SecretFilterConfig};
use roar_store::Store;

use crate::paths::find_roar_dir;

const DEFAULT_WEB_URL: &str = "https://glaas.ai";

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

fn secret_filter_config(omit: &roar_config::OmitConfig) -> SecretFilterConfig {
    SecretFilterConfig {
        enabled: omit.enabled,
        explicit_values: omit.explicit_values.clone(),
        env_var_names: omit.env_var_names.clone(),
        custom_patterns: Vec::new(),
        allowlist_patterns: omit.allowlist_patterns.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_filter_config_carries_omit_fields_through() {
        let omit = roar_config::OmitConfig {
            enabled: true,
            explicit_values: vec!["sk-secret".to_string()],
            env_var_names: vec!["AWS_SECRET_ACCESS_KEY".to_string()],
            allowlist_patterns: vec!["example-key".to_string()],
        };
        let filter_config = secret_filter_config(&omit);
        assert!(filter_config.enabled);
        assert_eq!(filter_config.explicit_values, omit.explicit_values);
        assert_eq!(filter_config.env_var_names, omit.env_var_names);
        assert_eq!(filter_config.allowlist_patterns, omit.allowlist_patterns);
        assert!(filter_config.custom_patterns.is_empty());
    }
}

/// Jobs in the active session, deduplicated to one (the latest) per
/// re-run group, via [`group_reruns`].
fn collect_session_jobs(store: &Store, session_id: i64) -> Result<Vec<Job>> {
    let all = store.get_steps(session_id).context("load session jobs")?;
    let groups = group_reruns(&all);
    let keep: std::collections::BTreeSet<i64> = groups.iter().map(|g| g.current_job_id).collect();
    Ok(all.into_iter().filter(|j| keep.contains(&j.id)).collect())
}

/// Every artifact referenced as an input or output of `jobs`, deduplicated
/// by hash prefix, resolved back into full [`Artifact`] records.
fn collect_artifacts(store: &Store, jobs: &[Job], target: &Artifact) -> Result<Vec<Artifact>> {
    let mut by_id: BTreeMap<String, Artifact> = BTreeMap::new();
    by_id.insert(target.id.clone(), target.clone());
    for job in jobs {
        for edge in job.inputs.iter().chain(job.outputs.iter()) {
            if by_id.contains_key(&edge.artifact_id) {
                continue;
            }
            if let Some(hash) = &edge.hash {
                if let Some(artifact) = store.get_by_hash(hash, None).context("resolve lineage artifact")? {
                    by_id.insert(artifact.id.clone(), artifact);
                }
            }
        }
    }
    Ok(by_id.into_values().collect())
}

pub fn cmd_register(artifact_path: &str, dry_run: bool, yes: bool, json: bool) -> Result<i32> {
    let cwd = std::env::current_dir().context("get current directory")?;
    let paths = find_roar_dir(&cwd);
    if !paths.is_initialized() {
        anyhow::bail!("not a roar project (run `roar init` first)");
    }
    let config = roar_config::load_config(Some(&paths.config_path())).context("load config")?;
    let store = Store::open(&paths.db_path()).context("open store")?;

    let resolved = std::path::Path::new(artifact_path);
    let resolved = if resolved.is_absolute() { resolved.to_path_buf() } else { cwd.join(resolved) };
    if !resolved.exists() {
        anyhow::bail!("file not found: {artifact_path}");
    }

    let mut cache = roar_hash::NoCache;
    let hash_result = roar_hash::hash(&resolved, &[HashAlgorithm::Blake3], &mut cache);
    let Some(artifact_hash) = hash_result.digests.get(&HashAlgorithm::Blake3) else {
        anyhow::bail!("failed to compute hash for: {artifact_path}");
    };

    let Some(artifact) = store.get_by_hash(artifact_hash, Some(HashAlgorithm::Blake3)).context("look up artifact")?
    else {
        anyhow::bail!("artifact not tracked by roar: {artifact_path}\nRun `roar run` to track this artifact first.");
    };

    let Some(session) = store.get_active_session().context("load active session")? else {
        anyhow::bail!("no active session. Run `roar run` to create a session first.");
    };

    let git_context = roar_git::context(&cwd).context("read git context")?;

    let jobs = collect_session_jobs(&store, session.id)?;
    let artifacts = collect_artifacts(&store, &jobs, &artifact)?;

    let secrets = SecretFilter::from_config(&secret_filter_config(&config.registration.omit));
    let mut detected: Vec<String> = Vec::new();
    if let Some(ctx) = &git_context {
        if let Some(url) = &ctx.remote_url {
            detected.extend(secrets.detect_secrets(url, "git_url").iter().map(|d| d.pattern_id.clone()));
        }
    }
    for job in &jobs {
        detected.extend(secrets.detect_secrets(&job.command, "command").iter().map(|d| d.pattern_id.clone()));
    }
    detected.sort();
    detected.dedup();

    if !detected.is_empty() && !yes {
        println!();
        println!("Detected {} potential secret type(s) that will be redacted:", detected.len());
        for kind in &detected {
            println!("  - {kind}");
        }
        println!();
        if !confirm("Continue with registration? (secrets will be filtered)", false) {
            println!("Registration aborted.");
            return Ok(1);
        }
    }

    if dry_run {
        if json {
            println!(
                "{}",
                serde_json::json!({
                    "dry_run": true,
                    "session_hash": session.hash,
                    "jobs": jobs.len(),
                    "artifacts": artifacts.len(),
                    "secrets_detected": detected,
                })
            );
        } else {
            println!("Dry run - would register:");
            println!("  Session: {}...", &session.hash[..session.hash.len().min(12)]);
            println!("  Jobs: {}", jobs.len());
            println!("  Artifacts: {}", artifacts.len());
            if !detected.is_empty() {
                println!("  Secrets to redact: {} types", detected.len());
            }
            println!();
            println!("View on GLaaS:");
            println!("  Session:  {DEFAULT_WEB_URL}/dag/{}", session.hash);
            println!("  Artifact: {DEFAULT_WEB_URL}/artifact/{artifact_hash}");
        }
        return Ok(0);
    }

    let client = GlaasClient::new(config.glaas.clone(), None);
    if !client.is_configured() {
        anyhow::bail!("GLaaS not configured. Run `roar config set glaas.url <url>` first.");
    }

    let rt = tokio::runtime::Handle::try_current();
    let outcome = match rt {
        Ok(handle) => handle.block_on(do_register(&client, &secrets, &session.hash, &jobs, &artifacts, &config)),
        Err(_) => {
            let rt = tokio::runtime::Runtime::new().context("start tokio runtime")?;
            rt.block_on(do_register(&client, &secrets, &session.hash, &jobs, &artifacts, &config))
        }
    }?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "session_hash": session.hash,
                "artifact_hash": artifact_hash,
                "jobs_registered": outcome.jobs_created,
                "artifacts_registered": outcome.artifacts_registered,
                "links_created": outcome.links_created,
                "errors": outcome.errors,
            })
        );
        return Ok(if outcome.is_success() { 0 } else { 1 });
    }

    println!("Registered lineage for: {artifact_path}");
    println!("  Session: {}...", &session.hash[..session.hash.len().min(12)]);
    println!("  Jobs: {}", outcome.jobs_created);
    println!("  Artifacts: {}", outcome.artifacts_registered);
    println!("  Links: {}", outcome.links_created);

    if !outcome.errors.is_empty() {
        eprintln!();
        eprintln!("Registration completed with errors:");
        for error in &outcome.errors {
            eprintln!("  - {error}");
        }
    }

    println!();
    println!("To reproduce this artifact:");
    println!("  roar reproduce {artifact_hash}");
    println!();
    println!("View on GLaaS:");
    println!("  Session:  {DEFAULT_WEB_URL}/dag/{}", session.hash);
    println!("  Artifact: {DEFAULT_WEB_URL}/artifact/{artifact_hash}");

    Ok(if outcome.is_success() { 0 } else { 1 })
}

async fn do_register(
    client: &GlaasClient,
    secrets: &SecretFilter,
    session_hash: &str,
    jobs: &[Job],
    artifacts: &[Artifact],
    config: &roar_config::RoarConfig,
) -> Result<roar_register::BatchRegistrationResult> {
    client.health_check().await.context("GLaaS health check failed")?;

    let git_context = roar_git::context(&std::env::current_dir()?).context("read git context")?.unwrap_or(
        roar_git::GitContext {
            repo_root: std::env::current_dir()?,
            commit: String::new(),
            branch: None,
            remote_url: None,
            clean: true,
        },
    );

    client
        .register_session(
            session_hash,
            git_context.remote_url.as_deref().unwrap_or(""),
            &git_context.commit,
            git_context.branch.as_deref().unwrap_or(""),
        )
        .await
        .context("register session")?;

    Ok(register_lineage(
        client,
        secrets,
        session_hash,
        &git_context,
        jobs,
        artifacts,
        config.registration.batch_max_bytes as usize,
        config.registration.link_batch_max_count as usize,
    )
    .await)
}
