//! `roar lineage [options] <artifact>` (§6, hidden): artifact lineage as
//! reported by the LaaS server.
//!
//! Grounded on `original_source/roar/cli/commands/lineage.py`. Unlike the
//! Python original (a local backward DAG trace), this queries
//! `GlaasClient::get_artifact_lineage` directly — the server is the
//! authoritative source for cross-session lineage per spec.md's wire
//! protocol, and `roar-store` doesn't expose a cross-session trace.

use anyhow::{Context, Result};
use roar_core::HashAlgorithm;
use roar_http::GlaasClient;

use crate::paths::find_roar_dir;

fn resolve_to_hash(artifact: &str, cwd: &std::path::Path) -> Result<String> {
    let looks_like_path = artifact.contains('/') || std::path::Path::new(artifact).exists();
    if !looks_like_path {
        return Ok(artifact.to_string());
    }

    let path = if std::path::Path::new(artifact).is_absolute() { std::path::PathBuf::from(artifact) } else { cwd.join(artifact) };
    if !path.exists() {
        anyhow::bail!("file not found: {artifact}");
    }
    let mut cache = roar_hash::NoCache;
    let result = roar_hash::hash(&path, &[HashAlgorithm::Blake3], &mut cache);
    result
        .digests
        .get(&HashAlgorithm::Blake3)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("failed to hash {artifact}"))
}

pub fn cmd_lineage(artifact: &str, depth: u32) -> Result<i32> {
    let cwd = std::env::current_dir().context("get current directory")?;
    let paths = find_roar_dir(&cwd);
    let config = if paths.is_initialized() {
        roar_config::load_config(Some(&paths.config_path())).context("load config")?
    } else {
        roar_config::RoarConfig::default()
    };

    let hash = resolve_to_hash(artifact, &cwd)?;

    let client = GlaasClient::new(config.glaas, None);
    if !client.is_configured() {
        anyhow::bail!("GLaaS not configured. Run `roar config set glaas.url <url>` first.");
    }

    let rt = tokio::runtime::Runtime::new().context("start tokio runtime")?;
    let lineage = rt.block_on(client.get_artifact_lineage(&hash, depth)).context("fetch artifact lineage")?;

    println!("{}", serde_json::to_string_pretty(&lineage)?);
    Ok(0)
}
