//! Strict schemas for tracer and sidecar output, and their loaders (§4.5).
//!
//! Grounded on the field list in spec.md §4.5 and
//! `original_source/roar/services/execution/tracer.py`'s `TracerResult`
//! shape; the sidecar schema mirrors `PythonInjectData` referenced from
//! `original_source/roar/core/interfaces/provenance.py`.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use roar_error::{ErrorCode, RoarError};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessRecord {
    pub pid: u32,
    pub parent_pid: Option<u32>,
    pub command: Vec<String>,
    #[serde(default)]
    pub env: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawTracerOutput {
    #[serde(default)]
    opened_files: Vec<String>,
    #[serde(default)]
    read_files: Vec<String>,
    #[serde(default)]
    written_files: Vec<String>,
    #[serde(default)]
    processes: Vec<ProcessRecord>,
    start_time: f64,
    end_time: f64,
}

/// Loaded, deduplicated tracer output.
#[derive(Debug, Clone)]
pub struct TracerOutput {
    pub opened_files: Vec<String>,
    pub read_files: Vec<String>,
    pub written_files: Vec<String>,
    pub processes: Vec<ProcessRecord>,
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
}

/// Remove duplicate entries, keeping the first occurrence's position.
fn dedupe_preserving_order(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(items.len());
    let mut result = Vec::with_capacity(items.len());
    for item in items {
        if seen.insert(item.clone()) {
            result.push(item);
        }
    }
    result
}

/// Parse and validate the tracer's JSON log, deduplicating file lists.
pub fn load_tracer_output(path: &Path) -> Result<TracerOutput, RoarError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        RoarError::new(ErrorCode::TracerCrashed, format!("read tracer log {}", path.display())).with_source(e)
    })?;
    let raw: RawTracerOutput = serde_json::from_str(&text).map_err(|e| {
        RoarError::new(ErrorCode::TracerCrashed, format!("parse tracer log {}", path.display())).with_source(e)
    })?;

    let duration = (raw.end_time - raw.start_time).max(0.0);
    Ok(TracerOutput {
        opened_files: dedupe_preserving_order(raw.opened_files),
        read_files: dedupe_preserving_order(raw.read_files),
        written_files: dedupe_preserving_order(raw.written_files),
        processes: raw.processes,
        start_time: raw.start_time,
        end_time: raw.end_time,
        duration,
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SidecarOutput {
    #[serde(default)]
    pub modules_files: Vec<String>,
    #[serde(default)]
    pub env_reads: BTreeMap<String, String>,
    #[serde(default)]
    pub sys_prefix: Option<String>,
    #[serde(default)]
    pub sys_base_prefix: Option<String>,
    #[serde(default)]
    pub roar_inject_dir: Option<String>,
    #[serde(default)]
    pub shared_libs: Vec<String>,
    #[serde(default)]
    pub used_packages: BTreeMap<String, String>,
    #[serde(default)]
    pub installed_packages: BTreeMap<String, String>,
}

/// Load the sidecar's JSON output. A missing file or unparseable content
/// is tolerated — the sidecar is best-effort and its absence never fails
/// a run — so this returns `None` rather than an error.
pub fn load_sidecar_output(path: &Path) -> Option<SidecarOutput> {
    let text = std::fs::read_to_string(path).ok()?;
    let mut output: SidecarOutput = serde_json::from_str(&text).ok()?;
    output.modules_files = dedupe_preserving_order(output.modules_files);
    output.shared_libs = dedupe_preserving_order(output.shared_libs);
    Some(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_tracer_output_and_computes_duration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracer.json");
        std::fs::write(
            &path,
            r#"{"opened_files":["/a","/a","/b"],"read_files":[],"written_files":["/out"],
               "processes":[{"pid":1,"parent_pid":null,"command":["python","x.py"]}],
               "start_time":10.0,"end_time":12.5}"#,
        )
        .unwrap();
        let output = load_tracer_output(&path).unwrap();
        assert_eq!(output.opened_files, vec!["/a".to_string(), "/b".to_string()]);
        assert_eq!(output.duration, 2.5);
        assert_eq!(output.processes.len(), 1);
    }

    #[test]
    fn duration_never_negative() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracer.json");
        std::fs::write(&path, r#"{"start_time":10.0,"end_time":5.0}"#).unwrap();
        let output = load_tracer_output(&path).unwrap();
        assert_eq!(output.duration, 0.0);
    }

    #[test]
    fn missing_tracer_log_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.json");
        assert!(load_tracer_output(&path).is_err());
    }

    #[test]
    fn missing_sidecar_output_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.json");
        assert!(load_sidecar_output(&path).is_none());
    }

    #[test]
    fn unparseable_sidecar_output_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inject.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(load_sidecar_output(&path).is_none());
    }

    #[test]
    fn sidecar_output_dedupes_module_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inject.json");
        std::fs::write(&path, r#"{"modules_files":["/m.py","/m.py"]}"#).unwrap();
        let output = load_sidecar_output(&path).unwrap();
        assert_eq!(output.modules_files, vec!["/m.py".to_string()]);
    }
}
