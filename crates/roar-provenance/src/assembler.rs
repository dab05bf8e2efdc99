//! Assembles the final per-job provenance record (§4.9).
//!
//! Grounded on
//! `original_source/roar/services/execution/provenance/assembler.py`'s
//! `ProvenanceAssemblerService.assemble`.

use std::collections::BTreeSet;
use std::path::PathBuf;

use roar_classify::ClassifyResult;
use roar_collect::{CpuInfo, GpuInfo, InterpreterInfo, MemoryInfo, OsInfo, PackageReport, RuntimeInfo};
use roar_git::GitContext;
use serde::Serialize;

use crate::noise_filter::FilteredFiles;
use crate::process_summary::ProcessSummary;

const CODE_EXTENSIONS: &[&str] =
    &[".py", ".so", ".pyx", ".pxd", ".c", ".cpp", ".h", ".hpp", ".rs", ".go"];

/// `[output]` config toggles that shape the assembled record.
#[derive(Debug, Clone, Default)]
pub struct AssembleConfig {
    pub track_repo_files: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CodeSection {
    pub repo_root: PathBuf,
    pub git: Option<GitContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<PathBuf>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutablesSection {
    pub code: CodeSection,
    pub packages: PackageReportView,
    pub unmanaged_code: Vec<PathBuf>,
}

/// Serializable mirror of [`PackageReport`] (which intentionally carries
/// no `Serialize` derive of its own — it's an internal collector output,
/// not wire/record shape).
#[derive(Debug, Clone, Default, Serialize)]
pub struct PackageReportView {
    pub pip: std::collections::BTreeMap<String, String>,
    pub dpkg: std::collections::BTreeMap<String, Option<String>>,
    pub build_dpkg: std::collections::BTreeMap<String, Option<String>>,
    pub build_pip: std::collections::BTreeMap<String, String>,
}

impl From<PackageReport> for PackageReportView {
    fn from(report: PackageReport) -> Self {
        Self { pip: report.pip, dpkg: report.dpkg, build_dpkg: report.build_dpkg, build_pip: report.build_pip }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DataSection {
    pub read_files: Vec<String>,
    pub written_files: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuntimeRecord {
    pub hostname: String,
    pub timing: Timing,
    pub command: Vec<String>,
    pub os: OsInfo,
    pub python: InterpreterInfo,
    pub env_vars: std::collections::BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<std::collections::BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vm: Option<std::collections::BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cuda: Option<std::collections::BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu: Option<Vec<GpuInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<CpuInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Timing {
    pub start: f64,
    pub end: f64,
}

impl From<RuntimeInfo> for RuntimeRecord {
    fn from(runtime: RuntimeInfo) -> Self {
        Self {
            hostname: runtime.hostname,
            timing: Timing { start: runtime.start_time, end: runtime.end_time },
            command: runtime.command,
            os: runtime.os,
            python: runtime.interpreter,
            env_vars: runtime.env_vars,
            container: runtime.container,
            vm: runtime.vm,
            cuda: runtime.cuda,
            gpu: runtime.gpu,
            cpu: runtime.cpu,
            memory: runtime.memory,
        }
    }
}

/// The full record emitted for one job, matching §4.9's layout.
#[derive(Debug, Clone, Serialize)]
pub struct ProvenanceRecord {
    pub executables: ExecutablesSection,
    pub data: DataSection,
    pub processes: Vec<ProcessSummary>,
    pub runtime: RuntimeRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Vec<serde_json::Value>>,
}

fn is_code_file(path: &str) -> bool {
    CODE_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) || path.contains(".so.")
}

fn is_unmanaged_noise(path: &str) -> bool {
    if path.ends_with(".pyc") {
        return true;
    }
    if path.contains(".roar") {
        return true;
    }
    if path.contains(".triton") || path.contains("torchinductor") {
        return true;
    }
    !is_code_file(path)
}

fn is_read_noise(path: &str) -> bool {
    if path.ends_with(".pyc") {
        return true;
    }
    if path.contains(".triton") {
        return true;
    }
    if path.contains("roar/roar/inject") {
        return true;
    }
    path.starts_with("/lib/") || path.starts_with("/lib64/") || path.starts_with("/usr/lib/") || path.starts_with("/usr/lib64/")
}

/// Build the final [`ProvenanceRecord`] from every collected input.
/// `filtered` has already been through [`crate::noise_filter::filter_files`];
/// this stage applies the assembler's own second pass (unmanaged/read
/// de-noising, and removing repo code files from `read_files` since
/// they're already listed under `executables.code`).
#[allow(clippy::too_many_arguments)]
pub fn assemble(
    config: &AssembleConfig,
    repo_root: PathBuf,
    git: Option<GitContext>,
    classification: &ClassifyResult,
    packages: PackageReport,
    filtered: &FilteredFiles,
    processes: Vec<ProcessSummary>,
    runtime: RuntimeInfo,
    analysis: Vec<serde_json::Value>,
) -> ProvenanceRecord {
    let files = config.track_repo_files.then(|| classification.repo_files.clone());

    let unmanaged_code: Vec<PathBuf> = classification
        .unmanaged
        .iter()
        .filter(|p| !is_unmanaged_noise(&p.to_string_lossy()))
        .cloned()
        .collect();

    let repo_code_files: BTreeSet<String> = classification
        .repo_files
        .iter()
        .map(|p| p.to_string_lossy().to_string())
        .filter(|p| is_code_file(p))
        .collect();

    let mut read_files: BTreeSet<String> = filtered
        .read_files
        .iter()
        .filter(|p| !is_read_noise(p))
        .cloned()
        .collect();
    for repo_code in &repo_code_files {
        read_files.remove(repo_code);
    }

    let mut written_files: Vec<String> = filtered.written_files.clone();
    written_files.sort();

    ProvenanceRecord {
        executables: ExecutablesSection {
            code: CodeSection { repo_root, git, files },
            packages: packages.into(),
            unmanaged_code,
        },
        data: DataSection { read_files: read_files.into_iter().collect(), written_files },
        processes,
        runtime: runtime.into(),
        analysis: (!analysis.is_empty()).then_some(analysis),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn base_runtime() -> RuntimeInfo {
        RuntimeInfo {
            hostname: "host".into(),
            start_time: 0.0,
            end_time: 1.0,
            command: vec!["python".into(), "x.py".into()],
            os: OsInfo { system: "Linux".into(), release: "6.1".into(), version: "#1".into(), machine: "x86_64".into() },
            interpreter: InterpreterInfo { version: "3.12.0".into(), implementation: "CPython".into() },
            env_vars: BTreeMap::new(),
            container: None,
            vm: None,
            cuda: None,
            gpu: None,
            cpu: None,
            memory: None,
        }
    }

    #[test]
    fn repo_files_omitted_from_code_section_when_track_disabled() {
        let config = AssembleConfig { track_repo_files: false };
        let classification = ClassifyResult {
            repo_files: vec![PathBuf::from("/repo/train.py")],
            ..Default::default()
        };
        let record = assemble(
            &config,
            PathBuf::from("/repo"),
            None,
            &classification,
            PackageReport::default(),
            &FilteredFiles::default(),
            vec![],
            base_runtime(),
            vec![],
        );
        assert!(record.executables.code.files.is_none());
    }

    #[test]
    fn repo_files_included_in_code_section_when_track_enabled() {
        let config = AssembleConfig { track_repo_files: true };
        let classification = ClassifyResult {
            repo_files: vec![PathBuf::from("/repo/train.py")],
            ..Default::default()
        };
        let record = assemble(
            &config,
            PathBuf::from("/repo"),
            None,
            &classification,
            PackageReport::default(),
            &FilteredFiles::default(),
            vec![],
            base_runtime(),
            vec![],
        );
        assert_eq!(record.executables.code.files, Some(vec![PathBuf::from("/repo/train.py")]));
    }

    #[test]
    fn repo_code_files_are_removed_from_read_files() {
        let config = AssembleConfig::default();
        let classification = ClassifyResult {
            repo_files: vec![PathBuf::from("/repo/train.py")],
            ..Default::default()
        };
        let filtered = FilteredFiles {
            read_files: vec!["/repo/train.py".to_string(), "/repo/data.csv".to_string()],
            ..Default::default()
        };
        let record = assemble(
            &config,
            PathBuf::from("/repo"),
            None,
            &classification,
            PackageReport::default(),
            &filtered,
            vec![],
            base_runtime(),
            vec![],
        );
        assert_eq!(record.data.read_files, vec!["/repo/data.csv".to_string()]);
    }

    #[test]
    fn pyc_read_noise_is_removed() {
        let config = AssembleConfig::default();
        let classification = ClassifyResult::default();
        let filtered = FilteredFiles {
            read_files: vec!["/repo/__pycache__/m.pyc".to_string()],
            ..Default::default()
        };
        let record = assemble(
            &config,
            PathBuf::from("/repo"),
            None,
            &classification,
            PackageReport::default(),
            &filtered,
            vec![],
            base_runtime(),
            vec![],
        );
        assert!(record.data.read_files.is_empty());
    }

    #[test]
    fn unmanaged_data_files_are_dropped_not_just_noise_paths() {
        let config = AssembleConfig::default();
        let classification = ClassifyResult {
            unmanaged: vec![PathBuf::from("/opt/data/weights.bin"), PathBuf::from("/opt/tool/run.so")],
            ..Default::default()
        };
        let record = assemble(
            &config,
            PathBuf::from("/repo"),
            None,
            &classification,
            PackageReport::default(),
            &FilteredFiles::default(),
            vec![],
            base_runtime(),
            vec![],
        );
        assert_eq!(record.executables.unmanaged_code, vec![PathBuf::from("/opt/tool/run.so")]);
    }

    #[test]
    fn empty_analysis_is_omitted() {
        let config = AssembleConfig::default();
        let classification = ClassifyResult::default();
        let record = assemble(
            &config,
            PathBuf::from("/repo"),
            None,
            &classification,
            PackageReport::default(),
            &FilteredFiles::default(),
            vec![],
            base_runtime(),
            vec![],
        );
        assert!(record.analysis.is_none());
    }

    #[test]
    fn runtime_record_uses_nested_timing() {
        let record: RuntimeRecord = base_runtime().into();
        assert_eq!(record.timing.start, 0.0);
        assert_eq!(record.timing.end, 1.0);
    }

    #[test]
    fn written_files_are_sorted() {
        let config = AssembleConfig::default();
        let classification = ClassifyResult::default();
        let filtered = FilteredFiles {
            written_files: vec!["/repo/b.txt".to_string(), "/repo/a.txt".to_string()],
            ..Default::default()
        };
        let record = assemble(
            &config,
            PathBuf::from("/repo"),
            None,
            &classification,
            PackageReport::default(),
            &filtered,
            vec![],
            base_runtime(),
            vec![],
        );
        assert_eq!(record.data.written_files, vec!["/repo/a.txt".to_string(), "/repo/b.txt".to_string()]);
    }
}
