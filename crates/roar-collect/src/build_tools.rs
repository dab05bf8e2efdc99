//! Build-tool collectors (§4.7): detect system (dpkg) and Python (pip)
//! build tools invoked anywhere in the traced process tree.
//!
//! Grounded on `original_source/roar/services/execution/provenance/{build_tool_collector,build_pip_collector}.py`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use roar_git::timeout::run_with_timeout;

const TOOL_TIMEOUT: Duration = Duration::from_secs(5);

const SYSTEM_BUILD_TOOLS: &[&str] = &[
    "cmake", "gcc", "g++", "cc", "c++", "make", "gmake", "ninja", "meson", "rustc", "cargo",
    "nvcc", "ar", "ld", "as", "ranlib", "strip", "pkg-config", "autoconf", "automake", "libtool",
    "nasm",
];

const PYTHON_BUILD_TOOLS: &[&str] =
    &["uv", "pip", "pip3", "setuptools", "maturin", "hatch", "flit", "poetry", "pdm", "pipx"];

/// One observed process's command basename (`argv[0]`'s file name).
fn command_basenames(processes: &[Vec<String>]) -> BTreeSet<String> {
    processes
        .iter()
        .filter_map(|argv| argv.first())
        .filter_map(|arg0| Path::new(arg0).file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .collect()
}

/// Locate an executable on `PATH`, mirroring `shutil.which`.
fn which(bin: &str) -> Option<PathBuf> {
    if bin.contains('/') {
        let path = PathBuf::from(bin);
        return path.exists().then_some(path);
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var).find_map(|dir| {
        let candidate = dir.join(bin);
        candidate.is_file().then_some(candidate)
    })
}

fn is_under_prefix(path: &Path, sys_prefix: Option<&Path>) -> bool {
    sys_prefix.is_some_and(|prefix| path.starts_with(prefix))
}

fn is_site_packages(path: &Path) -> bool {
    path.to_string_lossy().contains("site-packages")
}

/// Build tools resolved to OS packages (§4.7's dpkg build-tool variant):
/// restricted to [`SYSTEM_BUILD_TOOLS`] basenames seen in the process
/// tree, excluding anything resolved inside the interpreter prefix.
pub fn dpkg_build_tool_packages(
    processes: &[Vec<String>],
    sys_prefix: Option<&Path>,
) -> BTreeMap<String, Option<String>> {
    let seen = command_basenames(processes);
    let tool_names: Vec<&str> = SYSTEM_BUILD_TOOLS.iter().filter(|t| seen.contains(**t)).copied().collect();
    if tool_names.is_empty() {
        return BTreeMap::new();
    }

    let paths: Vec<PathBuf> = tool_names
        .into_iter()
        .filter_map(which)
        .filter(|p| !is_under_prefix(p, sys_prefix) && !is_site_packages(p))
        .collect();
    if paths.is_empty() {
        return BTreeMap::new();
    }

    let pkg_names = resolve_dpkg_owners(&paths);
    if pkg_names.is_empty() {
        return BTreeMap::new();
    }
    query_dpkg_versions(&pkg_names)
}

fn resolve_dpkg_owners(paths: &[PathBuf]) -> BTreeSet<String> {
    let mut cmd = Command::new("dpkg");
    cmd.arg("-S");
    for p in paths {
        cmd.arg(p);
    }
    let Ok(out) = run_with_timeout(cmd, TOOL_TIMEOUT) else {
        return BTreeSet::new();
    };
    let mut names = BTreeSet::new();
    for line in out.stdout.lines() {
        if let Some((pkg_part, _)) = line.split_once(": ") {
            let pkg_name = pkg_part.split(':').next().unwrap_or(pkg_part).trim();
            if !pkg_name.is_empty() {
                names.insert(pkg_name.to_string());
            }
        }
    }
    names
}

fn query_dpkg_versions(pkg_names: &BTreeSet<String>) -> BTreeMap<String, Option<String>> {
    let mut cmd = Command::new("dpkg-query");
    cmd.args(["-W", "-f", "${Package}\t${Version}\n"]);
    for name in pkg_names {
        cmd.arg(name);
    }
    let mut versions: BTreeMap<String, Option<String>> = BTreeMap::new();
    if let Ok(out) = run_with_timeout(cmd, TOOL_TIMEOUT) {
        if !out.timed_out && out.exit_code == Some(0) {
            for line in out.stdout.lines() {
                if let Some((pkg, version)) = line.split_once('\t') {
                    versions.insert(pkg.to_string(), Some(version.to_string()));
                }
            }
        }
    }
    versions
}

/// Python build tools resolved to pip packages (§4.7's build-pip variant):
/// restricted to [`PYTHON_BUILD_TOOLS`] basenames seen in the process
/// tree, restricted to tools resolved INSIDE the interpreter prefix or a
/// site-packages tree.
pub fn pip_build_tool_packages(processes: &[Vec<String>], sys_prefix: Option<&Path>) -> BTreeMap<String, String> {
    let seen = command_basenames(processes);
    let tool_names: Vec<&str> = PYTHON_BUILD_TOOLS.iter().filter(|t| seen.contains(**t)).copied().collect();
    if tool_names.is_empty() {
        return BTreeMap::new();
    }

    let mut to_query: BTreeSet<String> = BTreeSet::new();
    for tool in tool_names {
        let Some(path) = which(tool) else { continue };
        if is_under_prefix(&path, sys_prefix) || is_site_packages(&path) {
            to_query.insert(if tool == "pip3" { "pip".to_string() } else { tool.to_string() });
        }
    }

    let mut result = BTreeMap::new();
    for name in to_query {
        if let Some(version) = pip_package_version(&name) {
            result.insert(name, version);
        }
    }
    result
}

fn pip_package_version(package_name: &str) -> Option<String> {
    let script = format!("import importlib.metadata; print(importlib.metadata.version('{package_name}'))");
    let mut cmd = Command::new("python");
    cmd.args(["-c", &script]);
    if let Ok(out) = run_with_timeout(cmd, TOOL_TIMEOUT) {
        if !out.timed_out && out.exit_code == Some(0) {
            let version = out.stdout.trim();
            if !version.is_empty() {
                return Some(version.to_string());
            }
        }
    }

    let mut cmd = Command::new("pip");
    cmd.args(["show", package_name]);
    if let Ok(out) = run_with_timeout(cmd, TOOL_TIMEOUT) {
        if !out.timed_out && out.exit_code == Some(0) {
            for line in out.stdout.lines() {
                if let Some(version) = line.strip_prefix("Version:") {
                    return Some(version.trim().to_string());
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_basenames_strips_directories() {
        let processes = vec![vec!["/usr/bin/cmake".to_string(), "--build".to_string()]];
        let seen = command_basenames(&processes);
        assert!(seen.contains("cmake"));
    }

    #[test]
    fn no_build_tools_in_process_tree_returns_empty() {
        let processes = vec![vec!["python".to_string(), "train.py".to_string()]];
        assert!(dpkg_build_tool_packages(&processes, None).is_empty());
        assert!(pip_build_tool_packages(&processes, None).is_empty());
    }

    #[test]
    fn which_finds_real_binary_on_path() {
        assert!(which("sh").is_some());
    }

    #[test]
    fn which_returns_none_for_unknown_binary() {
        assert!(which("definitely-not-a-real-binary-xyz").is_none());
    }
}
