//! pip and dpkg package collectors (§4.7).
//!
//! Grounded on `original_source/roar/services/execution/provenance/package_collector.py`,
//! redesigned per spec.md §4.7 to batch both dpkg lookups into a single
//! `dpkg -S`/`dpkg-query` call each instead of the original's per-library
//! `dpkg -S` loop.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use roar_error::{ErrorCode, RoarError};
use roar_git::timeout::run_with_timeout;

const DPKG_TIMEOUT: Duration = Duration::from_secs(5);

/// pip packages used by a run: the union of the sidecar's `used_packages`
/// with whatever the file classifier identified.
pub fn pip_packages(
    sidecar_used: &BTreeMap<String, String>,
    classifier_packages: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = sidecar_used.clone();
    for (name, version) in classifier_packages {
        merged.entry(name.clone()).or_insert_with(|| version.clone());
    }
    merged
}

/// Map every observed shared library not already attributed to pip and not
/// under the interpreter prefix to its owning dpkg package and version.
///
/// All subprocess calls degrade to an empty map on any failure; this never
/// fails the run (§4.7).
pub fn dpkg_packages_for_libs(
    shared_libs: &[PathBuf],
    sys_prefix: Option<&Path>,
) -> BTreeMap<String, Option<String>> {
    let candidates: Vec<&PathBuf> = shared_libs
        .iter()
        .filter(|lib| !is_pip_managed(lib, sys_prefix))
        .collect();

    if candidates.is_empty() {
        return BTreeMap::new();
    }

    let pkg_names = resolve_dpkg_owners(&candidates);
    if pkg_names.is_empty() {
        return BTreeMap::new();
    }

    query_dpkg_versions(&pkg_names)
}

fn is_pip_managed(lib: &Path, sys_prefix: Option<&Path>) -> bool {
    let s = lib.to_string_lossy();
    if s.contains("site-packages") {
        return true;
    }
    sys_prefix.is_some_and(|prefix| lib.starts_with(prefix))
}

/// Single batched `dpkg -S` call mapping every candidate path to its
/// owning package name.
fn resolve_dpkg_owners(paths: &[&PathBuf]) -> BTreeSet<String> {
    let mut cmd = Command::new("dpkg");
    cmd.arg("-S");
    for p in paths {
        cmd.arg(p);
    }
    let Ok(out) = run_with_timeout(cmd, DPKG_TIMEOUT) else {
        return BTreeSet::new();
    };
    if out.timed_out {
        return BTreeSet::new();
    }

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

/// Single batched `dpkg-query` call mapping every resolved package name to
/// its installed version.
fn query_dpkg_versions(pkg_names: &BTreeSet<String>) -> BTreeMap<String, Option<String>> {
    let mut cmd = Command::new("dpkg-query");
    cmd.args(["-W", "-f", "${Package}\t${Version}\n"]);
    for name in pkg_names {
        cmd.arg(name);
    }
    let result = run_with_timeout(cmd, DPKG_TIMEOUT);

    let mut versions: BTreeMap<String, Option<String>> = pkg_names.iter().map(|n| (n.clone(), None)).collect();
    if let Ok(out) = result {
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

/// Thin wrapper error for callers that want a `Result`-shaped interface
/// (e.g. a CLI subcommand that reports collection failures explicitly).
pub fn require_dpkg_available() -> Result<(), RoarError> {
    let mut cmd = Command::new("dpkg-query");
    cmd.arg("--version");
    if roar_git::timeout::run_with_timeout(cmd, DPKG_TIMEOUT)
        .map(|o| !o.timed_out && o.exit_code == Some(0))
        .unwrap_or(false)
    {
        Ok(())
    } else {
        Err(RoarError::new(ErrorCode::Internal, "dpkg-query is not available"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pip_packages_merges_preferring_sidecar_version() {
        let mut sidecar = BTreeMap::new();
        sidecar.insert("numpy".to_string(), "1.26.0".to_string());
        let mut classifier = BTreeMap::new();
        classifier.insert("numpy".to_string(), "unknown".to_string());
        classifier.insert("requests".to_string(), "2.32.0".to_string());

        let merged = pip_packages(&sidecar, &classifier);
        assert_eq!(merged.get("numpy"), Some(&"1.26.0".to_string()));
        assert_eq!(merged.get("requests"), Some(&"2.32.0".to_string()));
    }

    #[test]
    fn site_packages_lib_is_pip_managed() {
        assert!(is_pip_managed(Path::new("/venv/lib/python3.12/site-packages/numpy/x.so"), None));
    }

    #[test]
    fn sys_prefix_lib_is_pip_managed() {
        let prefix = Path::new("/opt/venv");
        assert!(is_pip_managed(Path::new("/opt/venv/lib/x.so"), Some(prefix)));
    }

    #[test]
    fn system_lib_is_not_pip_managed() {
        assert!(!is_pip_managed(Path::new("/usr/lib/x86_64-linux-gnu/libc.so.6"), None));
    }

    #[test]
    fn dpkg_packages_for_libs_empty_when_no_candidates() {
        let result = dpkg_packages_for_libs(&[], None);
        assert!(result.is_empty());
    }
}
