//! File classifier (§4.6): for every path observed by a trace, decide
//! whether it belongs to the repo, an installed package, the interpreter's
//! standard library, the OS, or is unmanaged/external/skippable.
//!
//! Grounded on `original_source/roar/filters/files.py`'s `FileClassifier`.
//! The package-file manifest (`importlib.metadata` there) has no Rust
//! equivalent, so it's supplied by the caller — built from the sidecar's
//! `installed_packages`/`used_packages` data in `roar-trace`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use roar_error::RoarError;

const SYSTEM_LIB_DIRS: &[&str] = &["/usr/lib", "/lib", "/usr/lib64", "/lib64", "/usr/local/lib"];
const SYSTEM_PREFIXES: &[&str] =
    &["/usr/lib", "/lib", "/usr/share", "/etc", "/usr/local/lib", "/opt"];

/// The outcome of classifying one path, per §4.6's seven-way split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Repo,
    /// `None` means "in a package directory, but which package is unknown".
    Package(Option<String>),
    Stdlib,
    System,
    Unmanaged,
    External,
    Skip,
}

impl Classification {
    /// Stable name used as a stats-histogram key.
    pub fn label(&self) -> &'static str {
        match self {
            Classification::Repo => "repo",
            Classification::Package(_) => "package",
            Classification::Stdlib => "stdlib",
            Classification::System => "system",
            Classification::Unmanaged => "unmanaged",
            Classification::External => "external",
            Classification::Skip => "skip",
        }
    }
}

/// Everything [`Classifier::classify`] needs: the repo root, the
/// interpreter's prefixes, the sidecar's inject directory, and a
/// file-to-package manifest built from the sidecar's package data.
pub struct Classifier {
    repo_root: PathBuf,
    sys_prefix: Option<PathBuf>,
    sys_base_prefix: Option<PathBuf>,
    roar_inject_dir: Option<PathBuf>,
    file_to_pkg: BTreeMap<PathBuf, String>,
    pkg_versions: BTreeMap<String, String>,
}

/// The four derived outputs of classifying a whole path list (§4.6).
#[derive(Debug, Clone, Default)]
pub struct ClassifyResult {
    pub repo_files: Vec<PathBuf>,
    pub packages: BTreeMap<String, String>,
    pub unmanaged: Vec<PathBuf>,
    pub stats: BTreeMap<&'static str, u32>,
}

impl Classifier {
    pub fn new(
        repo_root: impl Into<PathBuf>,
        sys_prefix: Option<PathBuf>,
        sys_base_prefix: Option<PathBuf>,
        roar_inject_dir: Option<PathBuf>,
        file_to_pkg: BTreeMap<PathBuf, String>,
        pkg_versions: BTreeMap<String, String>,
    ) -> Self {
        Self {
            repo_root: repo_root.into(),
            sys_prefix,
            sys_base_prefix,
            roar_inject_dir,
            file_to_pkg,
            pkg_versions,
        }
    }

    /// Classify one path, evaluating the ten rules of §4.6 in order and
    /// stopping at the first match.
    pub fn classify(&self, path: &Path) -> Result<Classification, RoarError> {
        // Rule 1: doesn't exist, or inside the sidecar's inject dir.
        if !path.exists() {
            return Ok(Classification::Skip);
        }
        if let Some(inject) = &self.roar_inject_dir {
            if path.starts_with(inject) {
                return Ok(Classification::Skip);
            }
        }

        // Rule 2: /dev, /proc.
        if path.starts_with("/dev") || path.starts_with("/proc") {
            return Ok(Classification::External);
        }

        // Rule 3: inside the repo, outside a venv/site-packages subtree.
        if let Ok(rel) = path.strip_prefix(&self.repo_root) {
            let in_venv_or_site_packages = path_contains(path, ".venv") || path_contains(path, "site-packages");
            if !in_venv_or_site_packages {
                return match roar_git::is_tracked(&self.repo_root, rel) {
                    Ok(true) => Ok(Classification::Repo),
                    Ok(false) => Ok(Classification::Unmanaged),
                    Err(_) => Ok(Classification::Unmanaged),
                };
            }
        }

        // Rule 4: exact match in the installed-file manifest.
        if let Some(pkg) = self.file_to_pkg.get(path) {
            return Ok(Classification::Package(Some(pkg.clone())));
        }

        // Rule 5: anywhere under a site-packages directory.
        if path_contains(path, "site-packages") {
            return Ok(Classification::Package(None));
        }

        // Rule 6: shared library under a system library directory.
        if is_system_shared_lib(path) {
            return Ok(Classification::System);
        }

        // Rule 7: under the interpreter's base prefix, not site-packages.
        if let Some(base) = &self.sys_base_prefix {
            if path.starts_with(base) && !path_contains(path, "site-packages") {
                return Ok(Classification::Stdlib);
            }
        }

        // Rule 8: under the interpreter's current prefix (a venv package).
        if let Some(prefix) = &self.sys_prefix {
            if path.starts_with(prefix) {
                return Ok(Classification::Package(None));
            }
        }

        // Rule 9: system prefixes, or a .so anywhere under them.
        if is_system_file(path) {
            return Ok(Classification::System);
        }

        // Rule 10.
        Ok(Classification::Unmanaged)
    }

    /// Classify a whole path list, deduplicating producer paths and
    /// building the four derived outputs.
    pub fn classify_all(&self, paths: &[PathBuf]) -> Result<ClassifyResult, RoarError> {
        let mut result = ClassifyResult::default();
        let mut used_packages: BTreeMap<String, ()> = BTreeMap::new();

        for path in paths {
            let classification = self.classify(path)?;
            *result.stats.entry(classification.label()).or_insert(0) += 1;
            match classification {
                Classification::Repo => result.repo_files.push(path.clone()),
                Classification::Package(Some(name)) => {
                    used_packages.insert(name, ());
                }
                Classification::Unmanaged => result.unmanaged.push(path.clone()),
                _ => {}
            }
        }

        result.repo_files.sort();
        result.repo_files.dedup();
        result.unmanaged.sort();
        result.unmanaged.dedup();
        result.packages = used_packages
            .into_keys()
            .map(|name| {
                let version = self.pkg_versions.get(&name).cloned().unwrap_or_else(|| "unknown".into());
                (name, version)
            })
            .collect();

        Ok(result)
    }
}

fn path_contains(path: &Path, needle: &str) -> bool {
    path.to_string_lossy().contains(needle)
}

fn is_system_shared_lib(path: &Path) -> bool {
    let s = path.to_string_lossy();
    if !s.contains(".so") {
        return false;
    }
    SYSTEM_LIB_DIRS.iter().any(|dir| path.starts_with(dir))
}

fn is_system_file(path: &Path) -> bool {
    if SYSTEM_PREFIXES.iter().any(|prefix| path.starts_with(prefix)) {
        return true;
    }
    let s = path.to_string_lossy();
    s.contains(".so") && (s.contains("/lib") || s.contains("/usr"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::process::Command;

    fn init_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        Command::new("git").args(["init", "-q"]).current_dir(dir.path()).status().unwrap();
        dir
    }

    fn classifier(repo_root: &Path) -> Classifier {
        Classifier::new(
            repo_root.to_path_buf(),
            Some(PathBuf::from("/opt/venv")),
            Some(PathBuf::from("/usr")),
            None,
            BTreeMap::new(),
            BTreeMap::new(),
        )
    }

    #[test]
    fn missing_file_is_skipped() {
        let dir = init_repo();
        let c = classifier(dir.path());
        let result = c.classify(&dir.path().join("nope.txt")).unwrap();
        assert_eq!(result, Classification::Skip);
    }

    #[test]
    fn dev_and_proc_are_external() {
        let dir = init_repo();
        let c = classifier(dir.path());
        assert_eq!(c.classify(Path::new("/dev/null")).unwrap(), Classification::External);
    }

    #[test]
    fn tracked_repo_file_classified_repo() {
        let dir = init_repo();
        let file = dir.path().join("main.py");
        fs::write(&file, "print(1)").unwrap();
        Command::new("git").args(["add", "main.py"]).current_dir(dir.path()).status().unwrap();
        let c = classifier(dir.path());
        assert_eq!(c.classify(&file).unwrap(), Classification::Repo);
    }

    #[test]
    fn untracked_repo_file_classified_unmanaged() {
        let dir = init_repo();
        let file = dir.path().join("scratch.txt");
        fs::write(&file, "x").unwrap();
        let c = classifier(dir.path());
        assert_eq!(c.classify(&file).unwrap(), Classification::Unmanaged);
    }

    #[test]
    fn exact_manifest_match_classified_package() {
        let dir = init_repo();
        let outside_dir = tempfile::tempdir().unwrap();
        let outside_file = outside_dir.path().join("leaf.py");
        fs::write(&outside_file, "x").unwrap();
        let mut file_to_pkg = BTreeMap::new();
        file_to_pkg.insert(outside_file.clone(), "numpy".to_string());
        let mut pkg_versions = BTreeMap::new();
        pkg_versions.insert("numpy".to_string(), "1.26.0".to_string());
        let c = Classifier::new(dir.path().to_path_buf(), None, None, None, file_to_pkg, pkg_versions);
        assert_eq!(c.classify(&outside_file).unwrap(), Classification::Package(Some("numpy".to_string())));
    }

    #[test]
    fn site_packages_path_classified_unknown_package() {
        let dir = init_repo();
        let outside = tempfile::tempdir().unwrap();
        let path = outside.path().join("site-packages").join("foo").join("__init__.py");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "x").unwrap();
        let c = classifier(dir.path());
        assert_eq!(c.classify(&path).unwrap(), Classification::Package(None));
    }

    #[test]
    fn stdlib_path_under_base_prefix() {
        let dir = init_repo();
        let base = tempfile::tempdir().unwrap();
        let path = base.path().join("lib").join("python3.12").join("os.py");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "x").unwrap();
        let c = Classifier::new(
            dir.path().to_path_buf(),
            None,
            Some(base.path().to_path_buf()),
            None,
            BTreeMap::new(),
            BTreeMap::new(),
        );
        assert_eq!(c.classify(&path).unwrap(), Classification::Stdlib);
    }

    #[test]
    fn classify_all_builds_stats_and_package_versions() {
        let dir = init_repo();
        let tracked = dir.path().join("app.py");
        fs::write(&tracked, "x").unwrap();
        Command::new("git").args(["add", "app.py"]).current_dir(dir.path()).status().unwrap();

        let outside = tempfile::tempdir().unwrap();
        let pkg_file = outside.path().join("leaf.py");
        fs::write(&pkg_file, "x").unwrap();
        let mut file_to_pkg = BTreeMap::new();
        file_to_pkg.insert(pkg_file.clone(), "requests".to_string());
        let mut pkg_versions = BTreeMap::new();
        pkg_versions.insert("requests".to_string(), "2.32.0".to_string());

        let c = Classifier::new(dir.path().to_path_buf(), None, None, None, file_to_pkg, pkg_versions);
        let result = c.classify_all(&[tracked.clone(), pkg_file.clone()]).unwrap();

        assert_eq!(result.repo_files, vec![tracked]);
        assert_eq!(result.packages.get("requests"), Some(&"2.32.0".to_string()));
        assert_eq!(result.stats.get("repo"), Some(&1));
        assert_eq!(result.stats.get("package"), Some(&1));
    }
}
