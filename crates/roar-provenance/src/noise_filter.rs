//! Noise filters applied to raw tracer file lists before assembly (§4.9).
//!
//! Grounded on
//! `original_source/roar/services/execution/provenance/file_filter.py`'s
//! `FileFilterService`.

use std::collections::HashSet;
use std::path::Path;

const SYSTEM_READ_PREFIXES: &[&str] =
    &["/sys/", "/etc/", "/sbin/", "/proc/", "/dev/", "/usr/", "/opt/", "/lib/", "/lib64/"];

const TORCH_CACHE_PATTERNS: &[&str] = &["/tmp/torchinductor_", "/tmp/torch_", "/tmp/triton"];

const WRITE_NOISE_PREFIXES: &[&str] =
    &["/dev/", "/proc/", "/sys/", "/dev/shm/", "/usr/local/", "/usr/lib/", "/usr/share/", "/opt/"];

/// Which filters are active, read from the `[filters]`/`[cleanup]` config
/// sections (§6).
#[derive(Debug, Clone)]
pub struct FilterConfig {
    pub ignore_system_reads: bool,
    pub ignore_package_reads: bool,
    pub ignore_torch_cache: bool,
    pub ignore_tmp_files: bool,
    /// `cleanup.delete_tmp_writes`: overrides `ignore_tmp_files` so `/tmp`
    /// writes are tracked and deleted instead of silently dropped.
    pub delete_tmp_writes: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            ignore_system_reads: true,
            ignore_package_reads: true,
            ignore_torch_cache: true,
            ignore_tmp_files: true,
            delete_tmp_writes: false,
        }
    }
}

impl FilterConfig {
    fn effective_ignore_tmp_files(&self) -> bool {
        if self.delete_tmp_writes {
            false
        } else {
            self.ignore_tmp_files
        }
    }
}

pub fn is_system_read(path: &str) -> bool {
    SYSTEM_READ_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

pub fn is_torch_cache(path: &str) -> bool {
    TORCH_CACHE_PATTERNS.iter().any(|pattern| path.starts_with(pattern))
}

pub fn is_package_file(path: &str, sys_prefix: Option<&Path>, sys_base_prefix: Option<&Path>) -> bool {
    if path.contains("site-packages") {
        return true;
    }
    if sys_prefix.is_some_and(|prefix| path_under(path, prefix)) {
        return true;
    }
    sys_base_prefix.is_some_and(|base| path_under(path, base) && !path.contains("site-packages"))
}

fn path_under(path: &str, prefix: &Path) -> bool {
    let prefix = prefix.to_string_lossy();
    !prefix.is_empty() && path.starts_with(prefix.as_ref())
}

pub fn is_write_noise(path: &str) -> bool {
    if WRITE_NOISE_PREFIXES.iter().any(|prefix| path.starts_with(prefix)) {
        return true;
    }
    if path.starts_with("/etc/") {
        return true;
    }
    if path.contains("/.roar/") || path.starts_with(".roar/") {
        return true;
    }
    path.ends_with(".pyc")
}

fn should_include_read(
    path: &str,
    config: &FilterConfig,
    sys_prefix: Option<&Path>,
    sys_base_prefix: Option<&Path>,
) -> bool {
    if config.ignore_system_reads && is_system_read(path) {
        return false;
    }
    if config.ignore_torch_cache && is_torch_cache(path) {
        return false;
    }
    if config.ignore_package_reads && is_package_file(path, sys_prefix, sys_base_prefix) {
        return false;
    }
    !(config.effective_ignore_tmp_files() && path.starts_with("/tmp/"))
}

/// Noise-filtered file lists, plus the count of `/tmp` writes deleted
/// under strict cleanup.
#[derive(Debug, Clone, Default)]
pub struct FilteredFiles {
    pub opened_files: Vec<String>,
    pub read_files: Vec<String>,
    pub modules_files: Vec<String>,
    pub written_files: Vec<String>,
    pub tmp_files_deleted: usize,
}

/// Apply the read and write noise filters, mirroring
/// `FileFilterService.filter_files`: reads are filtered independently of
/// writes, and `/tmp` writes not also read are deleted when
/// `delete_tmp_writes` is set.
pub fn filter_files(
    opened_files: &[String],
    read_files: &[String],
    modules_files: &[String],
    written_files: &[String],
    config: &FilterConfig,
    sys_prefix: Option<&Path>,
    sys_base_prefix: Option<&Path>,
) -> FilteredFiles {
    let include = |path: &str| should_include_read(path, config, sys_prefix, sys_base_prefix);

    let opened = opened_files.iter().filter(|p| include(p)).cloned().collect();
    let read = read_files.iter().filter(|p| include(p)).cloned().collect();
    let modules = modules_files.iter().filter(|p| include(p)).cloned().collect();

    let read_set: HashSet<&String> = read_files.iter().collect();
    let mut tmp_to_delete = Vec::new();
    let mut written = Vec::new();
    for path in written_files {
        if is_write_noise(path) {
            continue;
        }
        if config.ignore_torch_cache && is_torch_cache(path) {
            continue;
        }
        if path.starts_with("/tmp/") {
            if config.effective_ignore_tmp_files() {
                continue;
            }
            if !read_set.contains(path) && config.delete_tmp_writes {
                tmp_to_delete.push(path.clone());
            }
        }
        written.push(path.clone());
    }

    FilteredFiles {
        opened_files: opened,
        read_files: read,
        modules_files: modules,
        written_files: written,
        tmp_files_deleted: delete_tmp_files(&tmp_to_delete),
    }
}

fn delete_tmp_files(paths: &[String]) -> usize {
    paths.iter().filter(|path| std::fs::remove_file(path).is_ok()).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_read_prefixes_are_filtered() {
        let config = FilterConfig::default();
        let result =
            filter_files(&[], &["/usr/lib/libc.so".to_string()], &[], &[], &config, None, None);
        assert!(result.read_files.is_empty());
    }

    #[test]
    fn package_reads_are_filtered_under_sys_prefix() {
        let config = FilterConfig::default();
        let sys_prefix = Path::new("/home/u/.venv");
        let result = filter_files(
            &[],
            &["/home/u/.venv/lib/python3.12/site-packages/torch/__init__.py".to_string()],
            &[],
            &[],
            &config,
            Some(sys_prefix),
            None,
        );
        assert!(result.read_files.is_empty());
    }

    #[test]
    fn stdlib_read_filtered_under_base_prefix_outside_site_packages() {
        let config = FilterConfig::default();
        let base_prefix = Path::new("/usr/lib/python3.12");
        let result = filter_files(
            &[],
            &["/usr/lib/python3.12/json/__init__.py".to_string()],
            &[],
            &[],
            &config,
            None,
            Some(base_prefix),
        );
        assert!(result.read_files.is_empty());
    }

    #[test]
    fn torch_cache_reads_are_filtered_when_enabled() {
        let config = FilterConfig::default();
        let result = filter_files(
            &[],
            &["/tmp/torchinductor_root/cache.py".to_string()],
            &[],
            &[],
            &config,
            None,
            None,
        );
        assert!(result.read_files.is_empty());
    }

    #[test]
    fn tmp_reads_pass_when_ignore_tmp_files_disabled() {
        let config = FilterConfig { ignore_tmp_files: false, ..FilterConfig::default() };
        let result = filter_files(&[], &["/tmp/data.csv".to_string()], &[], &[], &config, None, None);
        assert_eq!(result.read_files, vec!["/tmp/data.csv".to_string()]);
    }

    #[test]
    fn non_noise_read_passes_through() {
        let config = FilterConfig::default();
        let result =
            filter_files(&[], &["/home/u/project/data.csv".to_string()], &[], &[], &config, None, None);
        assert_eq!(result.read_files, vec!["/home/u/project/data.csv".to_string()]);
    }

    #[test]
    fn write_noise_prefixes_are_filtered() {
        let config = FilterConfig::default();
        let result =
            filter_files(&[], &[], &[], &["/usr/local/cacert.pem".to_string()], &config, None, None);
        assert!(result.written_files.is_empty());
    }

    #[test]
    fn pyc_writes_are_filtered() {
        let config = FilterConfig::default();
        let result = filter_files(&[], &[], &[], &["/home/u/project/mod.pyc".to_string()], &config, None, None);
        assert!(result.written_files.is_empty());
    }

    #[test]
    fn roar_dir_writes_are_filtered() {
        let config = FilterConfig::default();
        let result =
            filter_files(&[], &[], &[], &["/home/u/project/.roar/tracer.json".to_string()], &config, None, None);
        assert!(result.written_files.is_empty());
    }

    #[test]
    fn tmp_writes_dropped_without_strict_cleanup() {
        let config = FilterConfig::default();
        let result = filter_files(&[], &[], &[], &["/tmp/out.bin".to_string()], &config, None, None);
        assert!(result.written_files.is_empty());
        assert_eq!(result.tmp_files_deleted, 0);
    }

    #[test]
    fn strict_cleanup_deletes_unread_tmp_writes() {
        let dir = tempfile::tempdir().unwrap();
        let tmp_file = dir.path().join("scratch.bin");
        std::fs::write(&tmp_file, b"x").unwrap();
        let path_str = tmp_file.to_string_lossy().to_string();

        let config =
            FilterConfig { ignore_tmp_files: true, delete_tmp_writes: true, ..FilterConfig::default() };
        let result = filter_files(&[], &[], &[], std::slice::from_ref(&path_str), &config, None, None);

        assert_eq!(result.written_files, vec![path_str]);
        assert_eq!(result.tmp_files_deleted, 1);
        assert!(!tmp_file.exists());
    }

    #[test]
    fn strict_cleanup_does_not_delete_files_also_read() {
        let dir = tempfile::tempdir().unwrap();
        let tmp_file = dir.path().join("also_read.bin");
        std::fs::write(&tmp_file, b"x").unwrap();
        let path_str = tmp_file.to_string_lossy().to_string();

        let config =
            FilterConfig { ignore_tmp_files: true, delete_tmp_writes: true, ..FilterConfig::default() };
        let result = filter_files(
            &[],
            std::slice::from_ref(&path_str),
            &[],
            std::slice::from_ref(&path_str),
            &config,
            None,
            None,
        );

        assert_eq!(result.tmp_files_deleted, 0);
        assert!(tmp_file.exists());
    }
}
