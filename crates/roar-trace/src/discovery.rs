//! Locate the `roar-tracer` binary (§4.5): three fixed search paths, then
//! `PATH`. Grounded on
//! `original_source/roar/services/execution/tracer.py`'s `find_tracer`.

use std::path::{Path, PathBuf};

/// Search, in order: a development build next to `package_root`
/// (`<package_root>/../tracer/target/release/roar-tracer`), an installed
/// copy (`<package_root>/bin/roar-tracer`), then `PATH`.
pub fn find_tracer(package_root: &Path) -> Option<PathBuf> {
    let candidates = [
        package_root.join("..").join("tracer").join("target").join("release").join("roar-tracer"),
        package_root.join("bin").join("roar-tracer"),
    ];

    for candidate in candidates {
        if candidate.exists() {
            return Some(candidate);
        }
    }

    which_on_path("roar-tracer")
}

fn which_on_path(bin: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var).find_map(|dir| {
        let candidate = dir.join(bin);
        candidate.is_file().then_some(candidate)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_dev_build_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let package_root = dir.path().join("roar");
        let tracer_dir = dir.path().join("tracer").join("target").join("release");
        std::fs::create_dir_all(&tracer_dir).unwrap();
        std::fs::create_dir_all(&package_root).unwrap();
        std::fs::write(tracer_dir.join("roar-tracer"), "").unwrap();

        let found = find_tracer(&package_root).unwrap();
        assert!(found.ends_with("roar-tracer"));
    }

    #[test]
    fn finds_installed_copy_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let package_root = dir.path().join("roar");
        let bin_dir = package_root.join("bin");
        std::fs::create_dir_all(&bin_dir).unwrap();
        std::fs::write(bin_dir.join("roar-tracer"), "").unwrap();

        let found = find_tracer(&package_root).unwrap();
        assert_eq!(found, bin_dir.join("roar-tracer"));
    }

    #[test]
    fn returns_none_when_not_found_anywhere() {
        let dir = tempfile::tempdir().unwrap();
        let package_root = dir.path().join("roar");
        std::fs::create_dir_all(&package_root).unwrap();
        assert!(find_tracer(&package_root).is_none());
    }
}
