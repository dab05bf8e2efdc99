//! Locating `.roar/` relative to the current directory, grounded on
//! `original_source/roar/core/settings.py`'s `find_config_file` (walk
//! upward from cwd looking for `.roar/config.toml`) and
//! `original_source/roar/cli/context.py` (`.roar/roar.db` as a sibling of
//! `config.toml`).

use std::path::{Path, PathBuf};

/// Resolved locations of roar's on-disk state.
pub struct RoarPaths {
    pub roar_dir: PathBuf,
}

impl RoarPaths {
    pub fn config_path(&self) -> PathBuf {
        self.roar_dir.join("config.toml")
    }

    pub fn db_path(&self) -> PathBuf {
        self.roar_dir.join("roar.db")
    }

    pub fn is_initialized(&self) -> bool {
        self.roar_dir.is_dir()
    }
}

/// Walk upward from `start` looking for an existing `.roar/` directory;
/// falls back to `<start>/.roar` (uninitialized) if none is found.
pub fn find_roar_dir(start: &Path) -> RoarPaths {
    let mut current = Some(start);
    while let Some(dir) = current {
        let candidate = dir.join(".roar");
        if candidate.is_dir() {
            return RoarPaths { roar_dir: candidate };
        }
        current = dir.parent();
    }
    RoarPaths { roar_dir: start.join(".roar") }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_existing_roar_dir_in_a_parent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".roar")).unwrap();
        let nested = dir.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();

        let paths = find_roar_dir(&nested);
        assert!(paths.is_initialized());
        assert_eq!(paths.roar_dir, dir.path().join(".roar"));
    }

    #[test]
    fn falls_back_to_start_dir_when_uninitialized() {
        let dir = tempfile::tempdir().unwrap();
        let paths = find_roar_dir(dir.path());
        assert!(!paths.is_initialized());
        assert_eq!(paths.roar_dir, dir.path().join(".roar"));
    }
}
