//! Git repository helpers: commit/branch/remote queries for the provenance
//! record (§4.9) and push-access checks for `roar reproduce` (§4.9 design
//! notes, `original_source/roar/services/vcs/git_access.py`).

pub mod timeout;

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use roar_error::{ErrorCode, RoarError};
use serde::Serialize;
use timeout::run_with_timeout;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const SHORT_TIMEOUT: Duration = Duration::from_secs(2);

/// Snapshot of a repository's git state at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GitContext {
    /// Absolute repository root.
    pub repo_root: PathBuf,
    /// Current commit SHA.
    pub commit: String,
    /// Current branch name, or `None` in detached-HEAD state.
    pub branch: Option<String>,
    /// `origin`'s URL, if configured.
    pub remote_url: Option<String>,
    /// `true` iff the working tree has no uncommitted changes.
    pub clean: bool,
}

/// Outcome of a push-access probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessCheckResult {
    /// Whether push access appears to be available.
    pub has_access: bool,
    /// Human-readable reason when `has_access` is `false`.
    pub error: Option<String>,
}

fn git(repo_root: &Path, args: &[&str], timeout: Duration) -> Result<timeout::TimedOutput, RoarError> {
    let mut cmd = Command::new("git");
    cmd.args(args).current_dir(repo_root);
    run_with_timeout(cmd, timeout).map_err(|e| {
        RoarError::new(ErrorCode::Internal, format!("run git {args:?}: {e}")).with_source(e)
    })
}

/// Walk upward from `start` looking for a `.git` directory.
pub fn find_repo_root(start: &Path) -> Option<PathBuf> {
    let mut current = Some(start);
    while let Some(dir) = current {
        if dir.join(".git").exists() {
            return Some(dir.to_path_buf());
        }
        current = dir.parent();
    }
    None
}

/// `true` iff `repo_root` is a git repository with no uncommitted changes
/// (tracked or untracked).
pub fn is_clean(repo_root: &Path) -> Result<bool, RoarError> {
    let out = git(repo_root, &["status", "--porcelain"], DEFAULT_TIMEOUT)?;
    Ok(!out.timed_out && out.exit_code == Some(0) && out.stdout.trim().is_empty())
}

/// Current commit SHA (`git rev-parse HEAD`).
pub fn current_commit(repo_root: &Path) -> Result<Option<String>, RoarError> {
    let out = git(repo_root, &["rev-parse", "HEAD"], DEFAULT_TIMEOUT)?;
    Ok(successful_line(out))
}

/// Current branch name, or `None` for detached HEAD
/// (`git rev-parse --abbrev-ref HEAD` returning `HEAD` itself).
pub fn current_branch(repo_root: &Path) -> Result<Option<String>, RoarError> {
    let out = git(repo_root, &["rev-parse", "--abbrev-ref", "HEAD"], DEFAULT_TIMEOUT)?;
    match successful_line(out) {
        Some(branch) if branch != "HEAD" => Ok(Some(branch)),
        _ => Ok(None),
    }
}

/// `origin`'s fetch URL, if configured.
pub fn remote_url(repo_root: &Path) -> Result<Option<String>, RoarError> {
    let out = git(repo_root, &["remote", "get-url", "origin"], DEFAULT_TIMEOUT)?;
    Ok(successful_line(out))
}

fn successful_line(out: timeout::TimedOutput) -> Option<String> {
    if out.timed_out || out.exit_code != Some(0) {
        return None;
    }
    let line = out.stdout.trim();
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

/// `true` iff `path` (relative to `repo_root`) is tracked by git
/// (`git ls-files --error-unmatch`).
pub fn is_tracked(repo_root: &Path, relative_path: &Path) -> Result<bool, RoarError> {
    let rel = relative_path.to_string_lossy();
    let out = git(repo_root, &["ls-files", "--error-unmatch", &rel], SHORT_TIMEOUT)?;
    Ok(!out.timed_out && out.exit_code == Some(0))
}

/// Gather a full [`GitContext`] for the repository containing `start`, or
/// `None` if `start` isn't inside a git repository.
pub fn context(start: &Path) -> Result<Option<GitContext>, RoarError> {
    let Some(repo_root) = find_repo_root(start) else {
        return Ok(None);
    };
    let Some(commit) = current_commit(&repo_root)? else {
        return Ok(None);
    };
    Ok(Some(GitContext {
        branch: current_branch(&repo_root)?,
        remote_url: remote_url(&repo_root)?,
        clean: is_clean(&repo_root)?,
        repo_root,
        commit,
    }))
}

/// Check whether we appear to have push access to `git_url`, trying in
/// order: a dry-run push from `repo_root` (if given), an SSH connectivity
/// probe for `git@host:` URLs, then assuming access for `https://` URLs.
pub fn check_push_access(git_url: &str, repo_root: Option<&Path>) -> AccessCheckResult {
    if git_url.is_empty() {
        return AccessCheckResult {
            has_access: false,
            error: Some("No git URL".into()),
        };
    }

    if let Some(root) = repo_root {
        if let Some(result) = try_dry_run_push(root) {
            return result;
        }
    }

    if let Some(host) = ssh_host(git_url) {
        return try_ssh_connectivity(&host);
    }

    if git_url.starts_with("https://") {
        return AccessCheckResult { has_access: true, error: None };
    }

    AccessCheckResult { has_access: true, error: None }
}

fn try_dry_run_push(repo_root: &Path) -> Option<AccessCheckResult> {
    let out = git(repo_root, &["push", "--dry-run", "origin", "HEAD"], DEFAULT_TIMEOUT).ok()?;
    if out.timed_out {
        return Some(AccessCheckResult {
            has_access: false,
            error: Some("Git push check timed out".into()),
        });
    }
    if out.exit_code == Some(0) {
        return Some(AccessCheckResult { has_access: true, error: None });
    }
    let stderr = out.stderr.to_lowercase();
    let error = if stderr.contains("permission denied") {
        "Permission denied (no push access to repository)".to_string()
    } else if stderr.contains("could not read from remote") {
        "Cannot access remote repository (check SSH key/permissions)".to_string()
    } else if stderr.contains("authentication failed") {
        "Authentication failed".to_string()
    } else {
        out.stderr.trim().to_string()
    };
    Some(AccessCheckResult { has_access: false, error: Some(error) })
}

fn ssh_host(git_url: &str) -> Option<String> {
    let rest = git_url.strip_prefix("ssh://").unwrap_or(git_url);
    let rest = rest.strip_prefix("git@")?;
    let end = rest.find([':', '/'])?;
    Some(rest[..end].to_string())
}

fn try_ssh_connectivity(host: &str) -> AccessCheckResult {
    let mut cmd = Command::new("ssh");
    cmd.args(["-T", "-o", "BatchMode=yes", "-o", "ConnectTimeout=5", &format!("git@{host}")]);
    let out = match run_with_timeout(cmd, SHORT_TIMEOUT) {
        Ok(out) => out,
        Err(e) => {
            return AccessCheckResult { has_access: false, error: Some(e.to_string()) };
        }
    };
    if out.timed_out {
        return AccessCheckResult {
            has_access: false,
            error: Some(format!("SSH connection to {host} timed out")),
        };
    }
    if out.exit_code == Some(255) || out.stderr.contains("Permission denied") {
        return AccessCheckResult {
            has_access: false,
            error: Some(format!("SSH access denied to {host}")),
        };
    }
    AccessCheckResult { has_access: true, error: None }
}

/// `true` iff the current commit is reachable from some remote-tracking
/// branch, i.e. it has already been pushed.
pub fn check_branch_pushed(repo_root: &Path) -> Result<(bool, Option<String>), RoarError> {
    let out = git(repo_root, &["branch", "-r", "--contains", "HEAD"], DEFAULT_TIMEOUT)?;
    if out.timed_out || out.exit_code != Some(0) {
        return Ok((false, Some("Could not check branch status".into())));
    }
    if out.stdout.trim().is_empty() {
        return Ok((false, Some("Current commit hasn't been pushed to remote".into())));
    }
    Ok((true, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;

    fn init_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        StdCommand::new("git").args(["init", "-q"]).current_dir(dir.path()).status().unwrap();
        StdCommand::new("git")
            .args(["-c", "user.name=t", "-c", "user.email=t@t", "commit", "--allow-empty", "-qm", "init"])
            .current_dir(dir.path())
            .status()
            .unwrap();
        dir
    }

    #[test]
    fn find_repo_root_locates_git_dir() {
        let dir = init_repo();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        assert_eq!(find_repo_root(&nested), Some(dir.path().to_path_buf()));
    }

    #[test]
    fn find_repo_root_none_outside_repo() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(find_repo_root(dir.path()), None);
    }

    #[test]
    fn clean_repo_reports_clean() {
        let dir = init_repo();
        assert!(is_clean(dir.path()).unwrap());
    }

    #[test]
    fn dirty_repo_reports_not_clean() {
        let dir = init_repo();
        std::fs::write(dir.path().join("new.txt"), "x").unwrap();
        assert!(!is_clean(dir.path()).unwrap());
    }

    #[test]
    fn current_commit_returns_sha() {
        let dir = init_repo();
        let commit = current_commit(dir.path()).unwrap().unwrap();
        assert_eq!(commit.len(), 40);
    }

    #[test]
    fn ssh_host_parses_scp_like_url() {
        assert_eq!(ssh_host("git@github.com:org/repo.git"), Some("github.com".into()));
        assert_eq!(ssh_host("ssh://git@example.com/org/repo.git"), Some("example.com".into()));
        assert_eq!(ssh_host("https://github.com/org/repo.git"), None);
    }

    #[test]
    fn check_push_access_https_assumes_access() {
        let result = check_push_access("https://github.com/org/repo.git", None);
        assert!(result.has_access);
    }

    #[test]
    fn check_push_access_empty_url_fails() {
        let result = check_push_access("", None);
        assert!(!result.has_access);
    }

    #[test]
    fn is_tracked_true_for_committed_file() {
        let dir = init_repo();
        std::fs::write(dir.path().join("tracked.txt"), "x").unwrap();
        StdCommand::new("git").args(["add", "tracked.txt"]).current_dir(dir.path()).status().unwrap();
        StdCommand::new("git")
            .args(["-c", "user.name=t", "-c", "user.email=t@t", "commit", "-qm", "add"])
            .current_dir(dir.path())
            .status()
            .unwrap();
        assert!(is_tracked(dir.path(), Path::new("tracked.txt")).unwrap());
    }

    #[test]
    fn is_tracked_false_for_untracked_file() {
        let dir = init_repo();
        std::fs::write(dir.path().join("untracked.txt"), "x").unwrap();
        assert!(!is_tracked(dir.path(), Path::new("untracked.txt")).unwrap());
    }
}
