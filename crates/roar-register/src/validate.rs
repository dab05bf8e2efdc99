//! Pre-registration validation (§4.12), grounded on
//! `original_source/roar/core/validation.py`'s
//! `validate_job_registration`/`validate_artifact_registration`.
//!
//! roar never sends placeholder values like `"unknown"` to the LaaS
//! server, since that would corrupt lineage data.

use roar_core::Artifact;

/// `"unknown"`, `"Unknown"`, empty, or absent — forbidden wherever a
/// required string field is registered.
pub fn is_placeholder(value: Option<&str>) -> bool {
    match value {
        None => true,
        Some(v) => matches!(v, "unknown" | "Unknown" | ""),
    }
}

/// One job's required fields, validated independently of the
/// `roar_core::Job` representation so callers can validate derived
/// (git-context-defaulted) values rather than the raw recorded ones.
pub struct JobFields<'a> {
    pub command: Option<&'a str>,
    pub timestamp: f64,
    pub session_hash: &'a str,
    pub job_uid: Option<&'a str>,
    pub git_commit: Option<&'a str>,
    pub git_branch: Option<&'a str>,
    pub step_number: Option<u32>,
}

/// Validate one job's fields for phase-2 registration. Returns the list
/// of violated rules (empty iff valid).
pub fn validate_job(fields: &JobFields) -> Vec<String> {
    let mut errors = Vec::new();

    if is_placeholder(fields.command) {
        errors.push("command is required".to_string());
    }
    if fields.timestamp <= 0.0 {
        errors.push(format!("timestamp must be positive, got {}", fields.timestamp));
    }
    if is_placeholder(Some(fields.session_hash)) {
        errors.push("session_hash is required".to_string());
    }
    if is_placeholder(fields.job_uid) {
        errors.push("job_uid is required".to_string());
    }
    if is_placeholder(fields.git_commit) {
        errors.push("git_commit is required".to_string());
    }
    if is_placeholder(fields.git_branch) {
        errors.push("git_branch is required".to_string());
    }
    match fields.step_number {
        None => errors.push("step_number is required".to_string()),
        Some(n) if n < 1 => errors.push(format!("step_number must be >= 1, got {n}")),
        Some(_) => {}
    }

    errors
}

/// Validate an artifact for phase-3 registration: at least one hash,
/// non-negative size, and `source_type ∈ {s3, gs, https, None}`.
pub fn validate_artifact(artifact: &Artifact, session_hash: &str) -> Vec<String> {
    let mut errors = Vec::new();

    if artifact.hashes.is_empty() {
        errors.push("at least one hash is required".to_string());
    }
    // size is u64, so "non-negative" is guaranteed by the type; nothing
    // further to check there.
    if !artifact.has_valid_source_type() {
        errors.push(format!(
            "source_type must be 's3', 'gs', 'https', or None, got '{}'",
            artifact.source_type.as_deref().unwrap_or("")
        ));
    }
    if is_placeholder(Some(session_hash)) {
        errors.push("session_hash is required".to_string());
    }

    errors
}
