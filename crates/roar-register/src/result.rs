//! Result type returned by [`crate::register_lineage`], grounded on
//! `original_source/roar/core/interfaces/registration.py`'s
//! `BatchRegistrationResult` dataclass.

/// Outcome of a full four-phase registration run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchRegistrationResult {
    /// Always `true`: the coordinator assumes the session was already
    /// registered by the caller before invoking phase 2 (§4.12).
    pub session_registered: bool,
    pub jobs_created: u32,
    pub jobs_failed: u32,
    pub artifacts_registered: u32,
    pub artifacts_failed: u32,
    pub links_created: u32,
    pub links_failed: u32,
    pub errors: Vec<String>,
}

impl BatchRegistrationResult {
    /// `true` iff nothing failed across any phase.
    pub fn is_success(&self) -> bool {
        self.jobs_failed == 0 && self.artifacts_failed == 0 && self.links_failed == 0
    }
}
