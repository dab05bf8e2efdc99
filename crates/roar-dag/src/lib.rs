//! DAG reference resolution, parameter overrides, and re-run grouping
//! (§4.4). Step numbering and staleness propagation themselves live in
//! `roar-store` (`Store::record_job`/`Store::get_stale_steps`); this
//! crate builds on top of that for replay (`@N`/`@BN`) and re-run
//! detection.

mod reference;
mod rerun;
mod resolve;

pub use reference::{apply_overrides, parse_reference, StepRef};
pub use rerun::{group_reruns, RerunGroup};
pub use resolve::{resolve, ResolvedStep};
