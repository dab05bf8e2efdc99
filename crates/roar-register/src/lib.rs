//! Four-phase lineage registration coordinator (§4.12): per-job
//! creation, batched artifact registration, and per-job I/O linking
//! against the Graph Lineage-as-a-Service server.

mod batching;
mod client_trait;
mod coordinator;
mod result;
mod validate;

pub use client_trait::LineageClient;
pub use coordinator::register_lineage;
pub use result::BatchRegistrationResult;
pub use validate::{is_placeholder, validate_artifact, validate_job, JobFields};
