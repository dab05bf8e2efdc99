//! Tracer binary discovery, output ingestion, and signal-safe execution
//! (§4.5).

mod discovery;
mod runner;
mod schema;

pub use discovery::find_tracer;
pub use runner::{run_traced, TracerRunResult};
pub use schema::{load_sidecar_output, load_tracer_output, ProcessRecord, SidecarOutput, TracerOutput};
