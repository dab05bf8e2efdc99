//! Noise filtering, process-tree summarization, and provenance record
//! assembly (§4.9).

mod assembler;
mod noise_filter;
mod process_summary;

pub use assembler::{
    assemble, AssembleConfig, CodeSection, DataSection, ExecutablesSection, PackageReportView,
    ProvenanceRecord, RuntimeRecord, Timing,
};
pub use noise_filter::{filter_files, is_package_file, is_system_read, is_torch_cache, is_write_noise, FilterConfig, FilteredFiles};
pub use process_summary::{summarize, ProcessNode, ProcessSummary};
