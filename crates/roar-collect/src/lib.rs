//! Package and runtime collectors for provenance records (§4.7, §4.8).

mod build_tools;
mod packages;
mod runtime;

pub use build_tools::{dpkg_build_tool_packages, pip_build_tool_packages};
pub use packages::{dpkg_packages_for_libs, pip_packages, require_dpkg_available};
pub use runtime::{collect as collect_runtime, CpuInfo, GpuInfo, InterpreterInfo, MemoryInfo, OsInfo, RuntimeInfo};

/// All package-manager results for one job, keyed by manager name
/// (`pip`, `dpkg`, `build_dpkg`, `build_pip`), matching the
/// `executables.packages` layout in §4.9's provenance record.
#[derive(Debug, Clone, Default)]
pub struct PackageReport {
    pub pip: std::collections::BTreeMap<String, String>,
    pub dpkg: std::collections::BTreeMap<String, Option<String>>,
    pub build_dpkg: std::collections::BTreeMap<String, Option<String>>,
    pub build_pip: std::collections::BTreeMap<String, String>,
}
