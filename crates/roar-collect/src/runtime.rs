//! Runtime environment collector (§4.8).
//!
//! Grounded on `original_source/roar/services/execution/provenance/runtime_collector.py`.
//! Every optional block is a best-effort heuristic: failure to read a file
//! or run a command yields an absent block, never an error.

use std::collections::BTreeMap;
use std::process::Command;
use std::time::Duration;

use roar_git::timeout::run_with_timeout;
use serde::Serialize;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OsInfo {
    pub system: String,
    pub release: String,
    pub version: String,
    pub machine: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InterpreterInfo {
    pub version: String,
    pub implementation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GpuInfo {
    pub name: String,
    pub memory_mb: Option<u64>,
    pub compute_cap: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CpuInfo {
    pub count: Option<u32>,
    pub model: Option<String>,
    pub architecture: Option<String>,
    pub threads_per_core: Option<u32>,
    pub cores_per_socket: Option<u32>,
    pub sockets: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MemoryInfo {
    pub total_mb: Option<u64>,
    pub available_mb: Option<u64>,
}

/// Full runtime environment snapshot for one job.
#[derive(Debug, Clone, Default)]
pub struct RuntimeInfo {
    pub hostname: String,
    pub start_time: f64,
    pub end_time: f64,
    pub command: Vec<String>,
    pub os: OsInfo,
    pub interpreter: InterpreterInfo,
    pub env_vars: BTreeMap<String, String>,
    pub container: Option<BTreeMap<String, String>>,
    pub vm: Option<BTreeMap<String, String>>,
    pub cuda: Option<BTreeMap<String, String>>,
    pub gpu: Option<Vec<GpuInfo>>,
    pub cpu: Option<CpuInfo>,
    pub memory: Option<MemoryInfo>,
}

fn run_command(args: &[&str]) -> Option<String> {
    let mut cmd = Command::new(args[0]);
    cmd.args(&args[1..]);
    let out = run_with_timeout(cmd, PROBE_TIMEOUT).ok()?;
    (!out.timed_out && out.exit_code == Some(0)).then_some(out.stdout)
}

fn detect_cuda() -> Option<BTreeMap<String, String>> {
    let mut info = BTreeMap::new();

    if let Some(out) = run_command(&["nvidia-smi", "--query-gpu=driver_version", "--format=csv,noheader"]) {
        if let Some(line) = out.lines().next() {
            info.insert("driver_version".to_string(), line.trim().to_string());
        }
    }

    if let Some(out) = run_command(&["nvcc", "--version"]) {
        for line in out.lines() {
            if let Some((_, after)) = line.to_lowercase().split_once("release") {
                if let Some(version) = after.split(',').next() {
                    info.insert("cuda_version".to_string(), version.trim().to_string());
                }
                break;
            }
        }
    }

    if !info.contains_key("cuda_version") {
        if let Some(out) = run_command(&["nvidia-smi"]) {
            for line in out.lines() {
                if let Some((_, after)) = line.split_once("CUDA Version:") {
                    if let Some(version) = after.trim().split_whitespace().next() {
                        info.insert("cuda_version".to_string(), version.to_string());
                    }
                    break;
                }
            }
        }
    }

    if let Some(out) = run_command(&["ldconfig", "-p"]) {
        for line in out.lines() {
            if line.contains("libcudnn") && line.contains(".so.") {
                if let Some((_, after)) = line.split_once("libcudnn.so.") {
                    if let Some(version) = after.split_whitespace().next() {
                        info.insert("cudnn_version".to_string(), version.trim_end_matches(')').to_string());
                    }
                }
                break;
            }
        }
    }

    (!info.is_empty()).then_some(info)
}

fn detect_container() -> Option<BTreeMap<String, String>> {
    let mut info = BTreeMap::new();

    if std::path::Path::new("/.dockerenv").exists() {
        info.insert("type".to_string(), "docker".to_string());
    }

    if let Ok(cgroup) = std::fs::read_to_string("/proc/self/cgroup") {
        for line in cgroup.lines() {
            if line.contains("docker") || line.contains("containerd") {
                info.insert("type".to_string(), "docker".to_string());
                if let Some(id) = line.rsplit('/').next() {
                    if id.len() >= 12 {
                        info.insert("container_id".to_string(), id[..12].to_string());
                    }
                }
                break;
            } else if line.contains("kubepods") {
                info.insert("type".to_string(), "kubernetes".to_string());
                break;
            }
        }
    }

    if std::env::var_os("KUBERNETES_SERVICE_HOST").is_some() {
        info.insert("type".to_string(), "kubernetes".to_string());
    } else if std::env::var("container").ok().as_deref() == Some("podman") {
        info.insert("type".to_string(), "podman".to_string());
    }

    (!info.is_empty()).then_some(info)
}

fn detect_vm() -> Option<BTreeMap<String, String>> {
    let mut info = BTreeMap::new();

    if let Some(out) = run_command(&["systemd-detect-virt"]) {
        let virt = out.trim();
        if !virt.is_empty() && virt != "none" {
            info.insert("hypervisor".to_string(), virt.to_string());
        }
    }

    if let Ok(hypervisor) = std::fs::read_to_string("/sys/hypervisor/type") {
        info.insert("hypervisor".to_string(), hypervisor.trim().to_string());
    }

    if let Ok(vendor) = std::fs::read_to_string("/sys/class/dmi/id/sys_vendor") {
        let vendor = vendor.trim();
        if vendor.contains("Amazon") {
            info.insert("cloud".to_string(), "aws".to_string());
        } else if vendor.contains("Google") {
            info.insert("cloud".to_string(), "gcp".to_string());
        } else if vendor.contains("Microsoft") {
            info.insert("cloud".to_string(), "azure".to_string());
        }
    }

    (!info.is_empty()).then_some(info)
}

fn detect_gpu() -> Option<Vec<GpuInfo>> {
    let out = run_command(&[
        "nvidia-smi",
        "--query-gpu=name,memory.total,compute_cap",
        "--format=csv,noheader,nounits",
    ])?;

    let gpus: Vec<GpuInfo> = out
        .lines()
        .filter(|l| !l.is_empty())
        .filter_map(|line| {
            let parts: Vec<&str> = line.split(", ").collect();
            if parts.len() < 2 {
                return None;
            }
            Some(GpuInfo {
                name: parts[0].to_string(),
                memory_mb: parts[1].trim().parse().ok(),
                compute_cap: parts.get(2).map(|s| s.to_string()),
            })
        })
        .collect();

    (!gpus.is_empty()).then_some(gpus)
}

fn detect_cpu() -> Option<CpuInfo> {
    let mut info = CpuInfo { count: std::thread::available_parallelism().ok().map(|n| n.get() as u32), ..Default::default() };

    if let Ok(cpuinfo) = std::fs::read_to_string("/proc/cpuinfo") {
        for line in cpuinfo.lines() {
            if let Some(model) = line.strip_prefix("model name") {
                info.model = model.trim_start_matches([':', ' ']).trim().to_string().into();
                break;
            }
        }
    }

    if let Some(out) = run_command(&["lscpu"]) {
        for line in out.lines() {
            if let Some(v) = line.strip_prefix("Architecture:") {
                info.architecture = Some(v.trim().to_string());
            } else if let Some(v) = line.strip_prefix("CPU(s):") {
                info.count = v.trim().parse().ok();
            } else if let Some(v) = line.strip_prefix("Thread(s) per core:") {
                info.threads_per_core = v.trim().parse().ok();
            } else if let Some(v) = line.strip_prefix("Core(s) per socket:") {
                info.cores_per_socket = v.trim().parse().ok();
            } else if let Some(v) = line.strip_prefix("Socket(s):") {
                info.sockets = v.trim().parse().ok();
            }
        }
    }

    Some(info)
}

fn detect_memory() -> Option<MemoryInfo> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    let mut info = MemoryInfo::default();
    for line in meminfo.lines() {
        if let Some(v) = line.strip_prefix("MemTotal:") {
            info.total_mb = parse_kb_field(v);
        } else if let Some(v) = line.strip_prefix("MemAvailable:") {
            info.available_mb = parse_kb_field(v);
        }
    }
    (info.total_mb.is_some() || info.available_mb.is_some()).then_some(info)
}

fn parse_kb_field(field: &str) -> Option<u64> {
    field.split_whitespace().next()?.parse::<u64>().ok().map(|kb| kb / 1024)
}

/// Collect the full runtime snapshot for one job. `env_reads` comes from
/// the sidecar's observed environment variable accesses.
pub fn collect(
    command: Vec<String>,
    os: OsInfo,
    interpreter: InterpreterInfo,
    env_vars: BTreeMap<String, String>,
    start_time: f64,
    end_time: f64,
) -> RuntimeInfo {
    RuntimeInfo {
        hostname: hostname(),
        start_time,
        end_time,
        command,
        os,
        interpreter,
        env_vars,
        container: detect_container(),
        vm: detect_vm(),
        cuda: detect_cuda(),
        gpu: detect_gpu(),
        cpu: detect_cpu(),
        memory: detect_memory(),
    }
}

fn hostname() -> String {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_memory_reads_real_meminfo() {
        if std::path::Path::new("/proc/meminfo").exists() {
            let info = detect_memory();
            assert!(info.is_some());
            assert!(info.unwrap().total_mb.is_some());
        }
    }

    #[test]
    fn detect_cpu_always_returns_a_count() {
        let info = detect_cpu().unwrap();
        assert!(info.count.unwrap_or(0) > 0 || info.model.is_some());
    }

    #[test]
    fn collect_fills_required_fields() {
        let runtime = collect(
            vec!["python".to_string(), "train.py".to_string()],
            OsInfo { system: "Linux".into(), release: "6.1".into(), version: "#1".into(), machine: "x86_64".into() },
            InterpreterInfo { version: "3.12.0".into(), implementation: "CPython".into() },
            BTreeMap::new(),
            0.0,
            1.0,
        );
        assert_eq!(runtime.command, vec!["python".to_string(), "train.py".to_string()]);
        assert_eq!(runtime.os.system, "Linux");
    }

    #[test]
    fn parse_kb_field_converts_to_mb() {
        assert_eq!(parse_kb_field("16384000 kB"), Some(16000));
    }
}
