//! Point-in-time snapshots of process and machine state
//!
//! The [`MetricsProvider`] trait is the seam between the dispatcher and the
//! operating system. [`ProcfsProvider`] reads a Linux `/proc` tree; tests and
//! embedders can substitute their own implementation.

mod procfs;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use procfs::ProcfsProvider;

/// Trait for sources of process and machine snapshots
#[async_trait::async_trait]
pub trait MetricsProvider: Send + Sync + 'static {
    /// Take a snapshot of every process visible under `proc_root`
    async fn snapshot_processes(
        &self,
        proc_root: &Path,
        agent_url: Option<&str>,
    ) -> Result<ProcessInfo>;

    /// Take a snapshot of machine-wide CPU, memory, network and disk state
    async fn snapshot_machine(&self, proc_root: &Path) -> Result<MachineInfo>;

    /// Get the provider name
    fn name(&self) -> &str;
}

/// Per-process snapshot for one collection tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub machine_id: String,
    /// Unix time in seconds
    pub timestamp: i64,
    pub procs: Vec<ProcessDetail>,
    /// Monitoring agent the snapshot was taken alongside, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_url: Option<String>,
}

/// One observed process
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessDetail {
    pub proc_id: u64,
    pub status_info: ProcessStatus,
    pub stat_info: ProcessStat,
}

/// Fields from `/proc/[pid]/status`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessStatus {
    pub name: String,
    pub state: String,
    pub tgid: u64,
    pub ppid: u64,
    pub uid: u32,
    pub gid: u32,
    pub threads: u64,
    /// kB
    pub vm_size: u64,
    /// kB
    pub vm_rss: u64,
    pub voluntary_ctxt_switches: u64,
    pub nonvoluntary_ctxt_switches: u64,
}

/// Fields from `/proc/[pid]/stat`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessStat {
    pub pid: u64,
    pub comm: String,
    pub state: String,
    pub ppid: i64,
    pub utime: u64,
    pub stime: u64,
    pub priority: i64,
    pub nice: i64,
    pub num_threads: i64,
    pub starttime: u64,
    pub vsize: u64,
    pub rss: i64,
}

/// Machine-wide snapshot for one collection tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineInfo {
    pub machine_id: String,
    /// Unix time in seconds
    pub timestamp: i64,
    pub cpu_info: Vec<CpuInfo>,
    pub mem_info: MemInfo,
    pub net_info: Vec<NetInfo>,
    pub disk_info: DiskInfo,
}

/// One logical CPU from `/proc/cpuinfo`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuInfo {
    pub processor: String,
    pub model: String,
    pub model_name: String,
    #[serde(rename = "cpu MHz")]
    pub cpu_mhz: u64,
    /// KB
    #[serde(rename = "cache size")]
    pub cache_size: u64,
}

/// Memory totals from `/proc/meminfo`, in kB
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemInfo {
    #[serde(rename = "MemTotal")]
    pub mem_total: u64,
    #[serde(rename = "MemFree")]
    pub mem_free: u64,
    #[serde(rename = "MemAvailable")]
    pub mem_available: u64,
}

/// Counters for one network interface from `/proc/net/dev`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetInfo {
    pub interface: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub errs: u64,
    pub drop: u64,
    pub compressed: u64,
}

/// Disk activity summed over block devices from `/proc/diskstats`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskInfo {
    pub reads_completed: u64,
    pub writes_completed: u64,
    pub io_in_progress: u64,
    /// Milliseconds spent doing I/O
    pub io: u64,
}
