//! `/proc` backed metrics provider
//!
//! Parsers are plain functions over file contents so they can be tested with
//! string inputs; [`ProcfsProvider`] only handles the file reads.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::Utc;
use log::{debug, trace, warn};

use super::{
    CpuInfo, DiskInfo, MachineInfo, MemInfo, MetricsProvider, NetInfo, ProcessDetail, ProcessInfo,
    ProcessStat, ProcessStatus,
};
use crate::error::{RelayError, Result};

const MACHINE_ID_PATH: &str = "/etc/machine-id";

/// Reads process and machine snapshots from a Linux `/proc` tree
pub struct ProcfsProvider {
    machine_id: String,
}

impl ProcfsProvider {
    /// Create a provider, detecting the machine id of this host
    pub fn new() -> Self {
        Self {
            machine_id: detect_machine_id(),
        }
    }

    /// Create a provider reporting a fixed machine id
    pub fn with_machine_id(machine_id: impl Into<String>) -> Self {
        Self {
            machine_id: machine_id.into(),
        }
    }

    /// Machine id stamped on every snapshot
    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }
}

impl Default for ProcfsProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl MetricsProvider for ProcfsProvider {
    async fn snapshot_processes(
        &self,
        proc_root: &Path,
        agent_url: Option<&str>,
    ) -> Result<ProcessInfo> {
        let mut dir = tokio::fs::read_dir(proc_root).await.map_err(|e| {
            RelayError::Collection(format!("Cannot read {}: {}", proc_root.display(), e))
        })?;

        let mut procs = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let pid = match entry.file_name().to_str().and_then(|n| n.parse::<u64>().ok()) {
                Some(pid) => pid,
                None => continue,
            };

            // Processes can exit between listing and reading
            match read_process(&entry.path(), pid).await {
                Ok(detail) => procs.push(detail),
                Err(e) => trace!("Skipping process {}: {}", pid, e),
            }
        }
        procs.sort_by_key(|p| p.proc_id);

        debug!("Collected {} processes from {}", procs.len(), proc_root.display());

        Ok(ProcessInfo {
            machine_id: self.machine_id.clone(),
            timestamp: Utc::now().timestamp(),
            procs,
            agent_url: agent_url.filter(|u| !u.is_empty()).map(str::to_string),
        })
    }

    async fn snapshot_machine(&self, proc_root: &Path) -> Result<MachineInfo> {
        tokio::fs::metadata(proc_root).await.map_err(|e| {
            RelayError::Collection(format!("Cannot read {}: {}", proc_root.display(), e))
        })?;

        let cpu_info = read_optional(&proc_root.join("cpuinfo"))
            .await
            .map(|c| parse_cpuinfo(&c))
            .unwrap_or_default();

        let mem_info = match read_optional(&proc_root.join("meminfo")).await {
            Some(content) => parse_meminfo(&content),
            None => MemInfo::default(),
        };

        let mut net_info = read_optional(&proc_root.join("net/dev"))
            .await
            .map(|c| parse_net_dev(&c))
            .unwrap_or_default();
        if let Some(sys_root) = proc_root.parent().map(|p| p.join("sys")) {
            for iface in net_info.iter_mut() {
                let address = sys_root.join("class/net").join(&iface.interface).join("address");
                iface.mac = read_optional(&address)
                    .await
                    .map(|m| m.trim().to_string())
                    .filter(|m| !m.is_empty());
            }
        }

        let disk_info = read_optional(&proc_root.join("diskstats"))
            .await
            .map(|c| parse_diskstats(&c))
            .unwrap_or_default();

        Ok(MachineInfo {
            machine_id: self.machine_id.clone(),
            timestamp: Utc::now().timestamp(),
            cpu_info,
            mem_info,
            net_info,
            disk_info,
        })
    }

    fn name(&self) -> &str {
        "procfs"
    }
}

async fn read_process(dir: &Path, pid: u64) -> Result<ProcessDetail> {
    let status = tokio::fs::read_to_string(dir.join("status")).await?;
    let stat = tokio::fs::read_to_string(dir.join("stat")).await?;

    Ok(ProcessDetail {
        proc_id: pid,
        status_info: parse_status(&status)?,
        stat_info: parse_stat(&stat)?,
    })
}

async fn read_optional(path: &Path) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Some(content),
        Err(e) => {
            debug!("Skipping {}: {}", path.display(), e);
            None
        }
    }
}

fn detect_machine_id() -> String {
    if let Ok(id) = std::fs::read_to_string(MACHINE_ID_PATH) {
        let id = id.trim();
        if !id.is_empty() {
            return id.to_string();
        }
    }

    match hostname::get() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(e) => {
            warn!("Unable to determine machine id: {}", e);
            "unknown".to_string()
        }
    }
}

/// Leading unsigned number of a value such as `"1234 kB"`
fn leading_u64(value: &str) -> u64 {
    value
        .split_whitespace()
        .next()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// Parses `/proc/[pid]/status` content
pub(crate) fn parse_status(content: &str) -> Result<ProcessStatus> {
    let fields: HashMap<&str, &str> = content
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim(), v.trim()))
        .collect();

    let name = fields
        .get("Name")
        .ok_or_else(|| RelayError::Collection("missing Name in status".to_string()))?;

    let first_u32 = |key: &str| -> u32 {
        fields
            .get(key)
            .and_then(|v| v.split_whitespace().next())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    };
    let number = |key: &str| -> u64 { fields.get(key).map(|v| leading_u64(v)).unwrap_or(0) };

    Ok(ProcessStatus {
        name: name.to_string(),
        state: fields.get("State").map(|s| s.to_string()).unwrap_or_default(),
        tgid: number("Tgid"),
        ppid: number("PPid"),
        uid: first_u32("Uid"),
        gid: first_u32("Gid"),
        threads: number("Threads"),
        vm_size: number("VmSize"),
        vm_rss: number("VmRSS"),
        voluntary_ctxt_switches: number("voluntary_ctxt_switches"),
        nonvoluntary_ctxt_switches: number("nonvoluntary_ctxt_switches"),
    })
}

/// Parses `/proc/[pid]/stat` content.
///
/// The comm field may itself contain spaces and parentheses, so it is taken
/// from the first `(` to the last `)`.
pub(crate) fn parse_stat(content: &str) -> Result<ProcessStat> {
    let content = content.trim();
    let invalid = |msg: &str| RelayError::Collection(format!("{} in stat", msg));

    let open = content.find('(').ok_or_else(|| invalid("missing '('"))?;
    let close = content.rfind(')').ok_or_else(|| invalid("missing ')'"))?;
    if close <= open {
        return Err(invalid("invalid parentheses"));
    }

    let pid: u64 = content[..open]
        .trim()
        .parse()
        .map_err(|_| invalid("invalid pid"))?;
    let comm = content[open + 1..close].to_string();

    let fields: Vec<&str> = content[close + 1..].split_whitespace().collect();
    if fields.len() < 22 {
        return Err(RelayError::Collection(format!(
            "not enough fields in stat: expected 22+, got {}",
            fields.len()
        )));
    }

    let int = |idx: usize| -> Result<i64> {
        fields[idx]
            .parse()
            .map_err(|_| RelayError::Collection(format!("invalid stat field {}", idx)))
    };
    let uint = |idx: usize| -> Result<u64> {
        fields[idx]
            .parse()
            .map_err(|_| RelayError::Collection(format!("invalid stat field {}", idx)))
    };

    Ok(ProcessStat {
        pid,
        comm,
        state: fields[0].to_string(),
        ppid: int(1)?,
        utime: uint(11)?,
        stime: uint(12)?,
        priority: int(15)?,
        nice: int(16)?,
        num_threads: int(17)?,
        starttime: uint(19)?,
        vsize: uint(20)?,
        rss: int(21)?,
    })
}

/// Parses `/proc/cpuinfo` into one entry per logical CPU
pub(crate) fn parse_cpuinfo(content: &str) -> Vec<CpuInfo> {
    let mut cpus = Vec::new();
    let mut current: Option<CpuInfo> = None;

    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            // Blank line ends a processor block
            if let Some(cpu) = current.take() {
                cpus.push(cpu);
            }
            continue;
        };
        let (key, value) = (key.trim(), value.trim());

        if key == "processor" {
            if let Some(cpu) = current.take() {
                cpus.push(cpu);
            }
            current = Some(CpuInfo {
                processor: value.to_string(),
                ..Default::default()
            });
            continue;
        }

        let Some(cpu) = current.as_mut() else { continue };
        match key {
            "model" => cpu.model = value.to_string(),
            "model name" => cpu.model_name = value.to_string(),
            "cpu MHz" => cpu.cpu_mhz = value.parse::<f64>().map(|v| v as u64).unwrap_or(0),
            "cache size" => cpu.cache_size = leading_u64(value),
            _ => {}
        }
    }

    if let Some(cpu) = current {
        cpus.push(cpu);
    }
    cpus
}

/// Parses `/proc/meminfo`
pub(crate) fn parse_meminfo(content: &str) -> MemInfo {
    let mut info = MemInfo::default();
    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else { continue };
        match key.trim() {
            "MemTotal" => info.mem_total = leading_u64(value),
            "MemFree" => info.mem_free = leading_u64(value),
            "MemAvailable" => info.mem_available = leading_u64(value),
            _ => {}
        }
    }
    info
}

/// Parses `/proc/net/dev`; the first two lines are headers
pub(crate) fn parse_net_dev(content: &str) -> Vec<NetInfo> {
    content
        .lines()
        .skip(2)
        .filter_map(|line| {
            let (iface, counters) = line.split_once(':')?;
            let values: Vec<u64> = counters
                .split_whitespace()
                .map(|v| v.parse().unwrap_or(0))
                .collect();
            if values.len() < 16 {
                return None;
            }

            // rx: bytes packets errs drop fifo frame compressed multicast
            // tx: bytes packets errs drop fifo colls carrier compressed
            Some(NetInfo {
                interface: iface.trim().to_string(),
                mac: None,
                rx_bytes: values[0],
                tx_bytes: values[8],
                errs: values[2] + values[10],
                drop: values[3] + values[11],
                compressed: values[6] + values[15],
            })
        })
        .collect()
}

/// Parses `/proc/diskstats`, summing whole disks only
pub(crate) fn parse_diskstats(content: &str) -> DiskInfo {
    let rows: Vec<Vec<&str>> = content
        .lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>())
        .filter(|f| f.len() >= 13)
        .collect();
    let names: HashSet<&str> = rows.iter().map(|f| f[2]).collect();

    let mut info = DiskInfo::default();
    for fields in rows.iter() {
        let name = fields[2];
        if name.starts_with("loop") || name.starts_with("ram") || is_partition(name, &names) {
            continue;
        }
        let value = |idx: usize| fields[idx].parse::<u64>().unwrap_or(0);
        info.reads_completed += value(3);
        info.writes_completed += value(7);
        info.io_in_progress += value(11);
        info.io += value(12);
    }
    info
}

/// `sda1` of `sda`, `nvme0n1p2` of `nvme0n1`
fn is_partition(name: &str, names: &HashSet<&str>) -> bool {
    names.iter().any(|&disk| {
        name.len() > disk.len()
            && name.starts_with(disk)
            && {
                let suffix = &name[disk.len()..];
                let digits = suffix.strip_prefix('p').unwrap_or(suffix);
                !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
            }
    })
}
