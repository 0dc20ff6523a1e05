// Linux implementation of MetricSource over /proc and /sys, plus sysinfo for
// filesystem usage and static identity.

use super::parse;
use super::{
    BatteryReading, CpuTimesReading, DiskCounters, DiskUsageReading, FdReading,
    InterfaceCounters, MemoryReading, MetricSource, ProcessIo, ProcessStatus, SwapReading,
};
use crate::config::SourceConfig;
use crate::error::SourceError;
use crate::models::{LoadAverages, ProcessState, ProcessStateCounts, SystemInfo};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use sysinfo::{Disks, System};
use tracing::instrument;

/// Thermal zones probed for a CPU temperature, in order.
const THERMAL_ZONES: u32 = 10;
/// Battery supplies probed, in order.
const BATTERIES: [&str; 2] = ["BAT0", "BAT1"];

pub struct ProcfsSource {
    proc_root: PathBuf,
    sys_root: PathBuf,
    clock_ticks: u64,
    /// Created on first disk usage query.
    disks: Mutex<Option<Disks>>,
}

impl ProcfsSource {
    pub fn new(config: &SourceConfig) -> Self {
        Self {
            proc_root: PathBuf::from(&config.proc_root),
            sys_root: PathBuf::from(&config.sys_root),
            clock_ticks: config.clock_ticks_per_sec,
            disks: Mutex::new(None),
        }
    }

    fn proc_path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.proc_root.join(rel)
    }

    fn sys_path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.sys_root.join(rel)
    }

    fn read(&self, metric: &'static str, path: &Path) -> Result<String, SourceError> {
        std::fs::read_to_string(path).map_err(|e| SourceError::from_io(metric, e))
    }

    fn read_process(&self, metric: &'static str, pid: u32, file: &str) -> Result<String, SourceError> {
        let path = self.proc_path(format!("{}/{}", pid, file));
        std::fs::read_to_string(path).map_err(|e| SourceError::from_process_io(metric, pid, e))
    }

    fn read_u64(&self, metric: &'static str, path: &Path) -> Result<u64, SourceError> {
        let s = self.read(metric, path)?;
        s.trim()
            .parse()
            .map_err(|e| SourceError::malformed(metric, format!("{}: {}", path.display(), e)))
    }

    /// Sorted entry names of a directory, minus those rejected by `keep`.
    fn list_dir(
        &self,
        metric: &'static str,
        dir: &Path,
        keep: impl Fn(&str) -> bool,
    ) -> Result<Vec<String>, SourceError> {
        let entries = std::fs::read_dir(dir).map_err(|e| SourceError::from_io(metric, e))?;
        let mut names: Vec<String> = entries
            .flatten()
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .filter(|n| keep(n.as_str()))
            .collect();
        names.sort();
        Ok(names)
    }

    /// Static identity (OS, host, CPU model, logical cores).
    pub fn system_info(&self) -> SystemInfo {
        let mut sys = System::new();
        sys.refresh_cpu_all();
        let processor_name = self
            .read("cpuinfo", &self.proc_path("cpuinfo"))
            .ok()
            .and_then(|c| parse::parse_cpu_model(&c))
            .or_else(|| {
                sys.cpus()
                    .first()
                    .map(|c| c.brand().to_string())
                    .filter(|s| !s.is_empty())
            })
            .unwrap_or_else(|| "Unknown".into());
        SystemInfo {
            os_name: System::name().unwrap_or_else(|| std::env::consts::OS.into()),
            os_version: System::os_version().unwrap_or_default(),
            host_name: System::host_name().unwrap_or_default(),
            processor_name,
            logical_cores: sys.cpus().len() as u32,
        }
    }
}

impl MetricSource for ProcfsSource {
    #[instrument(skip(self), fields(source = "procfs", operation = "probe"))]
    fn probe(&self) -> Result<(), SourceError> {
        let stat = self.read("proc.stat", &self.proc_path("stat"))?;
        parse::parse_cpu_times(&stat).map(|_| ())
    }

    fn uptime_secs(&self) -> Result<f64, SourceError> {
        parse::parse_uptime(&self.read("uptime", &self.proc_path("uptime"))?)
    }

    #[instrument(level = "trace", skip(self), fields(source = "procfs", operation = "cpu_times"))]
    fn cpu_times(&self) -> Result<CpuTimesReading, SourceError> {
        parse::parse_cpu_times(&self.read("cpu.times", &self.proc_path("stat"))?)
    }

    fn cpu_frequency_mhz(&self, core: u32) -> Result<f64, SourceError> {
        let path = self.sys_path(format!(
            "devices/system/cpu/cpu{}/cpufreq/scaling_cur_freq",
            core
        ));
        let khz = self.read_u64("cpu.frequency", &path)?;
        if khz == 0 {
            return Err(SourceError::unavailable("cpu.frequency", "zero frequency"));
        }
        Ok(khz as f64 / 1000.0)
    }

    fn cpu_temperature(&self) -> Result<f64, SourceError> {
        for zone in 0..THERMAL_ZONES {
            let path = self.sys_path(format!("class/thermal/thermal_zone{}/temp", zone));
            let Ok(raw) = std::fs::read_to_string(&path) else {
                continue;
            };
            let millidegrees: i64 = raw.trim().parse().map_err(|e| {
                SourceError::malformed("cpu.temperature", format!("{}: {}", path.display(), e))
            })?;
            if millidegrees <= 0 {
                return Err(SourceError::unavailable(
                    "cpu.temperature",
                    format!("sentinel reading {}", millidegrees),
                ));
            }
            return Ok(millidegrees as f64 / 1000.0);
        }
        Err(SourceError::unavailable("cpu.temperature", "no thermal zone"))
    }

    fn load_averages(&self) -> Result<LoadAverages, SourceError> {
        parse::parse_loadavg(&self.read("loadavg", &self.proc_path("loadavg"))?)
    }

    fn context_switches(&self) -> Result<u64, SourceError> {
        parse::parse_context_switches(&self.read("ctxt", &self.proc_path("stat"))?)
    }

    #[instrument(level = "trace", skip(self), fields(source = "procfs", operation = "memory"))]
    fn memory(&self) -> Result<MemoryReading, SourceError> {
        let meminfo = self.read("meminfo", &self.proc_path("meminfo"))?;
        let total_kb = parse::meminfo_kb(&meminfo, "MemTotal")
            .ok_or_else(|| SourceError::malformed("meminfo", "no MemTotal"))?;
        let available_kb = parse::meminfo_kb(&meminfo, "MemAvailable")
            .or_else(|| parse::meminfo_kb(&meminfo, "MemFree"))
            .ok_or_else(|| SourceError::malformed("meminfo", "no MemAvailable"))?;
        Ok(MemoryReading {
            total_kb,
            available_kb,
            cached_kb: parse::meminfo_kb(&meminfo, "Cached").unwrap_or(0),
            buffers_kb: parse::meminfo_kb(&meminfo, "Buffers").unwrap_or(0),
            shared_kb: parse::meminfo_kb(&meminfo, "Shmem").unwrap_or(0),
        })
    }

    fn swap(&self) -> Result<SwapReading, SourceError> {
        let meminfo = self.read("swap", &self.proc_path("meminfo"))?;
        let total_kb = parse::meminfo_kb(&meminfo, "SwapTotal")
            .ok_or_else(|| SourceError::malformed("swap", "no SwapTotal"))?;
        Ok(SwapReading {
            total_kb,
            free_kb: parse::meminfo_kb(&meminfo, "SwapFree").unwrap_or(0),
        })
    }

    fn network_interfaces(&self) -> Result<Vec<String>, SourceError> {
        self.list_dir("net.interfaces", &self.sys_path("class/net"), |n| n != "lo")
    }

    fn interface_counters(&self, name: &str) -> Result<InterfaceCounters, SourceError> {
        let dir = self.sys_path(format!("class/net/{}/statistics", name));
        let counter = |file: &str| self.read_u64("net.counters", &dir.join(file));
        Ok(InterfaceCounters {
            rx_bytes: counter("rx_bytes")?,
            tx_bytes: counter("tx_bytes")?,
            rx_packets: counter("rx_packets")?,
            tx_packets: counter("tx_packets")?,
            rx_errors: counter("rx_errors")?,
            tx_errors: counter("tx_errors")?,
        })
    }

    fn connection_count(&self) -> Result<u32, SourceError> {
        let tables = ["net/tcp", "net/tcp6"].map(|t| std::fs::read_to_string(self.proc_path(t)));
        if tables.iter().all(|t| t.is_err()) {
            return Err(SourceError::unavailable("net.connections", "no tcp tables"));
        }
        Ok(tables
            .iter()
            .flatten()
            .map(|t| parse::count_socket_entries(t))
            .sum())
    }

    fn disk_devices(&self) -> Result<Vec<String>, SourceError> {
        self.list_dir("disk.devices", &self.sys_path("block"), |n| {
            !n.starts_with("loop") && !n.starts_with("ram")
        })
    }

    fn disk_counters(&self, device: &str) -> Result<DiskCounters, SourceError> {
        let stat = self.read("disk.counters", &self.sys_path(format!("block/{}/stat", device)))?;
        parse::parse_block_stat(&stat)
    }

    #[instrument(level = "trace", skip(self), fields(source = "sysinfo", operation = "disk_usage"))]
    fn disk_usage(&self, mount: &str) -> Result<DiskUsageReading, SourceError> {
        let mut guard = self
            .disks
            .lock()
            .map_err(|e| SourceError::unavailable("disk.usage", format!("lock poisoned: {}", e)))?;
        let disks = guard.get_or_insert_with(Disks::new_with_refreshed_list);
        disks.refresh(false);
        disks
            .list()
            .iter()
            .find(|d| d.mount_point() == Path::new(mount))
            .map(|d| DiskUsageReading {
                total_bytes: d.total_space(),
                available_bytes: d.available_space(),
            })
            .ok_or_else(|| SourceError::unavailable("disk.usage", format!("{} not mounted", mount)))
    }

    fn file_descriptors(&self) -> Result<FdReading, SourceError> {
        parse::parse_file_nr(&self.read("file-nr", &self.proc_path("sys/fs/file-nr"))?)
    }

    fn battery(&self) -> Result<BatteryReading, SourceError> {
        for bat in BATTERIES {
            let base = self.sys_path(format!("class/power_supply/{}", bat));
            let Ok(capacity) = std::fs::read_to_string(base.join("capacity")) else {
                continue;
            };
            let percent: i32 = capacity
                .trim()
                .parse()
                .map_err(|e| SourceError::malformed("battery", format!("capacity: {}", e)))?;
            if percent < 0 {
                return Err(SourceError::unavailable("battery", "negative capacity"));
            }
            let charging = std::fs::read_to_string(base.join("status"))
                .map(|s| s.trim() == "Charging")
                .unwrap_or(false);
            let watts = std::fs::read_to_string(base.join("power_now"))
                .ok()
                .and_then(|s| s.trim().parse::<i64>().ok())
                .map(|uw| uw.max(0) as f64 / 1_000_000.0)
                .unwrap_or(0.0);
            return Ok(BatteryReading {
                percent,
                charging,
                watts,
            });
        }
        Err(SourceError::unavailable("battery", "no battery"))
    }

    #[instrument(level = "trace", skip(self), fields(source = "procfs", operation = "process_state_counts"))]
    fn process_state_counts(&self) -> Result<ProcessStateCounts, SourceError> {
        let mut counts = ProcessStateCounts::default();
        for pid in self.list_pids()? {
            // Exited since enumeration: not counted.
            let Ok(stat) = self.read_process("proc.stat", pid, "stat") else {
                continue;
            };
            if let Some(code) = parse::parse_stat_state(&stat) {
                counts.record(ProcessState::from_code(code));
            }
        }
        Ok(counts)
    }

    fn list_pids(&self) -> Result<Vec<u32>, SourceError> {
        let entries = std::fs::read_dir(&self.proc_root)
            .map_err(|e| SourceError::from_io("proc.list", e))?;
        let mut pids: Vec<u32> = entries
            .flatten()
            .filter_map(|e| e.file_name().to_str().and_then(|n| n.parse().ok()))
            .collect();
        pids.sort_unstable();
        Ok(pids)
    }

    fn process_status(&self, pid: u32) -> Result<ProcessStatus, SourceError> {
        parse::parse_status(&self.read_process("proc.status", pid, "status")?)
    }

    fn process_cpu_ticks(&self, pid: u32) -> Result<u64, SourceError> {
        parse::parse_stat_cpu_ticks(&self.read_process("proc.stat", pid, "stat")?)
    }

    fn process_io(&self, pid: u32) -> Result<ProcessIo, SourceError> {
        parse::parse_io(&self.read_process("proc.io", pid, "io")?)
    }

    fn process_fd_count(&self, pid: u32) -> Result<u32, SourceError> {
        let dir = self.proc_path(format!("{}/fd", pid));
        let entries =
            std::fs::read_dir(dir).map_err(|e| SourceError::from_process_io("proc.fd", pid, e))?;
        Ok(entries.flatten().count() as u32)
    }

    fn clock_ticks_per_sec(&self) -> u64 {
        self.clock_ticks
    }
}
