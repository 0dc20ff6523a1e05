// Metric source adapter: point-in-time reads of OS counters and gauges.
//
// Implementations hold no sampling state. Every read may fail independently; callers
// treat a failure as "unavailable this tick".

mod parse;
mod procfs;

pub use procfs::ProcfsSource;

use crate::error::SourceError;
use crate::models::{LoadAverages, ProcessStateCounts};

/// Cumulative CPU time in clock ticks, as in one `cpu` line of /proc/stat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuTimes {
    pub fn active(&self) -> u64 {
        self.user + self.nice + self.system + self.irq + self.softirq + self.steal
    }

    pub fn total(&self) -> u64 {
        self.active() + self.idle + self.iowait
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CpuTimesReading {
    pub aggregate: CpuTimes,
    /// (core index, times), ascending by index.
    pub cores: Vec<(u32, CpuTimes)>,
}

/// /proc/meminfo values in kB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryReading {
    pub total_kb: u64,
    pub available_kb: u64,
    pub cached_kb: u64,
    pub buffers_kb: u64,
    pub shared_kb: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwapReading {
    pub total_kb: u64,
    pub free_kb: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterfaceCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub rx_errors: u64,
    pub tx_errors: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FdReading {
    pub allocated: u64,
    pub max: u64,
}

/// Raw battery read. `percent` below zero is the "no battery" sentinel.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BatteryReading {
    pub percent: i32,
    pub charging: bool,
    pub watts: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskCounters {
    pub sectors_read: u64,
    pub sectors_written: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskUsageReading {
    pub total_bytes: u64,
    pub available_bytes: u64,
}

/// Name, state code and resident set of one process. `rss_kb` is 0 when the process
/// has no resident memory (kernel threads).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessStatus {
    pub name: String,
    pub state: char,
    pub rss_kb: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessIo {
    pub read_bytes: u64,
    pub write_bytes: u64,
}

impl ProcessIo {
    pub fn total(&self) -> u64 {
        self.read_bytes + self.write_bytes
    }
}

/// Point-in-time query surface the sampler depends on.
pub trait MetricSource: Send + Sync {
    /// Startup reachability check. Failure prevents the sampler from starting.
    fn probe(&self) -> Result<(), SourceError>;

    fn uptime_secs(&self) -> Result<f64, SourceError>;
    fn cpu_times(&self) -> Result<CpuTimesReading, SourceError>;
    fn cpu_frequency_mhz(&self, core: u32) -> Result<f64, SourceError>;
    fn cpu_temperature(&self) -> Result<f64, SourceError>;
    fn load_averages(&self) -> Result<LoadAverages, SourceError>;
    fn context_switches(&self) -> Result<u64, SourceError>;

    fn memory(&self) -> Result<MemoryReading, SourceError>;
    fn swap(&self) -> Result<SwapReading, SourceError>;

    fn network_interfaces(&self) -> Result<Vec<String>, SourceError>;
    fn interface_counters(&self, name: &str) -> Result<InterfaceCounters, SourceError>;
    fn connection_count(&self) -> Result<u32, SourceError>;

    fn disk_devices(&self) -> Result<Vec<String>, SourceError>;
    fn disk_counters(&self, device: &str) -> Result<DiskCounters, SourceError>;
    fn disk_usage(&self, mount: &str) -> Result<DiskUsageReading, SourceError>;

    fn file_descriptors(&self) -> Result<FdReading, SourceError>;
    fn battery(&self) -> Result<BatteryReading, SourceError>;
    fn process_state_counts(&self) -> Result<ProcessStateCounts, SourceError>;

    /// Visible pids, ascending.
    fn list_pids(&self) -> Result<Vec<u32>, SourceError>;
    fn process_status(&self, pid: u32) -> Result<ProcessStatus, SourceError>;
    /// utime + stime in clock ticks.
    fn process_cpu_ticks(&self, pid: u32) -> Result<u64, SourceError>;
    fn process_io(&self, pid: u32) -> Result<ProcessIo, SourceError>;
    fn process_fd_count(&self, pid: u32) -> Result<u32, SourceError>;

    /// Kernel clock ticks per second (USER_HZ).
    fn clock_ticks_per_sec(&self) -> u64;
}
