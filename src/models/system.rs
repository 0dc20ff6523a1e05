// System identity, host-wide gauges and the per-tick snapshot

use serde::{Deserialize, Serialize};

use super::{CpuStats, MemoryStats, NetworkStats, ProcessSample, ProcessStateCounts};
use super::{StorageStats, SwapStats};

/// Static system identity; read once at startup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub os_name: String,
    pub os_version: String,
    pub host_name: String,
    pub processor_name: String,
    pub logical_cores: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryStats {
    pub percent: u8,
    pub charging: bool,
    pub watts: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptorStats {
    pub allocated: u64,
    pub max: u64,
    /// `None` when the kernel reports no maximum.
    pub used_percent: Option<f64>,
}

impl FileDescriptorStats {
    pub fn new(allocated: u64, max: u64) -> Self {
        let used_percent = (max > 0).then(|| allocated as f64 / max as f64 * 100.0);
        Self {
            allocated,
            max,
            used_percent,
        }
    }
}

/// Process inventory for one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStats {
    /// Memory-ranked top-N, largest resident set first.
    pub top: Vec<ProcessSample>,
    /// True when a consumer held the process view and `top` repeats the previous tick.
    pub held: bool,
    pub state_counts: Option<ProcessStateCounts>,
}

/// Everything sampled in one tick. Immutable once published; `None` means the source
/// was unavailable this tick. Rate-derived fields read 0 on tick 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub tick: u64,
    /// Unix epoch milliseconds.
    pub timestamp: u64,
    pub uptime_secs: Option<f64>,
    pub cpu: CpuStats,
    pub memory: Option<MemoryStats>,
    pub swap: Option<SwapStats>,
    pub storage: StorageStats,
    pub network: NetworkStats,
    pub processes: ProcessStats,
    pub context_switches_per_sec: Option<f64>,
    pub file_descriptors: Option<FileDescriptorStats>,
    pub battery: Option<BatteryStats>,
}

impl Snapshot {
    /// True on the first tick after start, when every rate still reads 0.
    pub fn is_warmup(&self) -> bool {
        self.tick == 0
    }
}
