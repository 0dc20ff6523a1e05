// Snapshot data model

mod cpu;
mod memory;
mod network;
mod process;
mod storage;
mod system;

pub use cpu::{CpuStats, LoadAverages, valid_frequency, valid_temperature};
pub use memory::{MemoryStats, SwapStats};
pub use network::{InterfaceStats, InterfaceTraffic, NetworkStats, bytes_to_mbps};
pub use process::{ProcessSample, ProcessState, ProcessStateCounts};
pub use storage::{
    BYTES_PER_MB, DiskDeviceStats, DiskThroughput, DiskUsage, SECTOR_BYTES, StorageStats,
};
pub use system::{BatteryStats, FileDescriptorStats, ProcessStats, Snapshot, SystemInfo};
