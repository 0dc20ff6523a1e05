// Storage / disk models

use serde::{Deserialize, Serialize};

pub const SECTOR_BYTES: u64 = 512;
pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Filesystem usage of the monitored mount point, in bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskUsage {
    pub mount: String,
    pub total: u64,
    pub used: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskDeviceStats {
    pub device: String,
    pub throughput: Option<DiskThroughput>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskThroughput {
    pub read_mb_per_sec: f64,
    pub write_mb_per_sec: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    pub usage: Option<DiskUsage>,
    pub devices: Vec<DiskDeviceStats>,
}
