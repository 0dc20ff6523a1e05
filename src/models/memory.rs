// Memory and swap models

use serde::{Deserialize, Serialize};

/// Physical memory in bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub total: u64,
    pub used: u64,
    pub available: u64,
    pub cached: u64,
    pub buffers: u64,
    pub shared: u64,
    pub used_percent: f64,
}

/// Swap state. A host with zero configured swap reports `NoSwap`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SwapStats {
    NoSwap,
    #[serde(rename_all = "camelCase")]
    Active {
        total: u64,
        used: u64,
        used_percent: f64,
    },
}

impl SwapStats {
    /// Build from kB totals as found in /proc/meminfo.
    pub fn from_kb(total_kb: u64, free_kb: u64) -> Self {
        if total_kb == 0 {
            return SwapStats::NoSwap;
        }
        let used_kb = total_kb.saturating_sub(free_kb);
        SwapStats::Active {
            total: total_kb * 1024,
            used: used_kb * 1024,
            used_percent: used_kb as f64 / total_kb as f64 * 100.0,
        }
    }
}
