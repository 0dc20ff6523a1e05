// CPU models

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuStats {
    /// Aggregate utilization over the last interval, 0..=100.
    pub usage_percent: Option<f64>,
    /// Per-core utilization, indexed by core discovery order.
    pub per_core_percent: Vec<Option<f64>>,
    /// Per-core clock in MHz; `None` where the core exposes no frequency.
    pub frequency_mhz: Vec<Option<f64>>,
    /// Share of the last interval spent waiting on I/O, 0..=100.
    pub iowait_percent: Option<f64>,
    pub temperature_celsius: Option<f64>,
    pub load: Option<LoadAverages>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadAverages {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

/// Temperature reading, or `None` for the non-positive "unavailable" sentinel.
pub fn valid_temperature(celsius: f64) -> Option<f64> {
    (celsius.is_finite() && celsius > 0.0).then_some(celsius)
}

/// Frequency reading, or `None` for the non-positive "unavailable" sentinel.
pub fn valid_frequency(mhz: f64) -> Option<f64> {
    (mhz.is_finite() && mhz > 0.0).then_some(mhz)
}
