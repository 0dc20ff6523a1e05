// Process models

use serde::{Deserialize, Serialize};

/// Kernel run state; serializes to camelCase JSON (e.g. "diskSleep").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProcessState {
    Running,
    Sleeping,
    DiskSleep,
    Stopped,
    Zombie,
    Idle,
    Dead,
    #[serde(other)]
    Unknown,
}

impl ProcessState {
    /// Parse the single-letter state code from /proc/<pid>/stat or status (e.g. 'R').
    pub fn from_code(c: char) -> Self {
        match c {
            'R' => ProcessState::Running,
            'S' => ProcessState::Sleeping,
            'D' => ProcessState::DiskSleep,
            'T' | 't' => ProcessState::Stopped,
            'Z' => ProcessState::Zombie,
            'I' => ProcessState::Idle,
            'X' | 'x' => ProcessState::Dead,
            _ => ProcessState::Unknown,
        }
    }
}

/// One entry of the memory-ranked process list. Detail fields are `None` when their
/// read failed for this process only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSample {
    pub pid: u32,
    pub name: String,
    pub state: ProcessState,
    pub memory_mb: f64,
    pub cpu_percent: Option<f64>,
    /// Lifetime bytes read + written to storage.
    pub disk_io_bytes: Option<u64>,
    pub disk_io_mb_per_sec: Option<f64>,
    pub fd_count: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStateCounts {
    pub running: u32,
    pub sleeping: u32,
    pub stopped: u32,
    pub zombie: u32,
    /// Every recorded process, including dead and unknown states.
    pub total: u32,
}

impl ProcessStateCounts {
    /// Tally one process. Disk sleep and idle kernel threads count as sleeping.
    pub fn record(&mut self, state: ProcessState) {
        self.total += 1;
        match state {
            ProcessState::Running => self.running += 1,
            ProcessState::Sleeping | ProcessState::DiskSleep | ProcessState::Idle => {
                self.sleeping += 1
            }
            ProcessState::Stopped => self.stopped += 1,
            ProcessState::Zombie => self.zombie += 1,
            ProcessState::Dead | ProcessState::Unknown => {}
        }
    }
}
