// Shared test helpers: a scripted MetricSource.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sysmon::error::SourceError;
use sysmon::models::{LoadAverages, ProcessState, ProcessStateCounts};
use sysmon::source::*;

#[derive(Debug, Clone, Default)]
pub struct FakeProcess {
    pub name: String,
    pub state: char,
    pub rss_kb: u64,
    pub cpu_ticks: Option<u64>,
    pub io: Option<ProcessIo>,
    pub fd_count: Option<u32>,
    /// Exits between enumeration and detail reads.
    pub vanishes: bool,
    /// Status file unreadable (e.g. permission denied).
    pub status_unreadable: bool,
}

impl FakeProcess {
    pub fn new(name: &str, rss_kb: u64) -> Self {
        Self {
            name: name.into(),
            state: 'S',
            rss_kb,
            cpu_ticks: Some(0),
            io: Some(ProcessIo::default()),
            fd_count: Some(4),
            ..Self::default()
        }
    }
}

/// Mutable script behind `FakeSource`. `None` means the metric is unavailable.
#[derive(Debug, Clone)]
pub struct FakeState {
    pub probe_ok: bool,
    pub uptime: Option<f64>,
    pub cpu: Option<CpuTimesReading>,
    pub frequencies: BTreeMap<u32, f64>,
    pub temperature: Option<f64>,
    pub load: Option<LoadAverages>,
    pub context_switches: Option<u64>,
    pub memory: Option<MemoryReading>,
    pub swap: Option<SwapReading>,
    pub interfaces: Option<BTreeMap<String, InterfaceCounters>>,
    pub connections: Option<u32>,
    pub disks: Option<BTreeMap<String, DiskCounters>>,
    pub disk_usage: Option<DiskUsageReading>,
    pub fds: Option<FdReading>,
    pub battery: Option<BatteryReading>,
    pub pids_readable: bool,
    pub processes: BTreeMap<u32, FakeProcess>,
    /// Added to every memory read.
    pub memory_delay: Option<Duration>,
    /// Battery reads block while this flag is set.
    pub battery_gate: Option<Arc<AtomicBool>>,
    /// Number of battery reads issued.
    pub battery_reads: Arc<AtomicUsize>,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            probe_ok: true,
            uptime: Some(1000.0),
            cpu: Some(CpuTimesReading::default()),
            frequencies: BTreeMap::new(),
            temperature: None,
            load: None,
            context_switches: Some(0),
            memory: Some(MemoryReading {
                total_kb: 8 * 1024 * 1024,
                available_kb: 4 * 1024 * 1024,
                ..MemoryReading::default()
            }),
            swap: Some(SwapReading::default()),
            interfaces: Some(BTreeMap::new()),
            connections: Some(0),
            disks: Some(BTreeMap::new()),
            disk_usage: None,
            fds: None,
            battery: None,
            pids_readable: true,
            processes: BTreeMap::new(),
            memory_delay: None,
            battery_gate: None,
            battery_reads: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[derive(Debug, Default)]
pub struct FakeSource {
    state: Mutex<FakeState>,
}

fn unavailable(metric: &'static str) -> SourceError {
    SourceError::unavailable(metric, "scripted")
}

impl FakeSource {
    pub fn new(state: FakeState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn update(&self, f: impl FnOnce(&mut FakeState)) {
        f(&mut *self.state.lock().unwrap());
    }

    fn with<T>(&self, f: impl FnOnce(&FakeState) -> T) -> T {
        f(&*self.state.lock().unwrap())
    }

    fn process<T>(
        &self,
        pid: u32,
        f: impl FnOnce(&FakeProcess) -> Option<T>,
        metric: &'static str,
    ) -> Result<T, SourceError> {
        self.with(|s| match s.processes.get(&pid) {
            None => Err(SourceError::Vanished { pid }),
            Some(p) if p.vanishes => Err(SourceError::Vanished { pid }),
            Some(p) => f(p).ok_or_else(|| unavailable(metric)),
        })
    }
}

pub fn cpu_times(user: u64, nice: u64, system: u64, idle: u64) -> CpuTimes {
    CpuTimes {
        user,
        nice,
        system,
        idle,
        ..CpuTimes::default()
    }
}

impl MetricSource for FakeSource {
    fn probe(&self) -> Result<(), SourceError> {
        if self.with(|s| s.probe_ok) {
            Ok(())
        } else {
            Err(unavailable("probe"))
        }
    }

    fn uptime_secs(&self) -> Result<f64, SourceError> {
        self.with(|s| s.uptime).ok_or_else(|| unavailable("uptime"))
    }

    fn cpu_times(&self) -> Result<CpuTimesReading, SourceError> {
        self.with(|s| s.cpu.clone()).ok_or_else(|| unavailable("cpu"))
    }

    fn cpu_frequency_mhz(&self, core: u32) -> Result<f64, SourceError> {
        self.with(|s| s.frequencies.get(&core).copied())
            .ok_or_else(|| unavailable("cpu.frequency"))
    }

    fn cpu_temperature(&self) -> Result<f64, SourceError> {
        self.with(|s| s.temperature).ok_or_else(|| unavailable("temperature"))
    }

    fn load_averages(&self) -> Result<LoadAverages, SourceError> {
        self.with(|s| s.load).ok_or_else(|| unavailable("load"))
    }

    fn context_switches(&self) -> Result<u64, SourceError> {
        self.with(|s| s.context_switches).ok_or_else(|| unavailable("ctxt"))
    }

    fn memory(&self) -> Result<MemoryReading, SourceError> {
        let (memory, delay) = self.with(|s| (s.memory, s.memory_delay));
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        memory.ok_or_else(|| unavailable("memory"))
    }

    fn swap(&self) -> Result<SwapReading, SourceError> {
        self.with(|s| s.swap).ok_or_else(|| unavailable("swap"))
    }

    fn network_interfaces(&self) -> Result<Vec<String>, SourceError> {
        self.with(|s| s.interfaces.as_ref().map(|m| m.keys().cloned().collect()))
            .ok_or_else(|| unavailable("net"))
    }

    fn interface_counters(&self, name: &str) -> Result<InterfaceCounters, SourceError> {
        self.with(|s| s.interfaces.as_ref().and_then(|m| m.get(name).copied()))
            .ok_or_else(|| unavailable("net.counters"))
    }

    fn connection_count(&self) -> Result<u32, SourceError> {
        self.with(|s| s.connections).ok_or_else(|| unavailable("connections"))
    }

    fn disk_devices(&self) -> Result<Vec<String>, SourceError> {
        self.with(|s| s.disks.as_ref().map(|m| m.keys().cloned().collect()))
            .ok_or_else(|| unavailable("disk"))
    }

    fn disk_counters(&self, device: &str) -> Result<DiskCounters, SourceError> {
        self.with(|s| s.disks.as_ref().and_then(|m| m.get(device).copied()))
            .ok_or_else(|| unavailable("disk.counters"))
    }

    fn disk_usage(&self, _mount: &str) -> Result<DiskUsageReading, SourceError> {
        self.with(|s| s.disk_usage).ok_or_else(|| unavailable("disk.usage"))
    }

    fn file_descriptors(&self) -> Result<FdReading, SourceError> {
        self.with(|s| s.fds).ok_or_else(|| unavailable("fds"))
    }

    fn battery(&self) -> Result<BatteryReading, SourceError> {
        let (battery, gate, reads) =
            self.with(|s| (s.battery, s.battery_gate.clone(), s.battery_reads.clone()));
        reads.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = gate {
            while gate.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(5));
            }
        }
        battery.ok_or_else(|| unavailable("battery"))
    }

    fn process_state_counts(&self) -> Result<ProcessStateCounts, SourceError> {
        Ok(self.with(|s| {
            let mut counts = ProcessStateCounts::default();
            for p in s.processes.values() {
                counts.record(ProcessState::from_code(p.state));
            }
            counts
        }))
    }

    fn list_pids(&self) -> Result<Vec<u32>, SourceError> {
        self.with(|s| {
            s.pids_readable
                .then(|| s.processes.keys().copied().collect())
        })
        .ok_or_else(|| unavailable("pids"))
    }

    fn process_status(&self, pid: u32) -> Result<ProcessStatus, SourceError> {
        self.with(|s| match s.processes.get(&pid) {
            None => Err(SourceError::Vanished { pid }),
            Some(p) if p.status_unreadable => Err(unavailable("proc.status")),
            Some(p) => Ok(ProcessStatus {
                name: p.name.clone(),
                state: p.state,
                rss_kb: p.rss_kb,
            }),
        })
    }

    fn process_cpu_ticks(&self, pid: u32) -> Result<u64, SourceError> {
        self.process(pid, |p| p.cpu_ticks, "proc.cpu")
    }

    fn process_io(&self, pid: u32) -> Result<ProcessIo, SourceError> {
        self.process(pid, |p| p.io, "proc.io")
    }

    fn process_fd_count(&self, pid: u32) -> Result<u32, SourceError> {
        self.process(pid, |p| p.fd_count, "proc.fd")
    }

    fn clock_ticks_per_sec(&self) -> u64 {
        100
    }
}
