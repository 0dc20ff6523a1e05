// Aggregator: one tick of raw reads -> one immutable Snapshot.
//
// Owns the rate engine and the identity registries. Every counter goes through the
// engine here, sequentially, after all reads of the tick have been merged.

use crate::error::SourceError;
use crate::models::*;
use crate::process::{self, ProcessReading};
use crate::rate::{RateEngine, share_percent};
use crate::registry::IdentityRegistry;
use crate::source::{
    BatteryReading, CpuTimesReading, DiskCounters, DiskUsageReading, FdReading,
    InterfaceCounters, MemoryReading, SwapReading,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Outcome of one read group within a tick.
#[derive(Debug)]
pub enum Reading<T> {
    /// Read succeeded; the instant is when it completed.
    Fresh(T, Instant),
    /// Source could not be read; the affected fields report unavailable.
    Unavailable(SourceError),
    /// Read missed the tick deadline; the previous Snapshot's fields are carried forward.
    Abandoned,
}

impl<T> Reading<T> {
    pub fn fresh(value: T) -> Self {
        Reading::Fresh(value, Instant::now())
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Reading::Fresh(..))
    }
}

impl<T> Default for Reading<T> {
    fn default() -> Self {
        Reading::Unavailable(SourceError::unavailable("reading", "not collected"))
    }
}

impl<T> From<Result<T, SourceError>> for Reading<T> {
    fn from(r: Result<T, SourceError>) -> Self {
        match r {
            Ok(v) => Reading::fresh(v),
            Err(e) => Reading::Unavailable(e),
        }
    }
}

/// CPU tick breakdown plus the frequency of every core in it.
#[derive(Debug, Clone, Default)]
pub struct CpuReading {
    pub times: CpuTimesReading,
    pub frequencies: Vec<(u32, Option<f64>)>,
}

/// Counters of one named entity (interface, block device). `None` when that entity could
/// not be read although it was listed.
#[derive(Debug, Clone)]
pub struct EntityCounters<C> {
    pub name: String,
    pub counters: Option<(C, Instant)>,
}

/// All reads of one tick, grouped the way the sampler issues them.
#[derive(Debug, Default)]
pub struct RawTick {
    pub uptime: Reading<f64>,
    pub cpu: Reading<CpuReading>,
    pub temperature: Reading<f64>,
    pub load: Reading<LoadAverages>,
    pub context_switches: Reading<u64>,
    pub memory: Reading<MemoryReading>,
    pub swap: Reading<SwapReading>,
    pub interfaces: Reading<Vec<EntityCounters<InterfaceCounters>>>,
    pub connections: Reading<u32>,
    pub disks: Reading<Vec<EntityCounters<DiskCounters>>>,
    pub disk_usage: Reading<DiskUsageReading>,
    pub file_descriptors: Reading<FdReading>,
    pub battery: Reading<BatteryReading>,
    pub state_counts: Reading<ProcessStateCounts>,
    pub processes: Reading<Vec<ProcessReading>>,
}

/// Outcome class of a read group, for health logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupStatus {
    Fresh,
    Unavailable,
    Abandoned,
}

impl<T> From<&Reading<T>> for GroupStatus {
    fn from(r: &Reading<T>) -> Self {
        match r {
            Reading::Fresh(..) => GroupStatus::Fresh,
            Reading::Unavailable(_) => GroupStatus::Unavailable,
            Reading::Abandoned => GroupStatus::Abandoned,
        }
    }
}

impl RawTick {
    /// Status and failure reason of every group, by group name.
    pub fn group_statuses(&self) -> Vec<(&'static str, GroupStatus, Option<String>)> {
        fn entry<T>(name: &'static str, r: &Reading<T>) -> (&'static str, GroupStatus, Option<String>) {
            let reason = match r {
                Reading::Unavailable(e) => Some(e.to_string()),
                _ => None,
            };
            (name, GroupStatus::from(r), reason)
        }
        vec![
            entry("uptime", &self.uptime),
            entry("cpu", &self.cpu),
            entry("temperature", &self.temperature),
            entry("load", &self.load),
            entry("context_switches", &self.context_switches),
            entry("memory", &self.memory),
            entry("swap", &self.swap),
            entry("interfaces", &self.interfaces),
            entry("connections", &self.connections),
            entry("disks", &self.disks),
            entry("disk_usage", &self.disk_usage),
            entry("file_descriptors", &self.file_descriptors),
            entry("battery", &self.battery),
            entry("state_counts", &self.state_counts),
            entry("processes", &self.processes),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub eviction_ticks: u64,
    pub disk_usage_mount: String,
    pub clock_ticks_per_sec: u64,
}

pub struct Aggregator {
    engine: RateEngine,
    cores: IdentityRegistry<u32>,
    interfaces: IdentityRegistry<String>,
    disks: IdentityRegistry<String>,
    previous: Option<Arc<Snapshot>>,
    next_tick: u64,
    evicted_total: u64,
    config: AggregatorConfig,
}

fn resolve<T, U>(
    reading: Reading<T>,
    carried: impl FnOnce() -> Option<U>,
    derive: impl FnOnce(T, Instant) -> Option<U>,
) -> Option<U> {
    match reading {
        Reading::Fresh(v, at) => derive(v, at),
        Reading::Unavailable(_) => None,
        Reading::Abandoned => carried(),
    }
}

fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, operation = "get_timestamp", "system time error");
            0
        })
}

fn memory_stats(m: MemoryReading) -> MemoryStats {
    let total = m.total_kb * 1024;
    let available = m.available_kb.min(m.total_kb) * 1024;
    let used = total - available;
    MemoryStats {
        total,
        used,
        available,
        cached: m.cached_kb * 1024,
        buffers: m.buffers_kb * 1024,
        shared: m.shared_kb * 1024,
        used_percent: if total > 0 {
            used as f64 / total as f64 * 100.0
        } else {
            0.0
        },
    }
}

fn disk_usage(mount: &str, r: DiskUsageReading) -> Option<DiskUsage> {
    if r.total_bytes == 0 {
        return None;
    }
    let used = r.total_bytes.saturating_sub(r.available_bytes);
    Some(DiskUsage {
        mount: mount.to_string(),
        total: r.total_bytes,
        used,
        percent: used as f64 / r.total_bytes as f64 * 100.0,
    })
}

fn battery_stats(r: BatteryReading) -> Option<BatteryStats> {
    (r.percent >= 0).then(|| BatteryStats {
        percent: r.percent.min(100) as u8,
        charging: r.charging,
        watts: r.watts,
    })
}

fn interface_traffic(
    engine: &mut RateEngine,
    name: &str,
    c: &InterfaceCounters,
    at: Instant,
) -> InterfaceTraffic {
    InterfaceTraffic {
        rx_mbps: bytes_to_mbps(engine.observe(&format!("net.{}.rx", name), c.rx_bytes, at)),
        tx_mbps: bytes_to_mbps(engine.observe(&format!("net.{}.tx", name), c.tx_bytes, at)),
        rx_packets_per_sec: engine.observe(&format!("net.{}.rx_packets", name), c.rx_packets, at),
        tx_packets_per_sec: engine.observe(&format!("net.{}.tx_packets", name), c.tx_packets, at),
        rx_packets: c.rx_packets,
        tx_packets: c.tx_packets,
        rx_errors: c.rx_errors,
        tx_errors: c.tx_errors,
    }
}

fn disk_throughput(
    engine: &mut RateEngine,
    device: &str,
    c: &DiskCounters,
    at: Instant,
) -> DiskThroughput {
    let read = engine.observe(
        &format!("disk.{}.read", device),
        c.sectors_read * SECTOR_BYTES,
        at,
    );
    let write = engine.observe(
        &format!("disk.{}.write", device),
        c.sectors_written * SECTOR_BYTES,
        at,
    );
    DiskThroughput {
        read_mb_per_sec: read / BYTES_PER_MB,
        write_mb_per_sec: write / BYTES_PER_MB,
    }
}

/// Map fresh per-entity counters onto the full registry, in registry order.
fn by_registry<C, S>(
    registry: &mut IdentityRegistry<String>,
    entities: Vec<EntityCounters<C>>,
    mut derive: impl FnMut(&str, &C, Instant) -> S,
) -> Vec<(String, Option<S>)> {
    registry.extend(entities.iter().map(|e| &e.name));
    let fresh: HashMap<String, (C, Instant)> = entities
        .into_iter()
        .filter_map(|e| e.counters.map(|c| (e.name, c)))
        .collect();
    registry
        .iter()
        .map(|name| {
            let stats = fresh.get(name).map(|(c, at)| derive(name.as_str(), c, *at));
            (name.clone(), stats)
        })
        .collect()
}

impl Aggregator {
    pub fn new(engine: RateEngine, config: AggregatorConfig) -> Self {
        Self {
            engine,
            cores: IdentityRegistry::new(),
            interfaces: IdentityRegistry::new(),
            disks: IdentityRegistry::new(),
            previous: None,
            next_tick: 0,
            evicted_total: 0,
            config,
        }
    }

    pub fn engine(&self) -> &RateEngine {
        &self.engine
    }

    /// Rate keys evicted since start.
    pub fn evicted_total(&self) -> u64 {
        self.evicted_total
    }

    /// Build this tick's Snapshot. With `hold_processes` set, the previous process list is
    /// republished unchanged while per-process rate state still advances.
    pub fn assemble(&mut self, raw: RawTick, hold_processes: bool) -> Arc<Snapshot> {
        self.engine.begin_tick();
        let prev_arc = self.previous.clone();
        let prev = prev_arc.as_deref();

        let cpu = self.derive_cpu(raw.cpu, raw.temperature, raw.load, prev);

        let uptime_secs = resolve(raw.uptime, || prev.and_then(|p| p.uptime_secs), |v, _| Some(v));
        let memory = resolve(
            raw.memory,
            || prev.and_then(|p| p.memory.clone()),
            |m, _| Some(memory_stats(m)),
        );
        let swap = resolve(
            raw.swap,
            || prev.and_then(|p| p.swap.clone()),
            |s, _| Some(SwapStats::from_kb(s.total_kb, s.free_kb)),
        );
        let context_switches_per_sec = resolve(
            raw.context_switches,
            || prev.and_then(|p| p.context_switches_per_sec),
            |v, at| Some(self.engine.observe("ctxt", v, at)),
        );
        let file_descriptors = resolve(
            raw.file_descriptors,
            || prev.and_then(|p| p.file_descriptors.clone()),
            |f, _| Some(FileDescriptorStats::new(f.allocated, f.max)),
        );
        let battery = resolve(
            raw.battery,
            || prev.and_then(|p| p.battery.clone()),
            |b, _| battery_stats(b),
        );

        let mount = self.config.disk_usage_mount.clone();
        let storage = StorageStats {
            usage: resolve(
                raw.disk_usage,
                || prev.and_then(|p| p.storage.usage.clone()),
                |u, _| disk_usage(&mount, u),
            ),
            devices: self.derive_disks(raw.disks, prev),
        };

        let network = NetworkStats {
            interfaces: self.derive_interfaces(raw.interfaces, prev),
            active_connections: resolve(
                raw.connections,
                || prev.and_then(|p| p.network.active_connections),
                |n, _| Some(n),
            ),
        };

        let processes = self.derive_processes(raw.processes, raw.state_counts, hold_processes, prev);

        let evicted = self.engine.evict_stale(self.config.eviction_ticks);
        if evicted > 0 {
            tracing::trace!(evicted, "evicted stale rate keys");
            self.evicted_total += evicted as u64;
        }

        let snapshot = Arc::new(Snapshot {
            tick: self.next_tick,
            timestamp: unix_millis(),
            uptime_secs,
            cpu,
            memory,
            swap,
            storage,
            network,
            processes,
            context_switches_per_sec,
            file_descriptors,
            battery,
        });
        self.next_tick += 1;
        self.previous = Some(snapshot.clone());
        snapshot
    }

    fn derive_cpu(
        &mut self,
        cpu: Reading<CpuReading>,
        temperature: Reading<f64>,
        load: Reading<LoadAverages>,
        prev: Option<&Snapshot>,
    ) -> CpuStats {
        let carried = || prev.map(|p| p.cpu.clone()).unwrap_or_default();
        let mut stats = match cpu {
            Reading::Fresh(r, at) => self.cpu_from_reading(r, at),
            Reading::Unavailable(_) => CpuStats {
                per_core_percent: vec![None; self.cores.len()],
                frequency_mhz: vec![None; self.cores.len()],
                ..CpuStats::default()
            },
            Reading::Abandoned => carried(),
        };
        stats.temperature_celsius = resolve(
            temperature,
            || prev.and_then(|p| p.cpu.temperature_celsius),
            |c, _| valid_temperature(c),
        );
        stats.load = resolve(load, || prev.and_then(|p| p.cpu.load), |l, _| Some(l));
        stats
    }

    /// Windowed percentages for the aggregate line and every registered core.
    fn cpu_from_reading(&mut self, r: CpuReading, at: Instant) -> CpuStats {
        let engine = &mut self.engine;
        let agg = r.times.aggregate;
        let total_rate = engine.observe("cpu.total.all", agg.total(), at);
        let active_rate = engine.observe("cpu.total.active", agg.active(), at);
        let iowait_rate = engine.observe("cpu.total.iowait", agg.iowait, at);

        self.cores.extend(r.times.cores.iter().map(|(index, _)| index));
        let times: HashMap<u32, _> = r.times.cores.iter().copied().collect();
        let freqs: HashMap<u32, Option<f64>> = r.frequencies.iter().copied().collect();

        let mut per_core_percent = Vec::with_capacity(self.cores.len());
        let mut frequency_mhz = Vec::with_capacity(self.cores.len());
        for core in self.cores.iter() {
            per_core_percent.push(times.get(core).map(|t| {
                engine.utilization(
                    &format!("cpu.core.{}.active", core),
                    t.active(),
                    &format!("cpu.core.{}.total", core),
                    t.total(),
                    at,
                )
            }));
            frequency_mhz.push(freqs.get(core).copied().flatten().and_then(valid_frequency));
        }

        CpuStats {
            usage_percent: Some(share_percent(active_rate, total_rate)),
            per_core_percent,
            frequency_mhz,
            iowait_percent: Some(share_percent(iowait_rate, total_rate)),
            temperature_celsius: None,
            load: None,
        }
    }

    fn derive_interfaces(
        &mut self,
        reading: Reading<Vec<EntityCounters<InterfaceCounters>>>,
        prev: Option<&Snapshot>,
    ) -> Vec<InterfaceStats> {
        let unavailable = |reg: &IdentityRegistry<String>| -> Vec<_> {
            reg.iter()
                .map(|name| InterfaceStats {
                    name: name.clone(),
                    traffic: None,
                })
                .collect()
        };
        match reading {
            Reading::Fresh(entities, _) => {
                let engine = &mut self.engine;
                by_registry(&mut self.interfaces, entities, |name, c, at| {
                    interface_traffic(engine, name, c, at)
                })
                .into_iter()
                .map(|(name, traffic)| InterfaceStats { name, traffic })
                .collect()
            }
            Reading::Unavailable(_) => unavailable(&self.interfaces),
            Reading::Abandoned => prev
                .map(|p| p.network.interfaces.clone())
                .unwrap_or_else(|| unavailable(&self.interfaces)),
        }
    }

    fn derive_disks(
        &mut self,
        reading: Reading<Vec<EntityCounters<DiskCounters>>>,
        prev: Option<&Snapshot>,
    ) -> Vec<DiskDeviceStats> {
        let unavailable = |reg: &IdentityRegistry<String>| -> Vec<_> {
            reg.iter()
                .map(|device| DiskDeviceStats {
                    device: device.clone(),
                    throughput: None,
                })
                .collect()
        };
        match reading {
            Reading::Fresh(entities, _) => {
                let engine = &mut self.engine;
                by_registry(&mut self.disks, entities, |device, c, at| {
                    disk_throughput(engine, device, c, at)
                })
                .into_iter()
                .map(|(device, throughput)| DiskDeviceStats { device, throughput })
                .collect()
            }
            Reading::Unavailable(_) => unavailable(&self.disks),
            Reading::Abandoned => prev
                .map(|p| p.storage.devices.clone())
                .unwrap_or_else(|| unavailable(&self.disks)),
        }
    }

    fn derive_processes(
        &mut self,
        reading: Reading<Vec<ProcessReading>>,
        state_counts: Reading<ProcessStateCounts>,
        hold: bool,
        prev: Option<&Snapshot>,
    ) -> ProcessStats {
        let fresh = match reading {
            Reading::Fresh(readings, _) => Some(process::derive_samples(
                readings,
                &mut self.engine,
                self.config.clock_ticks_per_sec,
            )),
            // Enumeration failed: empty list for this tick only.
            Reading::Unavailable(_) => Some(Vec::new()),
            Reading::Abandoned => None,
        };
        let held = hold && prev.is_some();
        let top = match (held, fresh) {
            (false, Some(top)) => top,
            _ => prev.map(|p| p.processes.top.clone()).unwrap_or_default(),
        };
        ProcessStats {
            top,
            held,
            state_counts: resolve(
                state_counts,
                || prev.and_then(|p| p.processes.state_counts),
                |c, _| Some(c),
            ),
        }
    }
}
