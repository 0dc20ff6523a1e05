// Sampler: fixed-interval tick loop. Reads run on the blocking pool, grouped and bounded
// by the read deadline; the tick task alone feeds the aggregator and publishes.

use crate::aggregator::{
    Aggregator, AggregatorConfig, CpuReading, EntityCounters, GroupStatus, RawTick, Reading,
};
use crate::config::SamplerConfig;
use crate::error::{SamplerError, SourceError};
use crate::models::{Snapshot, SystemInfo};
use crate::process;
use crate::rate::RateEngine;
use crate::source::MetricSource;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, interval};
use tracing::Instrument;

/// Rate limit for the "no subscribers" debug line.
const NO_RECEIVERS_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Shared flag freezing the published process list while set.
#[derive(Debug, Clone, Default)]
pub struct ViewHold(Arc<AtomicBool>);

impl ViewHold {
    pub fn hold(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn release(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    pub fn is_held(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Source, rate state and static info handed to the sampler.
pub struct SamplerDeps {
    pub source: Arc<dyn MetricSource>,
    pub engine: RateEngine,
    pub system_info: SystemInfo,
}

/// Handle to a running sampler task.
pub struct Sampler {
    tx: broadcast::Sender<Arc<Snapshot>>,
    view_hold: ViewHold,
    system_info: Arc<SystemInfo>,
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl Sampler {
    /// Check the config, confirm the source is reachable and start ticking.
    pub async fn start(deps: SamplerDeps, config: &SamplerConfig) -> Result<Self, SamplerError> {
        check_config(config)?;
        let SamplerDeps {
            source,
            engine,
            system_info,
        } = deps;

        let probe_source = source.clone();
        tokio::task::spawn_blocking(move || probe_source.probe())
            .await
            .map_err(|e| SamplerError::FatalInit(SourceError::unavailable("probe", e.to_string())))?
            .map_err(SamplerError::FatalInit)?;

        let (tx, _) = broadcast::channel(config.broadcast_capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let view_hold = ViewHold::default();
        let aggregator = Aggregator::new(
            engine,
            AggregatorConfig {
                eviction_ticks: config.eviction_ticks,
                disk_usage_mount: config.disk_usage_mount.clone(),
                clock_ticks_per_sec: source.clock_ticks_per_sec(),
            },
        );

        let handle = spawn_loop(
            LoopState {
                source,
                aggregator,
                tx: tx.clone(),
                view_hold: view_hold.clone(),
                shutdown_rx,
            },
            config.clone(),
        );

        Ok(Self {
            tx,
            view_hold,
            system_info: Arc::new(system_info),
            shutdown_tx,
            handle,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Snapshot>> {
        self.tx.subscribe()
    }

    pub fn view_hold(&self) -> ViewHold {
        self.view_hold.clone()
    }

    pub fn system_info(&self) -> Arc<SystemInfo> {
        self.system_info.clone()
    }

    /// Stop ticking and wait for the task to exit. All sampler state is dropped.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, operation = "shutdown", "sampler task did not exit cleanly");
        }
    }
}

/// Reject values the tick loop cannot run with. `AppConfig::load` checks these too.
fn check_config(config: &SamplerConfig) -> Result<(), SamplerError> {
    let invalid = |what: &str| Err(SamplerError::InvalidConfig(what.to_string()));
    if config.sample_interval_ms == 0 {
        return invalid("sample_interval_ms must be > 0");
    }
    if config.read_deadline().is_zero() {
        return invalid("read_deadline_ms must be > 0");
    }
    if config.broadcast_capacity == 0 {
        return invalid("broadcast_capacity must be > 0");
    }
    if config.stats_log_interval_secs == 0 {
        return invalid("stats_log_interval_secs must be > 0");
    }
    Ok(())
}

struct LoopState {
    source: Arc<dyn MetricSource>,
    aggregator: Aggregator,
    tx: broadcast::Sender<Arc<Snapshot>>,
    view_hold: ViewHold,
    shutdown_rx: oneshot::Receiver<()>,
}

/// Busy flags, one per read group. A group whose previous read is still running
/// is not issued again.
#[derive(Debug, Default)]
struct InFlight {
    slots: HashMap<&'static str, Arc<AtomicBool>>,
}

impl InFlight {
    fn slot(&mut self, group: &'static str) -> Arc<AtomicBool> {
        self.slots.entry(group).or_default().clone()
    }
}

/// Clears a group's busy flag when the blocking read finishes or is dropped.
struct SlotGuard(Arc<AtomicBool>);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Run one blocking read group on the blocking pool, bounded by `deadline`.
async fn read_group<T, F>(
    source: &Arc<dyn MetricSource>,
    deadline: Duration,
    (group, busy): (&'static str, Arc<AtomicBool>),
    read: F,
) -> Reading<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn MetricSource) -> Result<T, SourceError> + Send + 'static,
{
    if busy.swap(true, Ordering::AcqRel) {
        tracing::trace!(group, "previous read still running; skipped");
        return Reading::Abandoned;
    }
    let guard = SlotGuard(busy);
    let source = source.clone();
    let task = tokio::task::spawn_blocking(move || {
        let _guard = guard;
        read(source.as_ref())
    });
    match tokio::time::timeout(deadline, task).await {
        Ok(Ok(result)) => result.into(),
        Ok(Err(e)) => Reading::Unavailable(SourceError::unavailable("read_group", e.to_string())),
        // The blocking read keeps running and holds the group's slot; its result is discarded.
        Err(_) => Reading::Abandoned,
    }
}

fn read_cpu(s: &dyn MetricSource) -> Result<CpuReading, SourceError> {
    let times = s.cpu_times()?;
    let frequencies = times
        .cores
        .iter()
        .map(|(core, _)| (*core, s.cpu_frequency_mhz(*core).ok()))
        .collect();
    Ok(CpuReading { times, frequencies })
}

fn read_entities<C>(
    names: Vec<String>,
    mut counters: impl FnMut(&str) -> Result<C, SourceError>,
) -> Vec<EntityCounters<C>> {
    names
        .into_iter()
        .map(|name| {
            let counters = match counters(&name) {
                Ok(c) => Some((c, std::time::Instant::now())),
                Err(e) => {
                    tracing::trace!(entity = %name, error = %e, "counters unavailable");
                    None
                }
            };
            EntityCounters { name, counters }
        })
        .collect()
}

/// Issue every read group of one tick concurrently.
async fn collect(
    source: &Arc<dyn MetricSource>,
    in_flight: &mut InFlight,
    deadline: Duration,
    process_limit: usize,
    mount: &str,
) -> RawTick {
    let mount = mount.to_string();
    let mut slot = |group: &'static str| (group, in_flight.slot(group));
    let (
        uptime,
        cpu,
        temperature,
        load,
        context_switches,
        memory,
        swap,
        interfaces,
        connections,
        disks,
        disk_usage,
        file_descriptors,
        battery,
        state_counts,
        processes,
    ) = tokio::join!(
        read_group(source, deadline, slot("uptime"), |s| s.uptime_secs()),
        read_group(source, deadline, slot("cpu"), read_cpu),
        read_group(source, deadline, slot("temperature"), |s| s.cpu_temperature()),
        read_group(source, deadline, slot("load"), |s| s.load_averages()),
        read_group(source, deadline, slot("context_switches"), |s| s.context_switches()),
        read_group(source, deadline, slot("memory"), |s| s.memory()),
        read_group(source, deadline, slot("swap"), |s| s.swap()),
        read_group(source, deadline, slot("interfaces"), |s| {
            let names = s.network_interfaces()?;
            Ok(read_entities(names, |n| s.interface_counters(n)))
        }),
        read_group(source, deadline, slot("connections"), |s| s.connection_count()),
        read_group(source, deadline, slot("disks"), |s| {
            let names = s.disk_devices()?;
            Ok(read_entities(names, |d| s.disk_counters(d)))
        }),
        read_group(source, deadline, slot("disk_usage"), move |s| s.disk_usage(&mount)),
        read_group(source, deadline, slot("file_descriptors"), |s| s.file_descriptors()),
        read_group(source, deadline, slot("battery"), |s| s.battery()),
        read_group(source, deadline, slot("state_counts"), |s| s.process_state_counts()),
        read_group(source, deadline, slot("processes"), move |s| process::scan(s, process_limit)),
    );
    RawTick {
        uptime,
        cpu,
        temperature,
        load,
        context_switches,
        memory,
        swap,
        interfaces,
        connections,
        disks,
        disk_usage,
        file_descriptors,
        battery,
        state_counts,
        processes,
    }
}

#[derive(Debug, Default)]
struct GroupHealth {
    ever_fresh: bool,
    failing: bool,
}

/// Per-group transition logging: one line when a group starts failing, one on recovery.
#[derive(Debug, Default)]
struct HealthLog {
    groups: HashMap<&'static str, GroupHealth>,
}

impl HealthLog {
    fn record(&mut self, raw: &RawTick) -> usize {
        let mut abandoned = 0;
        for (group, status, reason) in raw.group_statuses() {
            let health = self.groups.entry(group).or_default();
            match status {
                GroupStatus::Fresh => {
                    if health.failing && health.ever_fresh {
                        tracing::info!(group, "metric group recovered");
                    }
                    health.failing = false;
                    health.ever_fresh = true;
                }
                GroupStatus::Unavailable | GroupStatus::Abandoned => {
                    if status == GroupStatus::Abandoned {
                        abandoned += 1;
                    }
                    if !health.failing {
                        let reason = reason.unwrap_or_else(|| "read deadline exceeded".into());
                        if health.ever_fresh {
                            tracing::warn!(group, reason = %reason, "metric group failing");
                        } else {
                            tracing::debug!(group, reason = %reason, "metric group unavailable");
                        }
                    }
                    health.failing = true;
                }
            }
        }
        abandoned
    }
}

fn spawn_loop(state: LoopState, config: SamplerConfig) -> JoinHandle<()> {
    let LoopState {
        source,
        mut aggregator,
        tx,
        view_hold,
        mut shutdown_rx,
    } = state;
    let deadline = config.read_deadline();
    let sample_interval = config.sample_interval();
    let stats_log_interval = Duration::from_secs(config.stats_log_interval_secs);

    let sampler_span = tracing::span!(
        tracing::Level::DEBUG,
        "sampler",
        sample_interval_ms = config.sample_interval_ms
    );

    let run = async move {
        let mut tick = interval(sample_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut stats_log_tick = interval(stats_log_interval);
        stats_log_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut health = HealthLog::default();
        let mut in_flight = InFlight::default();
        let mut ticks_total: u64 = 0;
        let mut abandoned_total: u64 = 0;
        let mut last_no_receivers_log: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let raw = collect(
                        &source,
                        &mut in_flight,
                        deadline,
                        config.process_limit,
                        &config.disk_usage_mount,
                    )
                    .await;
                    abandoned_total += health.record(&raw) as u64;
                    let snapshot = aggregator.assemble(raw, view_hold.is_held());
                    ticks_total += 1;
                    tracing::trace!(tick = snapshot.tick, "snapshot assembled");

                    if tx.send(snapshot).is_err() {
                        let should_log = last_no_receivers_log
                            .is_none_or(|t| t.elapsed() >= NO_RECEIVERS_LOG_INTERVAL);
                        if should_log {
                            tracing::debug!(
                                operation = "broadcast_snapshot",
                                "No subscribers; broadcast channel has no receivers"
                            );
                            last_no_receivers_log = Some(Instant::now());
                        }
                    }
                }
                _ = &mut shutdown_rx => {
                    tracing::debug!("Sampler shutting down");
                    break;
                }
                _ = stats_log_tick.tick() => {
                    tracing::info!(
                        ticks_total,
                        abandoned_reads_total = abandoned_total,
                        evicted_keys_total = aggregator.evicted_total(),
                        rate_keys = aggregator.engine().len(),
                        subscribers = tx.receiver_count(),
                        "sampler stats"
                    );
                }
            }
        }
    };
    tokio::spawn(run.instrument(sampler_span))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_hold_is_shared_between_clones() {
        let hold = ViewHold::default();
        let other = hold.clone();
        assert!(!other.is_held());
        hold.hold();
        assert!(other.is_held());
        other.release();
        assert!(!hold.is_held());
    }

    #[test]
    fn in_flight_slot_is_per_group_and_cleared_on_drop() {
        let mut in_flight = InFlight::default();
        let battery = in_flight.slot("battery");
        assert!(!battery.swap(true, Ordering::AcqRel));
        assert!(in_flight.slot("battery").load(Ordering::Acquire));
        assert!(!in_flight.slot("memory").load(Ordering::Acquire));

        drop(SlotGuard(battery));
        assert!(!in_flight.slot("battery").load(Ordering::Acquire));
    }

    #[test]
    fn health_log_counts_abandoned_groups() {
        let mut log = HealthLog::default();
        let raw = RawTick {
            uptime: Reading::Abandoned,
            memory: Reading::Abandoned,
            swap: Reading::fresh(Default::default()),
            ..RawTick::default()
        };
        assert_eq!(log.record(&raw), 2);
        assert!(log.groups["swap"].ever_fresh);
        assert!(log.groups["uptime"].failing);
        assert!(!log.groups["uptime"].ever_fresh);
    }
}
