// Process registry: enumerate, filter, rank by resident memory, attach per-process
// details. Reading (`scan`) and rate derivation (`derive_samples`) are split so reads can
// run on the blocking pool while the rate engine stays single-writer.

use crate::error::SourceError;
use crate::models::{BYTES_PER_MB, ProcessSample, ProcessState};
use crate::rate::RateEngine;
use crate::source::{MetricSource, ProcessIo, ProcessStatus};
use std::time::Instant;
use tracing::trace;

/// Raw reads for one retained process. Detail fields are `None` when that read failed.
#[derive(Debug, Clone)]
pub struct ProcessReading {
    pub pid: u32,
    pub name: String,
    pub state: char,
    pub rss_kb: u64,
    pub cpu_ticks: Option<(u64, Instant)>,
    pub io: Option<(ProcessIo, Instant)>,
    pub fd_count: Option<u32>,
}

/// Enumerate processes and keep the `limit` largest by resident memory.
///
/// Processes whose status is unreadable or whose RSS is zero are skipped. A detail read
/// reporting the process gone drops it and the next largest takes its place; any other
/// detail failure leaves a `None` in that field only. Fails only when the process list itself cannot be read.
pub fn scan(source: &dyn MetricSource, limit: usize) -> Result<Vec<ProcessReading>, SourceError> {
    let pids = source.list_pids()?;

    let mut candidates: Vec<(u32, ProcessStatus)> = pids
        .into_iter()
        .filter_map(|pid| match source.process_status(pid) {
            Ok(status) if status.rss_kb > 0 => Some((pid, status)),
            Ok(_) => None,
            Err(e) => {
                trace!(pid, error = %e, "skipping process");
                None
            }
        })
        .collect();

    // Stable: ties keep ascending pid order.
    candidates.sort_by(|a, b| b.1.rss_kb.cmp(&a.1.rss_kb));

    // A process that vanishes mid-read frees its place for the next candidate.
    let mut readings = Vec::with_capacity(limit.min(candidates.len()));
    for (pid, status) in candidates {
        if readings.len() == limit {
            break;
        }
        let cpu_ticks = match source.process_cpu_ticks(pid) {
            Ok(ticks) => Some((ticks, Instant::now())),
            Err(e) if e.is_vanished() => continue,
            Err(e) => {
                trace!(pid, error = %e, "process cpu unavailable");
                None
            }
        };
        let io = match source.process_io(pid) {
            Ok(io) => Some((io, Instant::now())),
            Err(e) if e.is_vanished() => continue,
            Err(e) => {
                trace!(pid, error = %e, "process io unavailable");
                None
            }
        };
        let fd_count = match source.process_fd_count(pid) {
            Ok(n) => Some(n),
            Err(e) if e.is_vanished() => continue,
            Err(e) => {
                trace!(pid, error = %e, "process fd count unavailable");
                None
            }
        };
        readings.push(ProcessReading {
            pid,
            name: status.name,
            state: status.state,
            rss_kb: status.rss_kb,
            cpu_ticks,
            io,
            fd_count,
        });
    }
    Ok(readings)
}

/// Turn readings into samples, feeding CPU ticks and I/O bytes through the rate engine
/// under `proc.<pid>.cpu` and `proc.<pid>.io`.
///
/// CPU percent is relative to one core, so multi-threaded processes can exceed 100.
pub fn derive_samples(
    readings: Vec<ProcessReading>,
    engine: &mut RateEngine,
    clock_ticks_per_sec: u64,
) -> Vec<ProcessSample> {
    let hz = clock_ticks_per_sec.max(1) as f64;
    readings
        .into_iter()
        .map(|r| {
            let cpu_percent = r.cpu_ticks.map(|(ticks, at)| {
                engine.observe(&format!("proc.{}.cpu", r.pid), ticks, at) / hz * 100.0
            });
            let disk_io_mb_per_sec = r.io.map(|(io, at)| {
                engine.observe(&format!("proc.{}.io", r.pid), io.total(), at) / BYTES_PER_MB
            });
            ProcessSample {
                pid: r.pid,
                name: r.name,
                state: ProcessState::from_code(r.state),
                memory_mb: r.rss_kb as f64 / 1024.0,
                cpu_percent,
                disk_io_bytes: r.io.map(|(io, _)| io.total()),
                disk_io_mb_per_sec,
                fd_count: r.fd_count,
            }
        })
        .collect()
}
