// Parsers for /proc and /sys text formats. Pure functions so they can be unit tested
// against captured file contents.

use super::{
    CpuTimes, CpuTimesReading, DiskCounters, FdReading, ProcessIo, ProcessStatus,
};
use crate::error::SourceError;
use crate::models::LoadAverages;

fn parse_u64(metric: &'static str, s: &str) -> Result<u64, SourceError> {
    s.trim()
        .parse::<u64>()
        .map_err(|e| SourceError::malformed(metric, format!("{:?}: {}", s, e)))
}

fn parse_f64(metric: &'static str, s: &str) -> Result<f64, SourceError> {
    s.trim()
        .parse::<f64>()
        .map_err(|e| SourceError::malformed(metric, format!("{:?}: {}", s, e)))
}

fn cpu_times_from_fields<'a>(
    mut fields: impl Iterator<Item = &'a str>,
) -> Result<CpuTimes, SourceError> {
    let mut values = [0u64; 8];
    let mut count = 0;
    for (slot, field) in values.iter_mut().zip(fields.by_ref()) {
        *slot = parse_u64("cpu.times", field)?;
        count += 1;
    }
    if count < 4 {
        return Err(SourceError::malformed(
            "cpu.times",
            format!("expected at least 4 columns, got {}", count),
        ));
    }
    let [user, nice, system, idle, iowait, irq, softirq, steal] = values;
    Ok(CpuTimes {
        user,
        nice,
        system,
        idle,
        iowait,
        irq,
        softirq,
        steal,
    })
}

/// Aggregate and per-core tick breakdown from /proc/stat.
pub(super) fn parse_cpu_times(stat: &str) -> Result<CpuTimesReading, SourceError> {
    let mut aggregate = None;
    let mut cores = Vec::new();
    for line in stat.lines() {
        let mut fields = line.split_whitespace();
        let Some(label) = fields.next() else {
            continue;
        };
        if label == "cpu" {
            aggregate = Some(cpu_times_from_fields(fields)?);
        } else if let Some(index) = label.strip_prefix("cpu")
            && let Ok(index) = index.parse::<u32>()
        {
            cores.push((index, cpu_times_from_fields(fields)?));
        }
    }
    let aggregate =
        aggregate.ok_or_else(|| SourceError::malformed("cpu.times", "no aggregate cpu line"))?;
    cores.sort_by_key(|(index, _)| *index);
    Ok(CpuTimesReading { aggregate, cores })
}

/// Cumulative context switch count (`ctxt` line of /proc/stat).
pub(super) fn parse_context_switches(stat: &str) -> Result<u64, SourceError> {
    stat.lines()
        .find_map(|line| line.strip_prefix("ctxt "))
        .ok_or_else(|| SourceError::malformed("ctxt", "no ctxt line"))
        .and_then(|v| parse_u64("ctxt", v))
}

/// Value in kB of `key` in /proc/meminfo, e.g. `meminfo_kb(s, "MemTotal")`.
pub(super) fn meminfo_kb(meminfo: &str, key: &str) -> Option<u64> {
    meminfo.lines().find_map(|line| {
        let rest = line.strip_prefix(key)?.strip_prefix(':')?;
        rest.split_whitespace().next()?.parse().ok()
    })
}

pub(super) fn parse_uptime(uptime: &str) -> Result<f64, SourceError> {
    let first = uptime
        .split_whitespace()
        .next()
        .ok_or_else(|| SourceError::malformed("uptime", "empty"))?;
    parse_f64("uptime", first)
}

pub(super) fn parse_loadavg(loadavg: &str) -> Result<LoadAverages, SourceError> {
    let mut fields = loadavg.split_whitespace();
    let mut next = || {
        fields
            .next()
            .ok_or_else(|| SourceError::malformed("loadavg", "too few fields"))
            .and_then(|v| parse_f64("loadavg", v))
    };
    Ok(LoadAverages {
        one: next()?,
        five: next()?,
        fifteen: next()?,
    })
}

/// /proc/sys/fs/file-nr: "allocated unused max".
pub(super) fn parse_file_nr(file_nr: &str) -> Result<FdReading, SourceError> {
    let fields: Vec<&str> = file_nr.split_whitespace().collect();
    if fields.len() < 3 {
        return Err(SourceError::malformed("file-nr", file_nr.trim().to_string()));
    }
    Ok(FdReading {
        allocated: parse_u64("file-nr", fields[0])?,
        max: parse_u64("file-nr", fields[2])?,
    })
}

/// Name, state and VmRSS from /proc/<pid>/status.
pub(super) fn parse_status(status: &str) -> Result<ProcessStatus, SourceError> {
    let mut name = None;
    let mut state = '?';
    let mut rss_kb = 0;
    for line in status.lines() {
        if let Some(v) = line.strip_prefix("Name:") {
            name = Some(v.trim().to_string());
        } else if let Some(v) = line.strip_prefix("State:") {
            state = v.trim().chars().next().unwrap_or('?');
        } else if let Some(v) = line.strip_prefix("VmRSS:") {
            rss_kb = v
                .split_whitespace()
                .next()
                .and_then(|n| n.parse().ok())
                .unwrap_or(0);
        }
    }
    let name = name.ok_or_else(|| SourceError::malformed("proc.status", "no Name line"))?;
    Ok(ProcessStatus {
        name,
        state,
        rss_kb,
    })
}

/// Fields of /proc/<pid>/stat after the parenthesised command name, which may itself
/// contain spaces and parentheses.
fn stat_fields_after_comm(stat: &str) -> Option<Vec<&str>> {
    let close = stat.rfind(')')?;
    Some(stat[close + 1..].split_whitespace().collect())
}

/// Single-letter state (field 3) of /proc/<pid>/stat.
pub(super) fn parse_stat_state(stat: &str) -> Option<char> {
    stat_fields_after_comm(stat)?.first()?.chars().next()
}

/// utime + stime (fields 14 and 15) of /proc/<pid>/stat.
pub(super) fn parse_stat_cpu_ticks(stat: &str) -> Result<u64, SourceError> {
    let fields = stat_fields_after_comm(stat)
        .ok_or_else(|| SourceError::malformed("proc.stat", "no command name"))?;
    // Field 3 is index 0 here.
    let utime = fields
        .get(11)
        .ok_or_else(|| SourceError::malformed("proc.stat", "missing utime"))?;
    let stime = fields
        .get(12)
        .ok_or_else(|| SourceError::malformed("proc.stat", "missing stime"))?;
    Ok(parse_u64("proc.stat", utime)? + parse_u64("proc.stat", stime)?)
}

/// read_bytes / write_bytes of /proc/<pid>/io.
pub(super) fn parse_io(io: &str) -> Result<ProcessIo, SourceError> {
    let mut read = None;
    let mut write = None;
    for line in io.lines() {
        if let Some(v) = line.strip_prefix("read_bytes:") {
            read = Some(parse_u64("proc.io", v)?);
        } else if let Some(v) = line.strip_prefix("write_bytes:") {
            write = Some(parse_u64("proc.io", v)?);
        }
    }
    match (read, write) {
        (Some(read_bytes), Some(write_bytes)) => Ok(ProcessIo {
            read_bytes,
            write_bytes,
        }),
        _ => Err(SourceError::malformed("proc.io", "missing read/write bytes")),
    }
}

/// Sector counters (fields 3 and 7) of /sys/block/<dev>/stat.
pub(super) fn parse_block_stat(stat: &str) -> Result<DiskCounters, SourceError> {
    let fields: Vec<&str> = stat.split_whitespace().collect();
    if fields.len() < 7 {
        return Err(SourceError::malformed(
            "block.stat",
            format!("expected at least 7 fields, got {}", fields.len()),
        ));
    }
    Ok(DiskCounters {
        sectors_read: parse_u64("block.stat", fields[2])?,
        sectors_written: parse_u64("block.stat", fields[6])?,
    })
}

/// Socket entries in /proc/net/tcp or tcp6 (every non-empty line after the header).
pub(super) fn count_socket_entries(table: &str) -> u32 {
    table
        .lines()
        .skip(1)
        .filter(|l| !l.trim().is_empty())
        .count() as u32
}

/// First "model name" from /proc/cpuinfo.
pub(super) fn parse_cpu_model(cpuinfo: &str) -> Option<String> {
    cpuinfo.lines().find_map(|line| {
        if !line.starts_with("model name") {
            return None;
        }
        line.find(": ")
            .map(|i| line[i + 2..].trim())
            .filter(|s| !s.is_empty() && *s != "cpu0")
            .map(str::to_string)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT: &str = "cpu  100 0 50 850 0 0 0 0 0 0
cpu0 60 0 30 410 0 0 0 0 0 0
cpu1 40 0 20 440 0 0 0 0 0 0
intr 12345 0 0
ctxt 987654
btime 1700000000
processes 4242
";

    #[test]
    fn cpu_times_aggregate_and_cores() {
        let r = parse_cpu_times(STAT).unwrap();
        assert_eq!(r.aggregate.user, 100);
        assert_eq!(r.aggregate.system, 50);
        assert_eq!(r.aggregate.idle, 850);
        assert_eq!(r.aggregate.active(), 150);
        assert_eq!(r.aggregate.total(), 1000);
        assert_eq!(r.cores.len(), 2);
        assert_eq!(r.cores[1].0, 1);
        assert_eq!(r.cores[1].1.user, 40);
    }

    #[test]
    fn cpu_times_short_line_fills_zero() {
        let r = parse_cpu_times("cpu 1 2 3 4\n").unwrap();
        assert_eq!(r.aggregate.iowait, 0);
        assert_eq!(r.aggregate.total(), 10);
        assert!(r.cores.is_empty());
    }

    #[test]
    fn cpu_times_without_aggregate_is_malformed() {
        assert!(parse_cpu_times("ctxt 5\n").is_err());
    }

    #[test]
    fn context_switches_from_stat() {
        assert_eq!(parse_context_switches(STAT).unwrap(), 987654);
        assert!(parse_context_switches("cpu 1 2 3 4\n").is_err());
    }

    #[test]
    fn meminfo_lookup_is_exact_key() {
        let meminfo = "MemTotal:       16000000 kB\nSwapCached:        100 kB\nCached:          2000 kB\n";
        assert_eq!(meminfo_kb(meminfo, "MemTotal"), Some(16_000_000));
        assert_eq!(meminfo_kb(meminfo, "Cached"), Some(2000));
        assert_eq!(meminfo_kb(meminfo, "Shmem"), None);
    }

    #[test]
    fn uptime_loadavg_file_nr() {
        assert_eq!(parse_uptime("12345.67 54321.00\n").unwrap(), 12345.67);
        let load = parse_loadavg("0.52 0.58 0.59 1/467 12345\n").unwrap();
        assert_eq!(load.five, 0.58);
        let fd = parse_file_nr("10240\t0\t9223372036854775807\n").unwrap();
        assert_eq!(fd.allocated, 10240);
        assert_eq!(fd.max, 9_223_372_036_854_775_807);
        assert!(parse_loadavg("0.1 0.2").is_err());
    }

    #[test]
    fn status_with_and_without_rss() {
        let s = "Name:\tfirefox\nUmask:\t0022\nState:\tS (sleeping)\nVmRSS:\t  524288 kB\n";
        let p = parse_status(s).unwrap();
        assert_eq!(p.name, "firefox");
        assert_eq!(p.state, 'S');
        assert_eq!(p.rss_kb, 524288);

        let kthread = parse_status("Name:\tkworker/0:1\nState:\tI (idle)\n").unwrap();
        assert_eq!(kthread.rss_kb, 0);
        assert_eq!(kthread.state, 'I');
    }

    #[test]
    fn stat_handles_parens_in_command() {
        let stat = "1234 (my (weird) proc) R 1 1234 1234 0 -1 4194560 100 0 0 0 250 75 0 0 20 0 1 0 100 1000 50";
        assert_eq!(parse_stat_state(stat), Some('R'));
        assert_eq!(parse_stat_cpu_ticks(stat).unwrap(), 325);
        assert!(parse_stat_cpu_ticks("1234 (x) R 1").is_err());
    }

    #[test]
    fn io_requires_both_counters() {
        let io = "rchar: 100\nwchar: 200\nread_bytes: 4096\nwrite_bytes: 8192\n";
        assert_eq!(parse_io(io).unwrap().total(), 12288);
        assert!(parse_io("rchar: 1\n").is_err());
    }

    #[test]
    fn block_stat_sectors() {
        let stat = "  1000   20  4096   300   500   10  8192   400    0   600   700\n";
        let c = parse_block_stat(stat).unwrap();
        assert_eq!(c.sectors_read, 4096);
        assert_eq!(c.sectors_written, 8192);
        assert!(parse_block_stat("1 2 3").is_err());
    }

    #[test]
    fn socket_table_skips_header() {
        let tcp = "  sl  local_address rem_address   st\n   0: 0100007F:0277 00000000:0000 0A\n   1: 0100007F:1F90 00000000:0000 0A\n";
        assert_eq!(count_socket_entries(tcp), 2);
        assert_eq!(count_socket_entries(""), 0);
    }

    #[test]
    fn cpu_model_skips_placeholder() {
        assert_eq!(
            parse_cpu_model("processor\t: 0\nmodel name\t: AMD Ryzen 7 5800X\n").as_deref(),
            Some("AMD Ryzen 7 5800X")
        );
        assert_eq!(parse_cpu_model("model name\t: cpu0\n"), None);
    }
}
