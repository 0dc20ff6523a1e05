use serde::Deserialize;
use std::time::Duration;

/// Environment variable naming the TOML config file.
pub const CONFIG_FILE_ENV: &str = "CONFIG_FILE";
/// Environment variable overriding `sampler.sample_interval_ms`.
pub const INTERVAL_ENV: &str = "SYSMON_SAMPLE_INTERVAL_MS";
const DEFAULT_CONFIG_FILE: &str = "sysmon.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sampler: SamplerConfig,
    pub source: SourceConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub sample_interval_ms: u64,
    /// Per-read deadline; defaults to the sample interval.
    pub read_deadline_ms: Option<u64>,
    /// Size of the memory-ranked process list.
    pub process_limit: usize,
    /// Ticks a rate key may go unobserved before its state is dropped.
    pub eviction_ticks: u64,
    /// Snapshots buffered per subscriber before a slow one starts lagging.
    pub broadcast_capacity: usize,
    /// How often to log sampler stats at INFO level.
    pub stats_log_interval_secs: u64,
    /// Mount point whose filesystem usage is reported.
    pub disk_usage_mount: String,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 1000,
            read_deadline_ms: None,
            process_limit: 50,
            eviction_ticks: 5,
            broadcast_capacity: 16,
            stats_log_interval_secs: 60,
            disk_usage_mount: "/".into(),
        }
    }
}

impl SamplerConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn read_deadline(&self) -> Duration {
        Duration::from_millis(self.read_deadline_ms.unwrap_or(self.sample_interval_ms))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub proc_root: String,
    pub sys_root: String,
    /// USER_HZ; 100 on every mainstream Linux build.
    pub clock_ticks_per_sec: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            proc_root: "/proc".into(),
            sys_root: "/sys".into(),
            clock_ticks_per_sec: 100,
        }
    }
}

impl AppConfig {
    /// Load from `CONFIG_FILE` (default `sysmon.toml`). A missing default file yields the
    /// built-in defaults; a missing explicitly named file is an error.
    pub fn load() -> anyhow::Result<Self> {
        let explicit = std::env::var(CONFIG_FILE_ENV).ok();
        let path = explicit.clone().unwrap_or_else(|| DEFAULT_CONFIG_FILE.into());
        let mut config: AppConfig = match std::fs::read_to_string(&path) {
            Ok(s) => toml::from_str(&s)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && explicit.is_none() => {
                tracing::debug!(path = %path, "no config file; using defaults");
                AppConfig::default()
            }
            Err(e) => return Err(anyhow::anyhow!("reading {}: {}", path, e)),
        };
        if let Ok(v) = std::env::var(INTERVAL_ENV) {
            config.sampler.sample_interval_ms = v
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("{} must be an integer, got {:?}: {}", INTERVAL_ENV, v, e))?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let sampler = &self.sampler;
        anyhow::ensure!(
            sampler.sample_interval_ms > 0,
            "sampler.sample_interval_ms must be > 0, got {}",
            sampler.sample_interval_ms
        );
        if let Some(deadline) = sampler.read_deadline_ms {
            anyhow::ensure!(
                deadline > 0 && deadline <= sampler.sample_interval_ms,
                "sampler.read_deadline_ms must be between 1 and sample_interval_ms ({}), got {}",
                sampler.sample_interval_ms,
                deadline
            );
        }
        anyhow::ensure!(
            sampler.process_limit > 0,
            "sampler.process_limit must be > 0, got {}",
            sampler.process_limit
        );
        anyhow::ensure!(
            sampler.eviction_ticks > 0,
            "sampler.eviction_ticks must be > 0, got {}",
            sampler.eviction_ticks
        );
        anyhow::ensure!(
            sampler.broadcast_capacity > 0,
            "sampler.broadcast_capacity must be > 0, got {}",
            sampler.broadcast_capacity
        );
        anyhow::ensure!(
            sampler.stats_log_interval_secs > 0,
            "sampler.stats_log_interval_secs must be > 0, got {}",
            sampler.stats_log_interval_secs
        );
        anyhow::ensure!(
            !sampler.disk_usage_mount.is_empty(),
            "sampler.disk_usage_mount must be non-empty"
        );
        anyhow::ensure!(
            !self.source.proc_root.is_empty(),
            "source.proc_root must be non-empty"
        );
        anyhow::ensure!(
            !self.source.sys_root.is_empty(),
            "source.sys_root must be non-empty"
        );
        anyhow::ensure!(
            self.source.clock_ticks_per_sec > 0,
            "source.clock_ticks_per_sec must be > 0, got {}",
            self.source.clock_ticks_per_sec
        );
        Ok(())
    }
}
