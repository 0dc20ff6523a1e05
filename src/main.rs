use anyhow::Result;
use std::sync::Arc;
use sysmon::models::Snapshot;
use sysmon::rate::RateEngine;
use sysmon::sampler::{Sampler, SamplerDeps};
use sysmon::source::ProcfsSource;
use sysmon::*;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

fn summarize(s: &Snapshot) {
    let fmt = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{:.1}", v));
    let (rx, tx) = s
        .network
        .interfaces
        .iter()
        .filter_map(|i| i.traffic.as_ref())
        .fold((0.0, 0.0), |(rx, tx), t| (rx + t.rx_mbps, tx + t.tx_mbps));
    tracing::info!(
        tick = s.tick,
        cpu_percent = %fmt(s.cpu.usage_percent),
        mem_percent = %fmt(s.memory.as_ref().map(|m| m.used_percent)),
        rx_mbps = %format!("{:.2}", rx),
        tx_mbps = %format!("{:.2}", tx),
        processes = s.processes.top.len(),
        held = s.processes.held,
        "snapshot"
    );
    if tracing::enabled!(tracing::Level::DEBUG) {
        match serde_json::to_string(s) {
            Ok(json) => tracing::debug!(snapshot = %json, "snapshot json"),
            Err(e) => tracing::warn!(error = %e, operation = "serialize_snapshot", "snapshot serialization failed"),
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;
    tracing::info!(
        name = version::NAME,
        version = version::VERSION,
        sample_interval_ms = app_config.sampler.sample_interval_ms,
        "starting"
    );

    let source = Arc::new(ProcfsSource::new(&app_config.source));
    let system_info = {
        let source = source.clone();
        tokio::task::spawn_blocking(move || source.system_info()).await?
    };
    tracing::info!(
        os = %system_info.os_name,
        os_version = %system_info.os_version,
        host = %system_info.host_name,
        cpu = %system_info.processor_name,
        cores = system_info.logical_cores,
        "system info"
    );

    let sampler = Sampler::start(
        SamplerDeps {
            source,
            engine: RateEngine::new(),
            system_info,
        },
        &app_config.sampler,
    )
    .await?;
    let mut rx = sampler.subscribe();

    let log_snapshots = async {
        loop {
            match rx.recv().await {
                Ok(snapshot) => summarize(&snapshot),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "snapshot log lagging");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    tokio::select! {
        _ = log_snapshots => {}
        _ = shutdown_signal() => {
            tracing::info!("Received shutdown signal");
        }
    }
    sampler.shutdown().await;
    Ok(())
}
