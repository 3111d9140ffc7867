//! Vigil - headless monitor for a detection telemetry feed
//!
//! Connects to a WebSocket feed of detection events, keeps rolling aggregates
//! and prints a periodic status block until interrupted.

mod diagnostics_layer;
mod settings;
mod status;

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn, Level};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};
use vigil_protocol::write_csv;
use vigil_sim::FeedServer;
use vigil_telemetry::{ConnectionManager, MonitorHandle, Order, WebSocketTransport};

use diagnostics_layer::{DiagnosticsLayer, DiagnosticsLog, ProjectCrateFilter};
use settings::Settings;

/// Warnings kept between status blocks
const DIAGNOSTIC_HISTORY: usize = 50;

#[derive(Debug, Parser)]
#[clap(name = "vigil", version, about = "Monitor a detection telemetry feed")]
struct Cli {
    /// Settings file (defaults to ~/.config/vigil/settings.json)
    #[clap(short, long, env = "VIGIL_CONFIG")]
    config: Option<PathBuf>,

    /// Feed endpoint, overriding the settings file
    #[clap(short, long, env = "VIGIL_FEED_URL")]
    url: Option<String>,

    /// Serve a simulated feed in-process and monitor it
    #[clap(long)]
    simulate: bool,

    /// Write buffered events as CSV to this file on exit
    #[clap(short, long)]
    export: Option<PathBuf>,

    /// Seconds between status blocks
    #[clap(long)]
    status_interval: Option<u64>,

    /// Print each status as a JSON snapshot instead of text
    #[clap(long)]
    json: bool,

    /// Write the effective settings to the settings file and exit
    #[clap(long)]
    save_settings: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let diagnostics = DiagnosticsLog::new(DIAGNOSTIC_HISTORY);
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "vigil=info,vigil_protocol=info,vigil_telemetry=info,vigil_sim=info".into()
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            DiagnosticsLayer::new(diagnostics.clone())
                .with_filter(ProjectCrateFilter::new(Level::WARN)),
        )
        .init();

    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load(),
    };
    if let Some(url) = &cli.url {
        settings.connection.url = url.clone();
    }
    if let Some(secs) = cli.status_interval {
        settings.status_interval_secs = secs;
    }
    if cli.export.is_some() {
        settings.export_path = cli.export.clone();
    }

    if cli.save_settings {
        let path = settings.save(cli.config.as_deref())?;
        info!("Saved settings to {}", path.display());
        return Ok(());
    }

    let server = if cli.simulate {
        let server = FeedServer::bind(settings.simulation.clone())
            .await
            .context("failed to start simulated feed")?;
        settings.connection.url = server.url();
        Some(server)
    } else {
        None
    };

    let (monitor, monitor_task) = MonitorHandle::spawn(settings.telemetry.clone());
    let transport = WebSocketTransport::new(settings.connection.url.clone());
    let (connection, connection_task) =
        ConnectionManager::spawn(transport, settings.connection.clone(), &monitor);
    info!("Monitoring {}", settings.connection.url);
    connection.connect();

    run_status_loop(&cli, &settings, &monitor, &connection, &diagnostics).await?;

    connection.shutdown();
    if let Err(e) = connection_task.await {
        warn!("Connection task ended abnormally: {}", e);
    }

    if let Some(path) = &settings.export_path {
        let rows = export_buffer(&monitor, settings.telemetry.buffer_capacity, path).await?;
        info!("Exported {} events to {}", rows, path.display());
    }

    monitor.shutdown().await?;
    if let Err(e) = monitor_task.await {
        warn!("Monitor task ended abnormally: {}", e);
    }
    if let Some(server) = server {
        server.shutdown().await;
    }

    Ok(())
}

/// Stream the buffered events to `path` as CSV, oldest first
async fn export_buffer(monitor: &MonitorHandle, capacity: usize, path: &Path) -> Result<usize> {
    let events = monitor.recent(capacity, Order::OldestFirst).await?;
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    write_csv(BufWriter::new(file), events.iter().map(|event| event.as_ref()))
        .with_context(|| format!("failed to write {}", path.display()))
}

/// Print status blocks and connection changes until Ctrl-C
async fn run_status_loop(
    cli: &Cli,
    settings: &Settings,
    monitor: &MonitorHandle,
    connection: &ConnectionManager,
    diagnostics: &DiagnosticsLog,
) -> Result<()> {
    let mut status_timer = interval(Duration::from_secs(settings.status_interval_secs.max(1)));
    status_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut status_rx = connection.watch_status();
    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = status_timer.tick() => {
                let snapshot = monitor.get_snapshot();
                if cli.json {
                    println!("{}", serde_json::to_string(&*snapshot)?);
                } else {
                    print!(
                        "{}",
                        status::format_status(&snapshot, &connection.status(), &connection.stats())
                    );
                    for event in diagnostics.drain() {
                        println!("  ! {} {}: {}", event.level, event.source, event.message);
                    }
                }
            }
            changed = status_rx.changed() => {
                if changed.is_err() {
                    warn!("Connection manager stopped");
                    return Ok(());
                }
                let label = status::connection_label(&status_rx.borrow_and_update());
                info!("Feed {}", label);
            }
            result = &mut ctrl_c => {
                result.context("failed to listen for Ctrl-C")?;
                info!("Shutting down");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use vigil_protocol::{DetectionEvent, CSV_HEADER};
    use vigil_telemetry::TelemetryConfig;

    use super::*;

    #[tokio::test]
    async fn test_export_buffer_writes_csv_oldest_first() {
        let (monitor, _task) = MonitorHandle::spawn(TelemetryConfig::default());
        let ts = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let flagged =
            DetectionEvent::new("it_bot", 0.9, true, 120.0, ts).with_text("q, with comma", "o");
        monitor.ingest(flagged).await.unwrap();
        monitor
            .ingest(DetectionEvent::new("hr_bot", 0.1, false, 80.0, ts))
            .await
            .unwrap();

        let dir = std::env::temp_dir().join(format!("vigil-export-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("events.csv");

        let rows = export_buffer(&monitor, 100, &path).await.unwrap();
        assert_eq!(rows, 2);

        let csv = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert!(lines[1].contains("it_bot"));
        assert!(lines[1].contains("\"q, with comma\""));
        assert!(lines[2].contains("hr_bot"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
