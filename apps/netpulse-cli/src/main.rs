mod api;

use std::{env, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use async_stream::stream;
use chrono::Duration as ChronoDuration;
use clap::{Parser, Subcommand};
use futures::{pin_mut, Stream, StreamExt};
use netpulse_network::LocalServer;
use netpulse_ops::{ensure_data_dir, init_tracing, MetricsLog};
use netpulse_orchestrator::{FallbackOrchestrator, MetricsOptions};
use netpulse_patterns::HistorySynthesizer;
use netpulse_probe::{HttpProbe, LiveSource, UnavailableSource};
use netpulse_types::{
    config::NetpulseConfig, metrics::MetricSnapshot, query::HistoryRequest,
};
use serde::Serialize;
use tokio::time::Duration;
use tracing::{info, warn};

/// The orchestrator as wired by the binary.
pub type Dashboard = FallbackOrchestrator<Box<dyn LiveSource>, MetricsLog, LocalServer>;

#[derive(Parser)]
#[command(name = "netpulse", version, about = "Network metrics dashboard backend")]
struct Cli {
    /// Path to a TOML config file. Falls back to $NETPULSE_CONFIG, then configs/dev.toml.
    #[arg(long, short)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API.
    Serve,
    /// Print the current reading for an interface.
    Snapshot {
        #[arg(long, default_value = "default")]
        interface: String,
        /// Skip the live source.
        #[arg(long)]
        skip_live: bool,
    },
    /// Print history for an interface.
    History {
        #[arg(long)]
        interface: Option<String>,
        #[arg(long, conflicts_with = "days")]
        hours: Option<u32>,
        #[arg(long)]
        days: Option<u32>,
        /// latency | packet_loss | download_speed | upload_speed
        #[arg(long)]
        metric: Option<String>,
    },
    /// Append a reading to the metrics log.
    Record {
        /// Snapshot or raw probe payload as JSON.
        #[arg(long)]
        json: String,
        #[arg(long)]
        interface: Option<String>,
    },
    /// Poll an interface and print each reading.
    Watch {
        #[arg(long, default_value = "default")]
        interface: String,
        #[arg(long, default_value_t = 5)]
        interval_secs: u64,
        /// Stop after this many readings.
        #[arg(long)]
        count: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config);
    init_tracing(&config.ops)?;
    ensure_data_dir(&config.ops.data_dir)?;

    let dashboard = Arc::new(build_dashboard(&config).await?);
    dashboard.boot().await?;

    match cli.command {
        Command::Serve => serve(dashboard, &config).await?,
        Command::Snapshot {
            interface,
            skip_live,
        } => {
            let options = MetricsOptions {
                skip_live,
                ..Default::default()
            };
            print_json(&dashboard.get_metrics(&interface, options).await)?;
        }
        Command::History {
            interface,
            hours,
            days,
            metric,
        } => {
            let request = HistoryRequest {
                interface,
                hours,
                days,
                metric,
            };
            let history = dashboard.history_for(&request, false).await?;
            print_json(&history)?;
        }
        Command::Record { json, interface } => {
            let payload: serde_json::Value =
                serde_json::from_str(&json).context("--json is not valid JSON")?;
            let entry = match serde_json::from_value::<MetricSnapshot>(payload.clone()) {
                Ok(snapshot) => dashboard.record_metrics(snapshot).await?,
                Err(_) => {
                    dashboard
                        .record_payload(&payload, interface.as_deref())
                        .await?
                }
            };
            print_json(&entry)?;
        }
        Command::Watch {
            interface,
            interval_secs,
            count,
        } => {
            let every = Duration::from_secs(interval_secs.max(1));
            let readings = poll_metrics(&dashboard, &interface, every).take(count.unwrap_or(usize::MAX));
            pin_mut!(readings);
            loop {
                tokio::select! {
                    reading = readings.next() => match reading {
                        Some(snapshot) => print_json(&snapshot)?,
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }
    }
    Ok(())
}

async fn build_dashboard(config: &NetpulseConfig) -> Result<Dashboard> {
    let live: Box<dyn LiveSource> = match config.probe.endpoint {
        Some(_) => Box::new(HttpProbe::new(&config.probe)?),
        None => {
            info!("no probe endpoint configured; live tier disabled");
            Box::new(UnavailableSource::new())
        }
    };

    let retention = ChronoDuration::hours(config.store.retention_hours as i64);
    let store = if config.store.in_memory {
        MetricsLog::in_memory(retention)
    } else {
        match MetricsLog::open(&config.store.log_path, retention).await {
            Ok(log) => log,
            Err(err) => {
                warn!(
                    path = %config.store.log_path,
                    error = %err,
                    "metrics log unavailable; keeping readings in memory"
                );
                MetricsLog::in_memory(retention)
            }
        }
    };

    Ok(FallbackOrchestrator::new(
        config,
        live,
        store,
        LocalServer::new(config.server.event_capacity),
        HistorySynthesizer::default(),
    ))
}

async fn serve(dashboard: Arc<Dashboard>, config: &NetpulseConfig) -> Result<()> {
    let addr = format!("{}:{}", config.server.bind_addr, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Serving metrics API on http://{addr}");
    dashboard.ready(format!("listening on {addr}")).await;
    axum::serve(listener, api::router(dashboard.clone()))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("HTTP server failed")?;
    dashboard.shutdown().await;
    Ok(())
}

/// Periodic refresh is owned here rather than by the orchestrator.
fn poll_metrics<'a>(
    dashboard: &'a Dashboard,
    interface: &'a str,
    every: Duration,
) -> impl Stream<Item = MetricSnapshot> + 'a {
    stream! {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            yield dashboard.get_metrics(interface, MetricsOptions::default()).await;
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_config(cli_path: Option<PathBuf>) -> NetpulseConfig {
    let from_env = env::var("NETPULSE_CONFIG").ok().map(PathBuf::from);
    let path = cli_path
        .or(from_env)
        .unwrap_or_else(|| PathBuf::from("configs/dev.toml"));
    match NetpulseConfig::from_file(&path) {
        Ok(cfg) => {
            if let Err(err) = cfg.validate() {
                eprintln!(
                    "Invalid config in '{}': {err}. Falling back to internal defaults.",
                    path.display()
                );
                default_config()
            } else {
                cfg
            }
        }
        Err(err) => {
            eprintln!(
                "Failed to load config from '{}': {err}. Falling back to internal defaults.",
                path.display()
            );
            default_config()
        }
    }
}

fn default_config() -> NetpulseConfig {
    let config = NetpulseConfig::default();
    debug_assert!(config.validate().is_ok());
    config
}
