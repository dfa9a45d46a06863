//! ---
//! msf_section: "01-core-functionality"
//! msf_subsection: "binary"
//! msf_type: "source"
//! msf_scope: "code"
//! msf_description: "Binary entrypoint for the MSF failover daemon."
//! msf_version: "v0.1.0"
//! msf_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use msf_common::config::AppConfig;
use msf_common::logging::init_tracing;
use msf_common::time::SystemClock;
use msf_metrics::{new_registry, spawn_http_server, DaemonMetrics};
use msf_redundancy::{
    notifier_from_config, DockerRuntime, FailoverEngine, FailoverMetrics, FileStateStore,
    ModeStore,
};
use tokio::signal;
use tracing::info;

#[derive(Debug, Parser)]
#[command(author, version, about = "Media server failover daemon", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the failover loop until SIGINT/SIGTERM")]
    Run,
    #[command(about = "Run a single tick and print its report as JSON")]
    Once,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("/etc/msf/msf.toml"));
    candidates.push(PathBuf::from("configs/msf.example.toml"));

    let load_started = Instant::now();
    let loaded = AppConfig::load_with_source(&candidates)?;
    let config = loaded.config;
    let load_duration = load_started.elapsed();

    init_tracing("msfd", &config.logging)?;
    info!(source = %loaded.source.display(), "configuration loaded");

    let registry = new_registry();
    let daemon_metrics = DaemonMetrics::new(&registry)?;
    daemon_metrics.observe_config_load(load_duration.as_secs_f64());
    daemon_metrics.inc_start();

    let store = Arc::new(FileStateStore::open(&config.state.directory).with_context(|| {
        format!(
            "failed to create state directory {}",
            config.state.directory.display()
        )
    })?);
    if ModeStore::new(store.clone()).ensure_default()? {
        info!(directory = %config.state.directory.display(), "no mode persisted; defaulted to auto");
    }

    let runtime = Arc::new(DockerRuntime::new(config.runtime.binary.clone()));
    let notifier = notifier_from_config(&config.notify);
    let engine = FailoverEngine::from_config(
        &config,
        runtime,
        store,
        notifier,
        Arc::new(SystemClock),
    )?
    .with_metrics(FailoverMetrics::register(&registry)?);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_daemon(&config, engine, registry).await?,
        Commands::Once => {
            let mut engine = engine;
            let report = engine.tick().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

async fn run_daemon(
    config: &AppConfig,
    mut engine: FailoverEngine,
    registry: msf_metrics::SharedRegistry,
) -> Result<()> {
    let signals = ShutdownSignals::install()?;
    let metrics_server = if config.metrics.enabled {
        let server = spawn_http_server(registry, config.metrics.listen).await?;
        info!(address = %server.addr(), "metrics exporter enabled");
        Some(server)
    } else {
        info!("metrics exporter disabled by configuration");
        None
    };

    engine.run(signals.recv()).await;

    if let Some(server) = metrics_server {
        server.shutdown().await?;
    }
    info!("msfd stopped");
    Ok(())
}

/// Termination listeners registered up front, so a signal that arrives while
/// a tick is still running is queued instead of killing the process.
struct ShutdownSignals {
    #[cfg(unix)]
    interrupt: signal::unix::Signal,
    #[cfg(unix)]
    terminate: signal::unix::Signal,
}

impl ShutdownSignals {
    #[cfg(unix)]
    fn install() -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())
                .context("failed to install SIGINT handler")?,
            terminate: signal(SignalKind::terminate())
                .context("failed to install SIGTERM handler")?,
        })
    }

    #[cfg(not(unix))]
    fn install() -> Result<Self> {
        Ok(Self {})
    }

    #[cfg(unix)]
    async fn recv(mut self) {
        tokio::select! {
            _ = self.interrupt.recv() => info!("SIGINT received"),
            _ = self.terminate.recv() => info!("SIGTERM received"),
        }
    }

    #[cfg(not(unix))]
    async fn recv(self) {
        if let Err(err) = signal::ctrl_c().await {
            tracing::warn!(?err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Ctrl+C received");
    }
}
