//! ---
//! msf_section: "03-persistence-logging"
//! msf_subsection: "module"
//! msf_type: "source"
//! msf_scope: "code"
//! msf_description: "Metrics collection and export utilities."
//! msf_version: "v0.1.0"
//! msf_owner: "tbd"
//! ---
//! Prometheus registry shared by the daemon and the failover engine, plus a
//! small axum exporter serving it in text format.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

pub type SharedRegistry = Arc<Registry>;

pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Encode every registered family in the Prometheus text format.
pub fn render(registry: &Registry) -> Result<String> {
    TextEncoder::new()
        .encode_to_string(&registry.gather())
        .context("failed to encode metrics")
}

fn router(registry: SharedRegistry) -> Router {
    Router::new()
        .route("/metrics", get(scrape))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(registry)
}

async fn scrape(State(registry): State<SharedRegistry>) -> Response {
    match render(&registry) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "metrics scrape failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding error").into_response()
        }
    }
}

/// Bind `addr` and serve the registry until [`MetricsServer::shutdown`].
/// Port `0` picks an ephemeral port; read it back with [`MetricsServer::addr`].
pub async fn spawn_http_server(registry: SharedRegistry, addr: SocketAddr) -> Result<MetricsServer> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind metrics listener {addr}"))?;
    let bound = listener
        .local_addr()
        .context("failed to read metrics listener address")?;
    info!(address = %bound, "metrics exporter listening");

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        axum::serve(listener, router(registry))
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .await
            .context("metrics exporter terminated with an error")
    });

    Ok(MetricsServer {
        addr: bound,
        stop: Some(stop_tx),
        task,
    })
}

/// Handle to the running exporter.
#[derive(Debug)]
pub struct MetricsServer {
    addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl MetricsServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections and wait for in-flight scrapes to finish.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.task.await.context("metrics exporter task panicked")??;
        debug!(address = %self.addr, "metrics exporter stopped");
        Ok(())
    }
}

/// Process-level counters for `msfd`.
#[derive(Clone)]
pub struct DaemonMetrics {
    starts: IntCounter,
    config_load: Histogram,
}

impl DaemonMetrics {
    pub fn new(registry: &Registry) -> Result<Self> {
        let starts = IntCounter::with_opts(Opts::new(
            "msfd_starts_total",
            "Times the failover daemon has started",
        ))?;
        let config_load = Histogram::with_opts(
            HistogramOpts::new(
                "msfd_config_load_seconds",
                "Time spent reading and validating the configuration file",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;
        registry.register(Box::new(starts.clone()))?;
        registry.register(Box::new(config_load.clone()))?;
        Ok(Self {
            starts,
            config_load,
        })
    }

    pub fn inc_start(&self) {
        self.starts.inc();
    }

    pub fn observe_config_load(&self, seconds: f64) {
        self.config_load.observe(seconds);
    }
}

impl std::fmt::Debug for DaemonMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonMetrics")
            .field("starts", &self.starts.get())
            .finish_non_exhaustive()
    }
}

pub use prometheus;
