//! ---
//! msf_section: "01-core-functionality"
//! msf_subsection: "module"
//! msf_type: "source"
//! msf_scope: "code"
//! msf_description: "Shared primitives and utilities for the failover runtime."
//! msf_version: "v0.1.0"
//! msf_owner: "tbd"
//! ---
use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "MSF_LOG";
const DEFAULT_DIRECTIVE: &str = "info";

static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();
static STDOUT_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

/// Available log formats for the daemon.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

/// Install the daemon subscriber: filtered stdout in the configured format plus a
/// daily rolling JSON file `<prefix>.log.<date>` under `config.directory`.
///
/// Filter precedence is `MSF_LOG`, then `RUST_LOG`, then `info`. Calling this
/// twice keeps the first subscriber.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    std::fs::create_dir_all(&config.directory).with_context(|| {
        format!(
            "unable to create log directory {}",
            config.directory.display()
        )
    })?;

    let file_name = log_file_name(service_name, config);
    let (file_writer, file_guard) =
        tracing_appender::non_blocking(daily(&config.directory, &file_name));
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let _ = FILE_GUARD.set(file_guard);
    let _ = STDOUT_GUARD.set(stdout_guard);

    let stdout_layer = match config.format {
        LogFormat::StructuredJson => fmt::layer()
            .with_timer(UtcTime::rfc_3339())
            .json()
            .with_writer(stdout_writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_timer(UtcTime::rfc_3339())
            .with_writer(stdout_writer)
            .boxed(),
    };
    let file_layer = fmt::layer()
        .with_timer(UtcTime::rfc_3339())
        .with_ansi(false)
        .json()
        .with_writer(file_writer)
        .boxed();

    let _ = tracing_subscriber::registry()
        .with(env_filter(std::env::var(LOG_ENV).ok()))
        .with(stdout_layer)
        .with(file_layer)
        .try_init();

    info!(
        service = %service_name,
        log_file = %config.directory.join(&file_name).display(),
        format = ?config.format,
        "tracing initialised"
    );
    Ok(())
}

fn log_file_name(service_name: &str, config: &LoggingConfig) -> String {
    let prefix = config
        .file_prefix
        .as_deref()
        .filter(|prefix| !prefix.trim().is_empty())
        .unwrap_or(service_name);
    format!("{prefix}.log")
}

fn env_filter(msf_log: Option<String>) -> EnvFilter {
    match msf_log {
        Some(directive) => EnvFilter::try_new(&directive).unwrap_or_else(|err| {
            eprintln!("invalid {LOG_ENV} directive `{directive}` ({err}); using {DEFAULT_DIRECTIVE}");
            EnvFilter::new(DEFAULT_DIRECTIVE)
        }),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE)),
    }
}
