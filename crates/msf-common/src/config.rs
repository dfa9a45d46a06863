//! ---
//! msf_section: "01-core-functionality"
//! msf_subsection: "module"
//! msf_type: "source"
//! msf_scope: "code"
//! msf_description: "Shared primitives and utilities for the failover runtime."
//! msf_version: "v0.1.0"
//! msf_owner: "tbd"
//! ---
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_primary() -> String {
    "plex".to_owned()
}

fn default_secondary() -> String {
    "plex-secondary".to_owned()
}

fn default_process_pattern() -> String {
    "Plex Media Server".to_owned()
}

fn default_start_command() -> Vec<String> {
    vec!["s6-svc".into(), "-u".into(), "/run/service/svc-plex".into()]
}

fn default_stop_command() -> Vec<String> {
    vec!["s6-svc".into(), "-d".into(), "/run/service/svc-plex".into()]
}

fn default_runtime_binary() -> PathBuf {
    PathBuf::from("docker")
}

fn default_log_paths() -> Vec<String> {
    vec![
        "/config/Library/Application Support/Plex Media Server/Logs/Plex Media Server.log".into(),
        "/config/Plex Media Server/Logs/Plex Media Server.log".into(),
    ]
}

fn default_tail_lines() -> usize {
    200
}

fn default_signatures() -> Vec<String> {
    vec![
        "Unable to set up server".into(),
        "database disk image is malformed".into(),
        "disk I/O error".into(),
        "Failed to open database".into(),
    ]
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(20)
}

fn default_settle_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(300)
}

fn default_notify_enabled() -> bool {
    true
}

fn default_notify_command() -> PathBuf {
    PathBuf::from("/usr/local/emhttp/webGui/scripts/notify")
}

fn default_notify_event() -> String {
    "Media Server Failover".to_owned()
}

fn default_throttle_window() -> Duration {
    Duration::from_secs(30)
}

fn default_state_directory() -> PathBuf {
    PathBuf::from("/var/lib/msf")
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("/var/log/msf")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9899)
}

/// Primary configuration object for the failover daemon and control CLI.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub instances: InstancesConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &'static str = "MSF_CONFIG";

    /// Load configuration from disk, respecting the `MSF_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse::<AppConfig>()
            .with_context(|| format!("failed to load config file {}", path.display()))
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.instances.validate()?;
        self.service.validate()?;
        if self.engine.poll_interval.is_zero() {
            return Err(anyhow!("engine.poll_interval must be greater than zero"));
        }
        if self.health.tail_lines == 0 {
            return Err(anyhow!("health.tail_lines must be greater than zero"));
        }
        if self.notify.enabled && self.notify.command.as_os_str().is_empty() {
            return Err(anyhow!("notify.command must be set when notifications are enabled"));
        }
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Names of the two redundant instances as known to the runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstancesConfig {
    #[serde(default = "default_primary")]
    pub primary: String,
    #[serde(default = "default_secondary")]
    pub secondary: String,
}

impl Default for InstancesConfig {
    fn default() -> Self {
        Self {
            primary: default_primary(),
            secondary: default_secondary(),
        }
    }
}

impl InstancesConfig {
    pub fn validate(&self) -> Result<()> {
        if self.primary.trim().is_empty() || self.secondary.trim().is_empty() {
            return Err(anyhow!("instances.primary and instances.secondary must be set"));
        }
        if self.primary == self.secondary {
            return Err(anyhow!(
                "instances.primary and instances.secondary must differ (both '{}')",
                self.primary
            ));
        }
        Ok(())
    }
}

/// How the managed service is detected and driven inside an instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Substring identifying the service process in a process listing.
    #[serde(default = "default_process_pattern")]
    pub process_pattern: String,
    #[serde(default = "default_start_command")]
    pub start_command: Vec<String>,
    #[serde(default = "default_stop_command")]
    pub stop_command: Vec<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            process_pattern: default_process_pattern(),
            start_command: default_start_command(),
            stop_command: default_stop_command(),
        }
    }
}

impl ServiceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.process_pattern.trim().is_empty() {
            return Err(anyhow!("service.process_pattern must not be empty"));
        }
        if self.start_command.is_empty() || self.stop_command.is_empty() {
            return Err(anyhow!(
                "service.start_command and service.stop_command must not be empty"
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_runtime_binary")]
    pub binary: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            binary: default_runtime_binary(),
        }
    }
}

/// Log inspection settings for the primary instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Candidate log paths inside the instance, first existing wins.
    #[serde(default = "default_log_paths")]
    pub log_paths: Vec<String>,
    #[serde(default = "default_tail_lines")]
    pub tail_lines: usize,
    /// Ordered failure signatures, matched case-insensitively.
    #[serde(default = "default_signatures")]
    pub signatures: Vec<String>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            log_paths: default_log_paths(),
            tail_lines: default_tail_lines(),
            signatures: default_signatures(),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_poll_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub poll_interval: Duration,
    #[serde(default = "default_settle_delay")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub settle_delay: Duration,
    #[serde(default = "default_heartbeat_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub heartbeat_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            settle_delay: default_settle_delay(),
            heartbeat_interval: default_heartbeat_interval(),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_notify_enabled")]
    pub enabled: bool,
    #[serde(default = "default_notify_command")]
    pub command: PathBuf,
    #[serde(default = "default_notify_event")]
    pub event: String,
    #[serde(default = "default_throttle_window")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub throttle_window: Duration,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: default_notify_enabled(),
            command: default_notify_command(),
            event: default_notify_event(),
            throttle_window: default_throttle_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_state_directory")]
    pub directory: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            directory: default_state_directory(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config: AppConfig = "".parse().unwrap();
        assert_eq!(config.instances.primary, "plex");
        assert_eq!(config.instances.secondary, "plex-secondary");
        assert_eq!(config.health.tail_lines, 200);
        assert_eq!(config.engine.poll_interval, Duration::from_secs(20));
        assert_eq!(config.notify.throttle_window, Duration::from_secs(30));
        assert!(!config.metrics.enabled);
        assert!(config
            .health
            .signatures
            .iter()
            .any(|s| s == "Unable to set up server"));
    }

    #[test]
    fn durations_parse_as_seconds() {
        let config: AppConfig = r#"
            [engine]
            poll_interval = 15
            settle_delay = 0
            heartbeat_interval = 600

            [notify]
            throttle_window = 45
        "#
        .parse()
        .unwrap();
        assert_eq!(config.engine.poll_interval, Duration::from_secs(15));
        assert!(config.engine.settle_delay.is_zero());
        assert_eq!(config.engine.heartbeat_interval, Duration::from_secs(600));
        assert_eq!(config.notify.throttle_window, Duration::from_secs(45));
    }

    #[test]
    fn identical_instance_names_are_rejected() {
        let err = r#"
            [instances]
            primary = "jellyfin"
            secondary = "jellyfin"
        "#
        .parse::<AppConfig>()
        .unwrap_err();
        assert!(err.to_string().contains("must differ"));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let err = "[engine]\npoll_interval = 0\n"
            .parse::<AppConfig>()
            .unwrap_err();
        assert!(err.to_string().contains("poll_interval"));
    }

    #[test]
    fn empty_start_command_is_rejected() {
        let err = "[service]\nstart_command = []\n"
            .parse::<AppConfig>()
            .unwrap_err();
        assert!(err.to_string().contains("start_command"));
    }

    #[test]
    fn load_picks_first_existing_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        let present = dir.path().join("msf.toml");
        fs::write(&present, "[instances]\nprimary = \"emby\"\nsecondary = \"emby-b\"\n").unwrap();

        let loaded = AppConfig::load_with_source(&[missing, present.clone()]).unwrap();
        assert_eq!(loaded.source, present);
        assert_eq!(loaded.config.instances.primary, "emby");
    }

    #[test]
    fn load_reports_inspected_paths_when_nothing_exists() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nowhere.toml");
        let err = AppConfig::load(&[missing]).unwrap_err();
        assert!(err.to_string().contains("nowhere.toml"));
    }
}
