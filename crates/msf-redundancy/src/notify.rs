//! ---
//! msf_section: "07-resilience-fault-tolerance"
//! msf_subsection: "module"
//! msf_type: "source"
//! msf_scope: "code"
//! msf_description: "Failover decision engine and its collaborators."
//! msf_version: "v0.1.0"
//! msf_owner: "tbd"
//! ---
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use msf_common::config::NotifyConfig;
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{FailoverError, Result};

/// Severity understood by the host notification system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Normal,
    Warning,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Normal => "normal",
            Severity::Warning => "warning",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator-facing alert raised by a state-changing action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub subject: String,
    pub body: String,
    pub severity: Severity,
}

impl Notification {
    pub fn new(subject: impl Into<String>, body: impl Into<String>, severity: Severity) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            severity,
        }
    }
}

/// Fire-and-forget delivery transport.
#[async_trait]
pub trait Notifier: Send + Sync + fmt::Debug {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Runs a host command using the `-e/-s/-d/-i` argument contract.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    command: PathBuf,
    event: String,
}

impl CommandNotifier {
    pub fn new(command: impl Into<PathBuf>, event: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            event: event.into(),
        }
    }

    pub fn args(&self, notification: &Notification) -> Vec<String> {
        vec![
            "-e".into(),
            self.event.clone(),
            "-s".into(),
            notification.subject.clone(),
            "-d".into(),
            notification.body.clone(),
            "-i".into(),
            notification.severity.as_str().into(),
        ]
    }
}

#[async_trait]
impl Notifier for CommandNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let program = self.command.display().to_string();
        debug!(program = %program, subject = %notification.subject, "delivering notification");
        let output = Command::new(&self.command)
            .args(self.args(notification))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| FailoverError::Spawn {
                program: program.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(FailoverError::CommandFailed {
                program,
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Ok(())
    }
}

/// Writes notifications to the log only; used when delivery is disabled.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        info!(
            subject = %notification.subject,
            severity = %notification.severity,
            body = %notification.body,
            "notification"
        );
        Ok(())
    }
}

/// Pick the notifier matching the configuration.
pub fn notifier_from_config(config: &NotifyConfig) -> Arc<dyn Notifier> {
    if config.enabled {
        Arc::new(CommandNotifier::new(
            config.command.clone(),
            config.event.clone(),
        ))
    } else {
        warn!("notification delivery disabled; alerts will only be logged");
        Arc::new(LogNotifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn promoted() -> Notification {
        Notification::new(
            "Secondary Promoted",
            "primary unhealthy; secondary started",
            Severity::Warning,
        )
    }

    #[test]
    fn command_arguments_follow_host_contract() {
        let notifier = CommandNotifier::new("/usr/local/bin/notify", "Media Server Failover");
        assert_eq!(
            notifier.args(&promoted()),
            vec![
                "-e",
                "Media Server Failover",
                "-s",
                "Secondary Promoted",
                "-d",
                "primary unhealthy; secondary started",
                "-i",
                "warning",
            ]
        );
    }

    #[tokio::test]
    async fn missing_command_is_a_spawn_error() {
        let notifier = CommandNotifier::new("/nonexistent/msf-notify", "event");
        let err = notifier.notify(&promoted()).await.unwrap_err();
        assert!(matches!(err, FailoverError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_exit_status_is_checked() {
        assert!(CommandNotifier::new("true", "event")
            .notify(&promoted())
            .await
            .is_ok());
        let err = CommandNotifier::new("false", "event")
            .notify(&promoted())
            .await
            .unwrap_err();
        assert!(matches!(err, FailoverError::CommandFailed { status: 1, .. }));
    }

    #[tokio::test]
    async fn log_notifier_never_fails() {
        assert!(LogNotifier.notify(&promoted()).await.is_ok());
    }

    #[test]
    fn disabled_config_selects_log_notifier() {
        let config = NotifyConfig {
            enabled: false,
            ..NotifyConfig::default()
        };
        let notifier = notifier_from_config(&config);
        assert_eq!(format!("{notifier:?}"), "LogNotifier");
    }
}
