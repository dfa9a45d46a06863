//! ---
//! msf_section: "07-resilience-fault-tolerance"
//! msf_subsection: "module"
//! msf_type: "source"
//! msf_scope: "code"
//! msf_description: "Failover decision engine and its collaborators."
//! msf_version: "v0.1.0"
//! msf_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use msf_common::config::ServiceConfig;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::health::ProcessProbe;
use crate::instance::{Instance, RunState};
use crate::runtime::InstanceRuntime;

/// Result of asking the controller to converge an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The instance changed state.
    Applied,
    /// The instance was already in the requested state.
    Unchanged,
    /// The attempt failed; the next tick will observe and retry.
    Failed(String),
}

/// Idempotent start/stop of the managed service inside an instance.
pub struct InstanceController {
    runtime: Arc<dyn InstanceRuntime>,
    probe: ProcessProbe,
    start_command: Vec<String>,
    stop_command: Vec<String>,
    settle_delay: Duration,
}

impl InstanceController {
    pub fn new(
        runtime: Arc<dyn InstanceRuntime>,
        service: &ServiceConfig,
        settle_delay: Duration,
    ) -> Self {
        Self {
            runtime,
            probe: ProcessProbe::from_config(service),
            start_command: service.start_command.clone(),
            stop_command: service.stop_command.clone(),
            settle_delay,
        }
    }

    /// Bring the container up if needed, then the service if it is not
    /// already detected. The settle delay follows each start, so a service
    /// the container autostarts is seen before a start command is issued.
    pub async fn start(&self, instance: &Instance) -> ActionOutcome {
        let mut changed = false;
        match self.runtime.is_running(&instance.name).await {
            Ok(true) => {}
            Ok(false) => {
                if let Err(err) = self.runtime.start(&instance.name).await {
                    warn!(instance = %instance.name, role = %instance.role, error = %err, "failed to start container");
                    return ActionOutcome::Failed(err.to_string());
                }
                info!(instance = %instance.name, role = %instance.role, settle_secs = self.settle_delay.as_secs(), "container started");
                self.settle().await;
                changed = true;
            }
            Err(err) => {
                warn!(instance = %instance.name, role = %instance.role, error = %err, "container inspection failed");
                return ActionOutcome::Failed(err.to_string());
            }
        }

        if self.service_state(instance).await.is_running() {
            return if changed {
                ActionOutcome::Applied
            } else {
                ActionOutcome::Unchanged
            };
        }

        match self.runtime.exec(&instance.name, &self.start_command).await {
            Ok(output) if output.success => {
                info!(instance = %instance.name, role = %instance.role, settle_secs = self.settle_delay.as_secs(), "service start issued");
                self.settle().await;
                ActionOutcome::Applied
            }
            Ok(_) => {
                warn!(instance = %instance.name, role = %instance.role, "service start command reported failure");
                ActionOutcome::Failed("service start command exited unsuccessfully".into())
            }
            Err(err) => {
                warn!(instance = %instance.name, role = %instance.role, error = %err, "service start command failed");
                ActionOutcome::Failed(err.to_string())
            }
        }
    }

    /// Stop the service only when it is currently detected running.
    pub async fn stop(&self, instance: &Instance) -> ActionOutcome {
        if !self.service_state(instance).await.is_running() {
            return ActionOutcome::Unchanged;
        }
        match self.runtime.exec(&instance.name, &self.stop_command).await {
            Ok(output) if output.success => {
                info!(instance = %instance.name, role = %instance.role, "service stop issued");
                ActionOutcome::Applied
            }
            Ok(_) => {
                warn!(instance = %instance.name, role = %instance.role, "service stop command reported failure");
                ActionOutcome::Failed("service stop command exited unsuccessfully".into())
            }
            Err(err) => {
                warn!(instance = %instance.name, role = %instance.role, error = %err, "service stop command failed");
                ActionOutcome::Failed(err.to_string())
            }
        }
    }

    async fn settle(&self) {
        if !self.settle_delay.is_zero() {
            sleep(self.settle_delay).await;
        }
    }

    async fn service_state(&self, instance: &Instance) -> RunState {
        match self.runtime.is_running(&instance.name).await {
            Ok(true) => self.probe.detect(self.runtime.as_ref(), &instance.name).await,
            _ => RunState::Stopped,
        }
    }
}

impl std::fmt::Debug for InstanceController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceController")
            .field("probe", &self.probe)
            .field("start_command", &self.start_command)
            .field("stop_command", &self.stop_command)
            .field("settle_delay", &self.settle_delay)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeRuntime;
    use crate::instance::InstanceRole;

    fn controller(runtime: Arc<FakeRuntime>) -> InstanceController {
        InstanceController::new(runtime, &ServiceConfig::default(), Duration::ZERO)
    }

    fn secondary() -> Instance {
        Instance::new(InstanceRole::Secondary, "plex-secondary")
    }

    #[tokio::test]
    async fn start_boots_container_and_service() {
        let runtime = Arc::new(FakeRuntime::new(&ServiceConfig::default()));
        runtime.add_instance("plex-secondary", false, false);
        let outcome = controller(runtime.clone()).start(&secondary()).await;
        assert_eq!(outcome, ActionOutcome::Applied);
        assert!(runtime.container_running("plex-secondary"));
        assert!(runtime.service_running("plex-secondary"));
        assert_eq!(runtime.container_starts("plex-secondary"), 1);
    }

    #[tokio::test]
    async fn start_is_a_no_op_when_service_already_running() {
        let runtime = Arc::new(FakeRuntime::new(&ServiceConfig::default()));
        runtime.add_instance("plex-secondary", true, true);
        let ctl = controller(runtime.clone());
        assert_eq!(ctl.start(&secondary()).await, ActionOutcome::Unchanged);
        let start_command = ServiceConfig::default().start_command;
        assert!(!runtime.exec_history("plex-secondary").contains(&start_command));
    }

    #[tokio::test]
    async fn container_start_alone_counts_as_applied_when_service_autostarts() {
        let runtime = Arc::new(FakeRuntime::new(&ServiceConfig::default()));
        runtime.add_instance("plex-secondary", false, false);
        runtime.set_autostart("plex-secondary", true);
        let ctl = controller(runtime.clone());
        assert_eq!(ctl.start(&secondary()).await, ActionOutcome::Applied);
        let start_command = ServiceConfig::default().start_command;
        assert!(!runtime.exec_history("plex-secondary").contains(&start_command));
    }

    #[tokio::test]
    async fn container_start_waits_before_probing_the_service() {
        let runtime = Arc::new(FakeRuntime::new(&ServiceConfig::default()));
        runtime.add_instance("plex-secondary", false, false);
        runtime.set_autostart("plex-secondary", true);
        let settle = Duration::from_millis(150);
        let ctl = InstanceController::new(runtime.clone(), &ServiceConfig::default(), settle);

        let started = std::time::Instant::now();
        assert_eq!(ctl.start(&secondary()).await, ActionOutcome::Applied);
        let elapsed = started.elapsed();
        assert!(elapsed >= settle);
        assert!(elapsed < settle * 2, "only one settle wait expected");
        let start_command = ServiceConfig::default().start_command;
        assert!(!runtime.exec_history("plex-secondary").contains(&start_command));
    }

    #[tokio::test]
    async fn failed_service_start_is_reported_not_raised() {
        let runtime = Arc::new(FakeRuntime::new(&ServiceConfig::default()));
        runtime.add_instance("plex-secondary", true, false);
        runtime.set_start_fails("plex-secondary", true);
        let outcome = controller(runtime.clone()).start(&secondary()).await;
        assert!(matches!(outcome, ActionOutcome::Failed(_)));
        assert!(!runtime.service_running("plex-secondary"));
    }

    #[tokio::test]
    async fn unknown_container_start_fails() {
        let runtime = Arc::new(FakeRuntime::new(&ServiceConfig::default()));
        let outcome = controller(runtime).start(&secondary()).await;
        assert!(matches!(outcome, ActionOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn stop_only_acts_on_running_service() {
        let runtime = Arc::new(FakeRuntime::new(&ServiceConfig::default()));
        runtime.add_instance("plex-secondary", true, true);
        let ctl = controller(runtime.clone());
        assert_eq!(ctl.stop(&secondary()).await, ActionOutcome::Applied);
        assert!(!runtime.service_running("plex-secondary"));
        assert!(runtime.container_running("plex-secondary"));
        assert_eq!(ctl.stop(&secondary()).await, ActionOutcome::Unchanged);
    }

    #[tokio::test]
    async fn stop_on_stopped_container_is_unchanged() {
        let runtime = Arc::new(FakeRuntime::new(&ServiceConfig::default()));
        runtime.add_instance("plex-secondary", false, false);
        assert_eq!(
            controller(runtime).stop(&secondary()).await,
            ActionOutcome::Unchanged
        );
    }
}
