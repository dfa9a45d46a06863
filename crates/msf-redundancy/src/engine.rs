//! ---
//! msf_section: "07-resilience-fault-tolerance"
//! msf_subsection: "module"
//! msf_type: "source"
//! msf_scope: "code"
//! msf_description: "Failover decision engine and its collaborators."
//! msf_version: "v0.1.0"
//! msf_owner: "tbd"
//! ---
//! Poll, evaluate, converge and report, one tick at a time.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use msf_common::config::AppConfig;
use msf_common::time::Clock;
use serde::{Serialize, Serializer};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::controller::{ActionOutcome, InstanceController};
use crate::error::Result;
use crate::health::{HealthEvaluator, HealthVerdict};
use crate::instance::{Instance, InstancePair, InstanceRole, RunState};
use crate::metrics::FailoverMetrics;
use crate::mode::{Mode, ModeStore};
use crate::notify::{Notification, Notifier, Severity};
use crate::runtime::InstanceRuntime;
use crate::state::StateStore;
use crate::status::{EmissionKind, StatusEmitter, StatusSnapshot};
use crate::throttle::NotificationThrottle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    Started,
    Stopped,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Started => "started",
            Transition::Stopped => "stopped",
        }
    }
}

/// A state change actually applied to one instance during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Action {
    pub role: InstanceRole,
    pub transition: Transition,
}

impl Action {
    pub fn new(role: InstanceRole, transition: Transition) -> Self {
        Self { role, transition }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.role, self.transition.as_str())
    }
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationOutcome {
    Delivered,
    Throttled,
    Failed,
}

impl NotificationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationOutcome::Delivered => "delivered",
            NotificationOutcome::Throttled => "throttled",
            NotificationOutcome::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationRecord {
    pub subject: String,
    pub severity: Severity,
    pub outcome: NotificationOutcome,
}

/// Everything observed and done during one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub tick: u64,
    pub mode: Mode,
    pub health: HealthVerdict,
    pub primary: RunState,
    pub secondary: RunState,
    pub actions: Vec<Action>,
    pub notification: Option<NotificationRecord>,
    pub emission: Option<EmissionKind>,
}

/// Drives the redundant pair toward the state the current mode calls for.
pub struct FailoverEngine {
    pair: InstancePair,
    modes: ModeStore,
    health: HealthEvaluator,
    controller: InstanceController,
    throttle: NotificationThrottle,
    notifier: Arc<dyn Notifier>,
    emitter: StatusEmitter,
    clock: Arc<dyn Clock>,
    metrics: Option<FailoverMetrics>,
    poll_interval: Duration,
    ticks: u64,
}

impl FailoverEngine {
    /// Assemble an engine from configuration and injected boundaries.
    /// Fails only when a health signature does not compile.
    pub fn from_config(
        config: &AppConfig,
        runtime: Arc<dyn InstanceRuntime>,
        store: Arc<dyn StateStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let health = HealthEvaluator::from_config(runtime.clone(), &config.service, &config.health)?;
        let controller =
            InstanceController::new(runtime, &config.service, config.engine.settle_delay);
        Ok(Self {
            pair: InstancePair::from_config(&config.instances),
            modes: ModeStore::new(store.clone()),
            health,
            controller,
            throttle: NotificationThrottle::new(store, clock.clone(), config.notify.throttle_window),
            notifier,
            emitter: StatusEmitter::new(config.engine.heartbeat_interval),
            clock,
            metrics: None,
            poll_interval: config.engine.poll_interval,
            ticks: 0,
        })
    }

    pub fn with_metrics(mut self, metrics: FailoverMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run one full poll-evaluate-act-emit iteration.
    pub async fn tick(&mut self) -> TickReport {
        let started = Instant::now();
        self.ticks += 1;
        let tick = self.ticks;

        let mode = self.modes.get();
        let health = self.health.health(&self.pair.primary).await;
        let mut primary = if health == HealthVerdict::Stopped {
            RunState::Stopped
        } else {
            RunState::Running
        };
        let mut secondary = self.health.run_state(&self.pair.secondary).await;
        debug!(tick, %mode, %health, %primary, %secondary, "tick observed");

        let mut actions = Vec::new();
        let pending = self
            .converge(mode, health, primary, secondary, &mut actions)
            .await;

        for action in &actions {
            let state = match action.transition {
                Transition::Started => RunState::Running,
                Transition::Stopped => RunState::Stopped,
            };
            match action.role {
                InstanceRole::Primary => primary = state,
                InstanceRole::Secondary => secondary = state,
            }
            if let Some(metrics) = &self.metrics {
                metrics.record_action(&action.to_string());
            }
        }

        let notification = match pending {
            Some(note) => Some(self.deliver(note).await),
            None => None,
        };

        let snapshot = StatusSnapshot {
            mode,
            health,
            primary,
            secondary,
            actions: actions.iter().map(Action::to_string).collect(),
        };
        let emission = self.emitter.emit(&snapshot, self.clock.now());

        if let Some(metrics) = &self.metrics {
            metrics.set_health(health);
            metrics.observe_tick(started.elapsed());
        }

        TickReport {
            tick,
            mode,
            health,
            primary,
            secondary,
            actions,
            notification,
            emission,
        }
    }

    /// Tick until `shutdown` resolves. Shutdown is only observed between
    /// ticks; a tick in progress always completes.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(
            primary = %self.pair.primary.name,
            secondary = %self.pair.secondary.name,
            poll_secs = self.poll_interval.as_secs(),
            "failover engine started"
        );
        loop {
            let report = self.tick().await;
            debug!(tick = report.tick, actions = report.actions.len(), "tick complete");
            tokio::select! {
                _ = &mut shutdown => {
                    info!(ticks = self.ticks, "shutdown requested; failover engine stopping");
                    break;
                }
                _ = sleep(self.poll_interval) => {}
            }
        }
    }

    async fn converge(
        &self,
        mode: Mode,
        health: HealthVerdict,
        primary: RunState,
        secondary: RunState,
        actions: &mut Vec<Action>,
    ) -> Option<Notification> {
        let pair = &self.pair;
        match mode {
            Mode::Auto => match health {
                HealthVerdict::Healthy => {
                    if secondary.is_running() && self.stop(&pair.secondary, actions).await {
                        return Some(Notification::new(
                            "Primary Restored",
                            format!(
                                "{} is healthy again; {} stopped",
                                pair.primary.name, pair.secondary.name
                            ),
                            Severity::Normal,
                        ));
                    }
                    None
                }
                HealthVerdict::Error => {
                    self.stop(&pair.primary, actions).await;
                    if self.start(&pair.secondary, actions).await {
                        return Some(Notification::new(
                            "Secondary Promoted",
                            format!(
                                "{} reported a failure signature; {} started",
                                pair.primary.name, pair.secondary.name
                            ),
                            Severity::Warning,
                        ));
                    }
                    None
                }
                HealthVerdict::Stopped => {
                    self.start(&pair.primary, actions).await;
                    None
                }
            },
            Mode::ForcePrimary => {
                let mut note = None;
                if !primary.is_running() && self.start(&pair.primary, actions).await {
                    note = Some(Notification::new(
                        "Forced Primary",
                        format!("mode {mode}: {} started", pair.primary.name),
                        Severity::Normal,
                    ));
                }
                if secondary.is_running() {
                    self.stop(&pair.secondary, actions).await;
                }
                note
            }
            Mode::ForceSecondary => {
                let mut note = None;
                if !secondary.is_running() && self.start(&pair.secondary, actions).await {
                    note = Some(Notification::new(
                        "Forced Secondary",
                        format!("mode {mode}: {} started", pair.secondary.name),
                        Severity::Warning,
                    ));
                }
                if primary.is_running() {
                    self.stop(&pair.primary, actions).await;
                }
                note
            }
        }
    }

    async fn start(&self, instance: &Instance, actions: &mut Vec<Action>) -> bool {
        let outcome = self.controller.start(instance).await;
        self.record(instance, Transition::Started, outcome, actions)
    }

    async fn stop(&self, instance: &Instance, actions: &mut Vec<Action>) -> bool {
        let outcome = self.controller.stop(instance).await;
        self.record(instance, Transition::Stopped, outcome, actions)
    }

    fn record(
        &self,
        instance: &Instance,
        transition: Transition,
        outcome: ActionOutcome,
        actions: &mut Vec<Action>,
    ) -> bool {
        match outcome {
            ActionOutcome::Applied => {
                let action = Action::new(instance.role, transition);
                info!(instance = %instance.name, action = %action, "action applied");
                actions.push(action);
                true
            }
            ActionOutcome::Unchanged => false,
            ActionOutcome::Failed(reason) => {
                warn!(instance = %instance.name, transition = transition.as_str(), reason = %reason, "action failed; will retry next tick");
                false
            }
        }
    }

    async fn deliver(&self, note: Notification) -> NotificationRecord {
        let outcome = if !self.throttle.can_notify() {
            info!(subject = %note.subject, "notification throttled");
            NotificationOutcome::Throttled
        } else {
            let outcome = match self.notifier.notify(&note).await {
                Ok(()) => {
                    info!(subject = %note.subject, severity = %note.severity, "notification sent");
                    NotificationOutcome::Delivered
                }
                Err(err) => {
                    warn!(subject = %note.subject, error = %err, "notification delivery failed");
                    NotificationOutcome::Failed
                }
            };
            self.throttle.mark_notified();
            outcome
        };
        if let Some(metrics) = &self.metrics {
            metrics.record_notification(outcome.as_str());
        }
        NotificationRecord {
            subject: note.subject,
            severity: note.severity,
            outcome,
        }
    }
}

impl fmt::Debug for FailoverEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailoverEngine")
            .field("pair", &self.pair)
            .field("poll_interval", &self.poll_interval)
            .field("ticks", &self.ticks)
            .finish_non_exhaustive()
    }
}
