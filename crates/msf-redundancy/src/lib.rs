//! ---
//! msf_section: "07-resilience-fault-tolerance"
//! msf_subsection: "module"
//! msf_type: "source"
//! msf_scope: "code"
//! msf_description: "Failover decision engine and its collaborators."
//! msf_version: "v0.1.0"
//! msf_owner: "tbd"
//! ---
//! Failover supervision for a primary/secondary pair of media server
//! instances: health evaluation, mode handling, idempotent convergence and
//! throttled operator notifications.

mod controller;
mod engine;
mod error;
mod health;
mod instance;
mod metrics;
mod mode;
mod notify;
mod runtime;
mod state;
mod status;
mod throttle;

pub mod fake;

pub use controller::{ActionOutcome, InstanceController};
pub use engine::{
    Action, FailoverEngine, NotificationOutcome, NotificationRecord, TickReport, Transition,
};
pub use error::{FailoverError, Result};
pub use health::{HealthEvaluator, HealthVerdict, LogState, ProcessProbe, SignatureSet};
pub use instance::{Instance, InstancePair, InstanceRole, RunState};
pub use metrics::FailoverMetrics;
pub use mode::{Mode, ModeStore, MODE_KEY};
pub use notify::{notifier_from_config, CommandNotifier, LogNotifier, Notification, Notifier, Severity};
pub use runtime::{DockerRuntime, ExecOutput, InstanceRuntime};
pub use state::{FileStateStore, MemoryStateStore, StateStore};
pub use status::{Emission, EmissionKind, StatusEmitter, StatusSnapshot};
pub use throttle::{NotificationThrottle, LAST_NOTIFY_KEY};
