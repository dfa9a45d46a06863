//! ---
//! msf_section: "03-persistence-logging"
//! msf_subsection: "module"
//! msf_type: "source"
//! msf_scope: "code"
//! msf_description: "Operator-facing logging helpers for the control CLI."
//! msf_version: "v0.1.0"
//! msf_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Stderr tracing for `msfctl` and structured records of operator actions
//! (mode changes, manual health checks) so they can be told apart from daemon
//! output in a shared log pipeline.

use std::fmt;

use tracing_subscriber::{fmt as subscriber_fmt, prelude::*, EnvFilter, Registry};

/// Target used for every operator event.
pub const OPERATOR_TARGET: &str = "msf::operator";

/// Install a stderr subscriber. `MSF_LOG` wins over `RUST_LOG`; the default
/// level is `info`. Repeated calls are ignored.
pub fn init() {
    let filter = std::env::var("MSF_LOG")
        .ok()
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    let _ = Registry::default()
        .with(filter)
        .with(
            subscriber_fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init();
}

/// Fields attached to an operator event. Unset fields are logged empty.
#[derive(Debug, Default, Clone)]
pub struct LogContext<'a> {
    /// Mode involved in the action (`auto`, `force_primary`, `force_secondary`).
    pub mode: Option<&'a str>,
    /// Mode in effect before the action.
    pub previous_mode: Option<&'a str>,
    /// State directory the action read or wrote.
    pub state_dir: Option<&'a str>,
}

impl<'a> LogContext<'a> {
    /// Empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the mode being applied.
    pub fn with_mode(mut self, mode: &'a str) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Attach the mode that was replaced.
    pub fn with_previous_mode(mut self, mode: &'a str) -> Self {
        self.previous_mode = Some(mode);
        self
    }

    /// Attach the state directory.
    pub fn with_state_dir(mut self, state_dir: &'a str) -> Self {
        self.state_dir = Some(state_dir);
        self
    }
}

/// Whether an operator action took effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEventOutcome {
    /// The action was applied.
    Success,
    /// The action failed; nothing changed.
    Fault,
}

impl SystemEventOutcome {
    /// Lowercase label used in log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemEventOutcome::Success => "success",
            SystemEventOutcome::Fault => "fault",
        }
    }
}

impl fmt::Display for SystemEventOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Emit an operator event on [`OPERATOR_TARGET`]; faults are logged at error level.
pub fn log_system_event(
    context: Option<&LogContext>,
    event: &str,
    message: &str,
    outcome: SystemEventOutcome,
) {
    let ctx = context.cloned().unwrap_or_default();
    let mode = ctx.mode.unwrap_or_default();
    let previous_mode = ctx.previous_mode.unwrap_or_default();
    let state_dir = ctx.state_dir.unwrap_or_default();
    match outcome {
        SystemEventOutcome::Success => tracing::info!(
            target: OPERATOR_TARGET,
            event,
            outcome = outcome.as_str(),
            mode,
            previous_mode,
            state_dir,
            "{message}"
        ),
        SystemEventOutcome::Fault => tracing::error!(
            target: OPERATOR_TARGET,
            event,
            outcome = outcome.as_str(),
            mode,
            previous_mode,
            state_dir,
            "{message}"
        ),
    }
}
