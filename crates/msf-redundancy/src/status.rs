//! ---
//! msf_section: "07-resilience-fault-tolerance"
//! msf_subsection: "module"
//! msf_type: "source"
//! msf_scope: "code"
//! msf_description: "Failover decision engine and its collaborators."
//! msf_version: "v0.1.0"
//! msf_owner: "tbd"
//! ---
//! Change-detected status lines with a periodic heartbeat.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use msf_common::time::elapsed_between;
use serde::Serialize;
use tracing::info;

use crate::health::HealthVerdict;
use crate::instance::RunState;
use crate::mode::Mode;

/// Observable state composed at the end of a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub mode: Mode,
    pub health: HealthVerdict,
    pub primary: RunState,
    pub secondary: RunState,
    pub actions: Vec<String>,
}

impl fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mode={} health={} primary={} secondary={} actions=",
            self.mode, self.health, self.primary, self.secondary
        )?;
        if self.actions.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&self.actions.join(","))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmissionKind {
    Change,
    Heartbeat,
}

impl EmissionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmissionKind::Change => "change",
            EmissionKind::Heartbeat => "heartbeat",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emission {
    pub kind: EmissionKind,
    pub line: String,
}

/// Decides whether a snapshot should be written out.
#[derive(Debug, Clone)]
pub struct StatusEmitter {
    heartbeat: Duration,
    last_line: Option<String>,
    last_emitted_at: Option<DateTime<Utc>>,
}

impl StatusEmitter {
    pub fn new(heartbeat: Duration) -> Self {
        Self {
            heartbeat,
            last_line: None,
            last_emitted_at: None,
        }
    }

    /// Compare against the previous tick. A different line emits immediately;
    /// an identical one emits only once the heartbeat interval has passed
    /// since the last emission.
    pub fn observe(&mut self, snapshot: &StatusSnapshot, now: DateTime<Utc>) -> Option<Emission> {
        let line = snapshot.to_string();
        let kind = if self.last_line.as_deref() != Some(line.as_str()) {
            EmissionKind::Change
        } else {
            match self.last_emitted_at {
                Some(at) if elapsed_between(at, now) < self.heartbeat => return None,
                _ => EmissionKind::Heartbeat,
            }
        };
        self.last_line = Some(line.clone());
        self.last_emitted_at = Some(now);
        Some(Emission { kind, line })
    }

    pub fn emit(&mut self, snapshot: &StatusSnapshot, now: DateTime<Utc>) -> Option<EmissionKind> {
        let emission = self.observe(snapshot, now)?;
        info!(target: "msf::status", kind = emission.kind.as_str(), "{}", emission.line);
        Some(emission.kind)
    }
}
