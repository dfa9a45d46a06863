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

use msf_common::config::InstancesConfig;
use serde::Serialize;

/// Position of an instance within the redundant pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceRole {
    Primary,
    Secondary,
}

impl InstanceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceRole::Primary => "primary",
            InstanceRole::Secondary => "secondary",
        }
    }
}

impl fmt::Display for InstanceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observed run state of the managed service inside an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Running,
    Stopped,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Running => "running",
            RunState::Stopped => "stopped",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, RunState::Running)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One managed service endpoint, identified by its runtime name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub role: InstanceRole,
    pub name: String,
}

impl Instance {
    pub fn new(role: InstanceRole, name: impl Into<String>) -> Self {
        Self {
            role,
            name: name.into(),
        }
    }
}

/// The two redundant instances under supervision.
#[derive(Debug, Clone)]
pub struct InstancePair {
    pub primary: Instance,
    pub secondary: Instance,
}

impl InstancePair {
    pub fn new(primary: impl Into<String>, secondary: impl Into<String>) -> Self {
        Self {
            primary: Instance::new(InstanceRole::Primary, primary),
            secondary: Instance::new(InstanceRole::Secondary, secondary),
        }
    }

    pub fn from_config(config: &InstancesConfig) -> Self {
        Self::new(config.primary.clone(), config.secondary.clone())
    }
}
