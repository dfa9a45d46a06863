//! ---
//! msf_section: "01-core-functionality"
//! msf_subsection: "module"
//! msf_type: "source"
//! msf_scope: "code"
//! msf_description: "Shared primitives and utilities for the failover runtime."
//! msf_version: "v0.1.0"
//! msf_owner: "tbd"
//! ---
//! Core shared primitives for the MSF workspace.
//! This crate exposes configuration loading, tracing initialisation and the
//! clock abstraction consumed by the failover engine and both binaries.

pub mod config;
pub mod logging;
pub mod time;

pub use config::{
    AppConfig, EngineConfig, HealthConfig, InstancesConfig, LoadedAppConfig, LoggingConfig,
    MetricsConfig, NotifyConfig, RuntimeConfig, ServiceConfig, StateConfig,
};
pub use logging::{init_tracing, LogFormat};
pub use time::{Clock, ManualClock, SystemClock};
