//! ---
//! msf_section: "05-networking-external-interfaces"
//! msf_subsection: "binary"
//! msf_type: "source"
//! msf_scope: "code"
//! msf_description: "Control CLI for operators interacting with the failover daemon."
//! msf_version: "v0.1.0"
//! msf_owner: "tbd"
//! ---
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Subcommand, ValueEnum};
use msf_common::config::AppConfig;
use msf_logging::{log_system_event, LogContext, SystemEventOutcome};
use msf_redundancy::{FileStateStore, Mode, ModeStore};

/// Mode management commands.
#[derive(Debug, Subcommand)]
pub enum ModeCommand {
    /// Print the mode the daemon will apply on its next tick.
    Get,
    /// Persist a new mode; the daemon picks it up on its next tick.
    Set {
        #[arg(value_enum)]
        mode: CliMode,
    },
}

/// Accepts the spellings `mode get` prints; kebab-case is kept as an alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliMode {
    Auto,
    #[value(name = "force_primary", alias = "force-primary")]
    ForcePrimary,
    #[value(name = "force_secondary", alias = "force-secondary")]
    ForceSecondary,
}

impl From<CliMode> for Mode {
    fn from(value: CliMode) -> Self {
        match value {
            CliMode::Auto => Mode::Auto,
            CliMode::ForcePrimary => Mode::ForcePrimary,
            CliMode::ForceSecondary => Mode::ForceSecondary,
        }
    }
}

pub fn run(command: ModeCommand, config: &AppConfig) -> Result<()> {
    let state_dir = config.state.directory.display().to_string();
    let store = FileStateStore::open(&config.state.directory)
        .with_context(|| format!("failed to open state directory {state_dir}"))?;
    let modes = ModeStore::new(Arc::new(store));
    match command {
        ModeCommand::Get => println!("{}", modes.get()),
        ModeCommand::Set { mode } => {
            let mode = Mode::from(mode);
            let previous = modes.get();
            let ctx = LogContext::new()
                .with_mode(mode.as_str())
                .with_previous_mode(previous.as_str())
                .with_state_dir(&state_dir);
            match modes.set(mode) {
                Ok(()) => {
                    log_system_event(
                        Some(&ctx),
                        "mode.set",
                        "failover mode updated",
                        SystemEventOutcome::Success,
                    );
                    println!("mode set to {mode} (was {previous})");
                }
                Err(err) => {
                    log_system_event(
                        Some(&ctx),
                        "mode.set",
                        &err.to_string(),
                        SystemEventOutcome::Fault,
                    );
                    return Err(err).context("failed to persist mode");
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_every_persisted_mode_name() {
        for mode in [Mode::Auto, Mode::ForcePrimary, Mode::ForceSecondary] {
            let parsed = CliMode::from_str(mode.as_str(), false)
                .unwrap_or_else(|err| panic!("{} rejected: {err}", mode.as_str()));
            assert_eq!(Mode::from(parsed), mode);
        }
    }

    #[test]
    fn kebab_case_spellings_remain_accepted() {
        assert_eq!(
            CliMode::from_str("force-primary", false).unwrap(),
            CliMode::ForcePrimary
        );
        assert_eq!(
            CliMode::from_str("force-secondary", false).unwrap(),
            CliMode::ForceSecondary
        );
        assert!(CliMode::from_str("forced", false).is_err());
    }
}
