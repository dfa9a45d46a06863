//! ---
//! msf_section: "05-networking-external-interfaces"
//! msf_subsection: "binary"
//! msf_type: "source"
//! msf_scope: "code"
//! msf_description: "Control CLI for operators interacting with the failover daemon."
//! msf_version: "v0.1.0"
//! msf_owner: "tbd"
//! ---
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use msf_common::config::AppConfig;
use msf_logging as logging;

mod inspect;
mod mode;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Media server failover control utility",
    long_about = None
)]
struct Cli {
    /// Path to the configuration file shared with the daemon.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(subcommand, about = "Read or change the failover mode")]
    Mode(mode::ModeCommand),
    #[command(about = "Show the persisted mode and notification state")]
    Status,
    #[command(about = "Evaluate primary health against the live runtime")]
    Health,
}

fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    match cli.command {
        Commands::Mode(cmd) => mode::run(cmd, &config)?,
        Commands::Status => inspect::status(&config)?,
        Commands::Health => inspect::health(&config)?,
    }
    Ok(())
}

fn load_config(explicit: Option<&PathBuf>) -> Result<AppConfig> {
    let mut candidates = Vec::new();
    if let Some(path) = explicit {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("/etc/msf/msf.toml"));
    candidates.push(PathBuf::from("configs/msf.example.toml"));
    AppConfig::load(&candidates)
}
