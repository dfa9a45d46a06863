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
use msf_common::config::AppConfig;
use msf_common::time::SystemClock;
use msf_redundancy::{
    DockerRuntime, FileStateStore, HealthEvaluator, InstancePair, ModeStore,
    NotificationThrottle,
};
use serde_json::json;
use tokio::runtime::Runtime;

/// Print the persisted mode and the notification throttle state.
pub fn status(config: &AppConfig) -> Result<()> {
    let store = Arc::new(
        FileStateStore::open(&config.state.directory).with_context(|| {
            format!(
                "failed to open state directory {}",
                config.state.directory.display()
            )
        })?,
    );
    let modes = ModeStore::new(store.clone());
    let throttle = NotificationThrottle::new(
        store,
        Arc::new(SystemClock),
        config.notify.throttle_window,
    );
    let last = throttle
        .last_notified()
        .map(|at| at.to_rfc3339())
        .unwrap_or_else(|| "never".to_owned());
    println!(
        "Mode: {}\nLast Notification: {}\nNotifications Allowed: {}\nThrottle Window: {}s\nState Directory: {}",
        modes.get(),
        last,
        throttle.can_notify(),
        throttle.window().as_secs(),
        config.state.directory.display()
    );
    Ok(())
}

/// One-off evaluation of both instances against the configured runtime.
pub fn health(config: &AppConfig) -> Result<()> {
    let pair = InstancePair::from_config(&config.instances);
    let runtime = Arc::new(DockerRuntime::new(config.runtime.binary.clone()));
    let evaluator = HealthEvaluator::from_config(runtime, &config.service, &config.health)
        .context("failed to compile health signatures")?;
    let rt = Runtime::new()?;
    let (verdict, primary, secondary) = rt.block_on(async {
        let verdict = evaluator.health(&pair.primary).await;
        let primary = evaluator.run_state(&pair.primary).await;
        let secondary = evaluator.run_state(&pair.secondary).await;
        (verdict, primary, secondary)
    });
    let report = json!({
        "health": verdict,
        "primary": { "name": pair.primary.name, "state": primary },
        "secondary": { "name": pair.secondary.name, "state": secondary },
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
