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
use std::sync::Arc;

use msf_common::config::{HealthConfig, ServiceConfig};
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{FailoverError, Result};
use crate::instance::{Instance, RunState};
use crate::runtime::InstanceRuntime;

/// Process listing strategies, tried in order until one runs successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Listing {
    Pgrep,
    PsAux,
    PsEf,
    Ps,
}

const LISTINGS: [Listing; 4] = [Listing::Pgrep, Listing::PsAux, Listing::PsEf, Listing::Ps];

impl Listing {
    fn argv(&self, pattern: &str) -> Vec<String> {
        match self {
            Listing::Pgrep => vec!["pgrep".into(), "-f".into(), pattern.into()],
            Listing::PsAux => vec!["ps".into(), "aux".into()],
            Listing::PsEf => vec!["ps".into(), "-ef".into()],
            Listing::Ps => vec!["ps".into()],
        }
    }

    fn detects(&self, stdout: &str, pattern: &str) -> bool {
        match self {
            Listing::Pgrep => !stdout.trim().is_empty(),
            _ => stdout.lines().any(|line| line.contains(pattern)),
        }
    }
}

/// Detects the managed service process inside an instance.
#[derive(Debug, Clone)]
pub struct ProcessProbe {
    pattern: String,
}

impl ProcessProbe {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(config.process_pattern.clone())
    }

    /// Report whether the service process is present. Every listing failing
    /// counts as [`RunState::Stopped`].
    pub async fn detect(&self, runtime: &dyn InstanceRuntime, instance: &str) -> RunState {
        for listing in LISTINGS {
            match runtime.exec(instance, &listing.argv(&self.pattern)).await {
                Ok(output) if output.success => {
                    return if listing.detects(&output.stdout, &self.pattern) {
                        RunState::Running
                    } else {
                        RunState::Stopped
                    };
                }
                Ok(_) => {
                    debug!(instance, ?listing, "process listing unsuccessful; trying next");
                }
                Err(err) => {
                    debug!(instance, ?listing, error = %err, "process listing failed; trying next");
                }
            }
        }
        RunState::Stopped
    }
}

/// Ordered, case-insensitive failure signatures.
#[derive(Debug, Clone)]
pub struct SignatureSet {
    patterns: Vec<Regex>,
}

impl SignatureSet {
    pub fn compile<S: AsRef<str>>(signatures: &[S]) -> Result<Self> {
        let patterns = signatures
            .iter()
            .map(|raw| {
                let raw = raw.as_ref();
                RegexBuilder::new(raw)
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| FailoverError::Signature {
                        pattern: raw.to_owned(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// First signature, in configured order, present anywhere in `text`.
    pub fn first_match(&self, text: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|pattern| pattern.is_match(text))
            .map(Regex::as_str)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Outcome of scanning recent log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogState {
    Ok,
    Error,
}

/// Health of the primary instance for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthVerdict {
    Healthy,
    Error,
    Stopped,
}

impl HealthVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthVerdict::Healthy => "healthy",
            HealthVerdict::Error => "error",
            HealthVerdict::Stopped => "stopped",
        }
    }

    pub const ALL: [HealthVerdict; 3] = [
        HealthVerdict::Healthy,
        HealthVerdict::Error,
        HealthVerdict::Stopped,
    ];
}

impl fmt::Display for HealthVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derives run state, log state and the combined verdict from live inspection.
pub struct HealthEvaluator {
    runtime: Arc<dyn InstanceRuntime>,
    probe: ProcessProbe,
    log_paths: Vec<String>,
    tail_lines: usize,
    signatures: SignatureSet,
}

impl HealthEvaluator {
    pub fn new(
        runtime: Arc<dyn InstanceRuntime>,
        probe: ProcessProbe,
        log_paths: Vec<String>,
        tail_lines: usize,
        signatures: SignatureSet,
    ) -> Self {
        Self {
            runtime,
            probe,
            log_paths,
            tail_lines,
            signatures,
        }
    }

    pub fn from_config(
        runtime: Arc<dyn InstanceRuntime>,
        service: &ServiceConfig,
        health: &HealthConfig,
    ) -> Result<Self> {
        Ok(Self::new(
            runtime,
            ProcessProbe::from_config(service),
            health.log_paths.clone(),
            health.tail_lines,
            SignatureSet::compile(&health.signatures)?,
        ))
    }

    /// Whether the managed service is running inside `instance`.
    pub async fn run_state(&self, instance: &Instance) -> RunState {
        match self.runtime.is_running(&instance.name).await {
            Ok(true) => self.probe.detect(self.runtime.as_ref(), &instance.name).await,
            Ok(false) => RunState::Stopped,
            Err(err) => {
                warn!(instance = %instance.name, error = %err, "runtime inspection failed; treating as stopped");
                RunState::Stopped
            }
        }
    }

    /// Scan the tail of the instance log. Absent or unreadable logs fail open.
    pub async fn log_state(&self, instance: &Instance) -> LogState {
        let tail = match self
            .runtime
            .tail_log(&instance.name, &self.log_paths, self.tail_lines)
            .await
        {
            Ok(Some(tail)) => tail,
            Ok(None) => {
                debug!(instance = %instance.name, "no log file found; assuming ok");
                return LogState::Ok;
            }
            Err(err) => {
                warn!(instance = %instance.name, error = %err, "log retrieval failed; assuming ok");
                return LogState::Ok;
            }
        };
        match self.signatures.first_match(&tail) {
            Some(signature) => {
                warn!(instance = %instance.name, signature, "failure signature found in log tail");
                LogState::Error
            }
            None => LogState::Ok,
        }
    }

    /// Combined verdict for the primary instance.
    pub async fn health(&self, primary: &Instance) -> HealthVerdict {
        if !self.run_state(primary).await.is_running() {
            return HealthVerdict::Stopped;
        }
        match self.log_state(primary).await {
            LogState::Error => HealthVerdict::Error,
            LogState::Ok => HealthVerdict::Healthy,
        }
    }
}

impl fmt::Debug for HealthEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthEvaluator")
            .field("probe", &self.probe)
            .field("log_paths", &self.log_paths)
            .field("tail_lines", &self.tail_lines)
            .field("signatures", &self.signatures.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeRuntime;
    use crate::instance::InstanceRole;
    use msf_common::config::ServiceConfig;

    const LOG: &str = "/config/Logs/server.log";

    fn evaluator(runtime: Arc<FakeRuntime>) -> HealthEvaluator {
        HealthEvaluator::new(
            runtime,
            ProcessProbe::new("Plex Media Server"),
            vec!["/missing.log".into(), LOG.into()],
            200,
            SignatureSet::compile(&["Unable to set up server", "disk I/O error"]).unwrap(),
        )
    }

    fn primary() -> Instance {
        Instance::new(InstanceRole::Primary, "plex")
    }

    #[test]
    fn signatures_match_case_insensitively_in_order() {
        let set = SignatureSet::compile(&["first", "second"]).unwrap();
        assert_eq!(set.first_match("... SECOND then FiRsT ..."), Some("first"));
        assert_eq!(set.first_match("only Second"), Some("second"));
        assert_eq!(set.first_match("nothing here"), None);
    }

    #[test]
    fn invalid_signature_is_rejected() {
        let err = SignatureSet::compile(&["(unclosed"]).unwrap_err();
        assert!(matches!(err, FailoverError::Signature { .. }));
    }

    #[tokio::test]
    async fn clean_log_is_ok() {
        let runtime = Arc::new(FakeRuntime::new(&ServiceConfig::default()));
        runtime.add_instance("plex", true, true);
        runtime.set_log("plex", LOG, "started\nlistening on 32400\n");
        assert_eq!(evaluator(runtime).log_state(&primary()).await, LogState::Ok);
    }

    #[tokio::test]
    async fn signature_in_tail_is_error() {
        let runtime = Arc::new(FakeRuntime::new(&ServiceConfig::default()));
        runtime.add_instance("plex", true, true);
        runtime.set_log("plex", LOG, "boot\nERROR - UNABLE TO SET UP SERVER: sqlite\n");
        assert_eq!(
            evaluator(runtime).log_state(&primary()).await,
            LogState::Error
        );
    }

    #[tokio::test]
    async fn missing_log_fails_open() {
        let runtime = Arc::new(FakeRuntime::new(&ServiceConfig::default()));
        runtime.add_instance("plex", true, true);
        assert_eq!(evaluator(runtime).log_state(&primary()).await, LogState::Ok);
    }

    #[tokio::test]
    async fn signature_outside_tail_window_is_ignored() {
        let runtime = Arc::new(FakeRuntime::new(&ServiceConfig::default()));
        runtime.add_instance("plex", true, true);
        let mut log = String::from("Unable to set up server\n");
        for n in 0..250 {
            log.push_str(&format!("line {n}\n"));
        }
        runtime.set_log("plex", LOG, &log);
        assert_eq!(evaluator(runtime).log_state(&primary()).await, LogState::Ok);
    }

    #[tokio::test]
    async fn probe_falls_back_through_listings() {
        let runtime = Arc::new(FakeRuntime::new(&ServiceConfig::default()));
        runtime.add_instance("plex", true, true);
        runtime.break_listing("plex", "pgrep");
        runtime.break_listing("plex", "ps aux");
        let eval = evaluator(runtime.clone());
        assert_eq!(eval.run_state(&primary()).await, RunState::Running);

        let programs: Vec<String> = runtime
            .exec_history("plex")
            .into_iter()
            .map(|argv| argv.join(" "))
            .collect();
        assert_eq!(programs, vec!["pgrep -f Plex Media Server", "ps aux", "ps -ef"]);
    }

    #[tokio::test]
    async fn all_listings_failing_reports_stopped() {
        let runtime = Arc::new(FakeRuntime::new(&ServiceConfig::default()));
        runtime.add_instance("plex", true, true);
        for listing in ["pgrep", "ps aux", "ps -ef", "ps"] {
            runtime.break_listing("plex", listing);
        }
        assert_eq!(
            evaluator(runtime).run_state(&primary()).await,
            RunState::Stopped
        );
    }

    #[tokio::test]
    async fn verdict_combines_run_and_log_state() {
        let runtime = Arc::new(FakeRuntime::new(&ServiceConfig::default()));
        runtime.add_instance("plex", true, false);
        runtime.set_log("plex", LOG, "disk I/O error\n");
        let eval = evaluator(runtime.clone());
        assert_eq!(eval.health(&primary()).await, HealthVerdict::Stopped);

        runtime.set_service_running("plex", true);
        assert_eq!(eval.health(&primary()).await, HealthVerdict::Error);

        runtime.set_log("plex", LOG, "all good\n");
        assert_eq!(eval.health(&primary()).await, HealthVerdict::Healthy);
    }

    #[tokio::test]
    async fn unknown_container_is_stopped() {
        let runtime = Arc::new(FakeRuntime::new(&ServiceConfig::default()));
        assert_eq!(
            evaluator(runtime).health(&primary()).await,
            HealthVerdict::Stopped
        );
    }
}
