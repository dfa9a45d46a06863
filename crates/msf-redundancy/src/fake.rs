//! ---
//! msf_section: "07-resilience-fault-tolerance"
//! msf_subsection: "module"
//! msf_type: "source"
//! msf_scope: "code"
//! msf_description: "Failover decision engine and its collaborators."
//! msf_version: "v0.1.0"
//! msf_owner: "tbd"
//! ---
//! In-process doubles for the runtime and notification boundaries.
//!
//! [`FakeRuntime`] simulates containers, the managed service process, the
//! process-listing tools and log files, so engine behaviour can be driven
//! deterministically without a container runtime.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use msf_common::config::ServiceConfig;
use parking_lot::Mutex;

use crate::error::{FailoverError, Result};
use crate::notify::{Notification, Notifier};
use crate::runtime::{ExecOutput, InstanceRuntime};

#[derive(Debug, Default)]
struct FakeInstance {
    container_running: bool,
    service_running: bool,
    autostart: bool,
    start_fails: bool,
    container_starts: usize,
    logs: HashMap<String, String>,
    broken_listings: HashSet<String>,
    history: Vec<Vec<String>>,
}

/// Simulated container runtime.
#[derive(Debug)]
pub struct FakeRuntime {
    pattern: String,
    start_command: Vec<String>,
    stop_command: Vec<String>,
    instances: Mutex<HashMap<String, FakeInstance>>,
}

impl FakeRuntime {
    /// Build a runtime that understands the service commands in `service`.
    pub fn new(service: &ServiceConfig) -> Self {
        Self {
            pattern: service.process_pattern.clone(),
            start_command: service.start_command.clone(),
            stop_command: service.stop_command.clone(),
            instances: Mutex::new(HashMap::new()),
        }
    }

    pub fn add_instance(&self, name: &str, container_running: bool, service_running: bool) {
        self.instances.lock().insert(
            name.to_owned(),
            FakeInstance {
                container_running,
                service_running: container_running && service_running,
                ..FakeInstance::default()
            },
        );
    }

    pub fn set_log(&self, name: &str, path: &str, contents: &str) {
        self.with(name, |inst| {
            inst.logs.insert(path.to_owned(), contents.to_owned());
        });
    }

    /// Make a listing tool fail. `key` is `"pgrep"` or the full `ps` argv,
    /// e.g. `"ps aux"`.
    pub fn break_listing(&self, name: &str, key: &str) {
        self.with(name, |inst| {
            inst.broken_listings.insert(key.to_owned());
        });
    }

    pub fn set_service_running(&self, name: &str, running: bool) {
        self.with(name, |inst| inst.service_running = running);
    }

    /// Whether the service comes up by itself when the container starts.
    pub fn set_autostart(&self, name: &str, autostart: bool) {
        self.with(name, |inst| inst.autostart = autostart);
    }

    pub fn set_start_fails(&self, name: &str, fails: bool) {
        self.with(name, |inst| inst.start_fails = fails);
    }

    pub fn container_running(&self, name: &str) -> bool {
        self.read(name, |inst| inst.container_running)
    }

    pub fn service_running(&self, name: &str) -> bool {
        self.read(name, |inst| inst.service_running)
    }

    pub fn container_starts(&self, name: &str) -> usize {
        self.read(name, |inst| inst.container_starts)
    }

    /// Every argv executed inside `name`, in order.
    pub fn exec_history(&self, name: &str) -> Vec<Vec<String>> {
        self.read(name, |inst| inst.history.clone())
    }

    fn with(&self, name: &str, f: impl FnOnce(&mut FakeInstance)) {
        if let Some(inst) = self.instances.lock().get_mut(name) {
            f(inst);
        }
    }

    fn read<T: Default>(&self, name: &str, f: impl FnOnce(&FakeInstance) -> T) -> T {
        self.instances.lock().get(name).map(f).unwrap_or_default()
    }

    fn unknown(name: &str) -> FailoverError {
        FailoverError::Runtime {
            instance: name.to_owned(),
            reason: "no such container".into(),
        }
    }

    fn listing_output(&self, running: bool, header: &str) -> ExecOutput {
        let mut out = format!("{header}\n    1 root     s6-svscan\n");
        if running {
            out.push_str(&format!("  211 abc      /usr/lib/plexmediaserver/{}\n", self.pattern));
        }
        ExecOutput::ok(out)
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    let mut out = all[start..].join("\n");
    out.push('\n');
    out
}

#[async_trait]
impl InstanceRuntime for FakeRuntime {
    async fn is_running(&self, instance: &str) -> Result<bool> {
        self.instances
            .lock()
            .get(instance)
            .map(|inst| inst.container_running)
            .ok_or_else(|| Self::unknown(instance))
    }

    async fn start(&self, instance: &str) -> Result<()> {
        let mut instances = self.instances.lock();
        let inst = instances
            .get_mut(instance)
            .ok_or_else(|| Self::unknown(instance))?;
        if !inst.container_running {
            inst.container_running = true;
            inst.container_starts += 1;
            if inst.autostart {
                inst.service_running = true;
            }
        }
        Ok(())
    }

    async fn exec(&self, instance: &str, argv: &[String]) -> Result<ExecOutput> {
        let mut instances = self.instances.lock();
        let inst = instances
            .get_mut(instance)
            .ok_or_else(|| Self::unknown(instance))?;
        if !inst.container_running {
            return Err(FailoverError::Runtime {
                instance: instance.to_owned(),
                reason: "container is not running".into(),
            });
        }
        inst.history.push(argv.to_vec());

        if argv == self.start_command.as_slice() {
            if inst.start_fails {
                return Ok(ExecOutput::failed());
            }
            inst.service_running = true;
            return Ok(ExecOutput::ok(""));
        }
        if argv == self.stop_command.as_slice() {
            inst.service_running = false;
            return Ok(ExecOutput::ok(""));
        }

        let args: Vec<&str> = argv.iter().map(String::as_str).collect();
        let listing_key = match args.first() {
            Some(&"pgrep") => Some("pgrep".to_owned()),
            Some(&"ps") => Some(args.join(" ")),
            _ => None,
        };
        if let Some(key) = listing_key {
            if inst.broken_listings.contains(&key) {
                return Ok(ExecOutput::failed());
            }
            return Ok(match args.as_slice() {
                ["pgrep", ..] if inst.service_running => ExecOutput::ok("211\n"),
                ["pgrep", ..] => ExecOutput::failed(),
                ["ps", "aux"] => self.listing_output(inst.service_running, "USER PID COMMAND"),
                ["ps", "-ef"] => self.listing_output(inst.service_running, "UID PID CMD"),
                ["ps"] => self.listing_output(inst.service_running, "PID USER COMMAND"),
                _ => ExecOutput::failed(),
            });
        }

        Ok(match args.as_slice() {
            ["test", "-f", path] if inst.logs.contains_key(*path) => ExecOutput::ok(""),
            ["tail", "-n", count, path] => match (count.parse::<usize>(), inst.logs.get(*path)) {
                (Ok(lines), Some(text)) => ExecOutput::ok(tail(text, lines)),
                _ => ExecOutput::failed(),
            },
            _ => ExecOutput::failed(),
        })
    }
}

/// Notifier that records every attempt and can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    failing: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    /// All attempted notifications, including failed deliveries.
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        self.sent.lock().push(notification.clone());
        if *self.failing.lock() {
            return Err(FailoverError::CommandFailed {
                program: "recording-notifier".into(),
                status: 1,
                stderr: "delivery disabled".into(),
            });
        }
        Ok(())
    }
}
