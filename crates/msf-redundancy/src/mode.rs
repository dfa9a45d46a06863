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

use serde::Serialize;
use tracing::warn;

use crate::error::Result;
use crate::state::StateStore;

pub const MODE_KEY: &str = "mode";

/// Operator-selected failover mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Auto,
    ForcePrimary,
    ForceSecondary,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Auto => "auto",
            Mode::ForcePrimary => "force_primary",
            Mode::ForceSecondary => "force_secondary",
        }
    }

    /// Parse a persisted value; only the three exact spellings are recognised.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "auto" => Some(Mode::Auto),
            "force_primary" => Some(Mode::ForcePrimary),
            "force_secondary" => Some(Mode::ForceSecondary),
            _ => None,
        }
    }

    /// Parse with the fallback rule: anything unrecognised is [`Mode::Auto`].
    pub fn parse_or_auto(value: &str) -> Self {
        Self::parse(value).unwrap_or_default()
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reads and writes the persisted mode. No locking: last write wins.
#[derive(Debug, Clone)]
pub struct ModeStore {
    store: Arc<dyn StateStore>,
}

impl ModeStore {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Current mode, coercing missing, unreadable or unknown values to auto.
    pub fn get(&self) -> Mode {
        match self.store.read(MODE_KEY) {
            Ok(Some(raw)) => Mode::parse(&raw).unwrap_or_else(|| {
                warn!(value = %raw, "unrecognised mode value; using auto");
                Mode::Auto
            }),
            Ok(None) => Mode::Auto,
            Err(err) => {
                warn!(error = %err, "failed to read mode; using auto");
                Mode::Auto
            }
        }
    }

    pub fn set(&self, mode: Mode) -> Result<()> {
        self.store.write(MODE_KEY, mode.as_str())
    }

    /// Persist `auto` when no mode has ever been written. Returns whether a
    /// default was written.
    pub fn ensure_default(&self) -> Result<bool> {
        if self.store.read(MODE_KEY)?.is_some() {
            return Ok(false);
        }
        self.set(Mode::Auto)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryStateStore;

    fn store() -> (Arc<MemoryStateStore>, ModeStore) {
        let backing = Arc::new(MemoryStateStore::new());
        let modes = ModeStore::new(backing.clone());
        (backing, modes)
    }

    #[test]
    fn missing_mode_defaults_to_auto() {
        let (_, modes) = store();
        assert_eq!(modes.get(), Mode::Auto);
    }

    #[test]
    fn set_then_get_roundtrips() {
        let (_, modes) = store();
        modes.set(Mode::ForceSecondary).unwrap();
        assert_eq!(modes.get(), Mode::ForceSecondary);
    }

    #[test]
    fn garbage_is_coerced_to_auto() {
        let (backing, modes) = store();
        for raw in ["force-primary", "FORCE_PRIMARY", "manual", ""] {
            backing.write(MODE_KEY, raw).unwrap();
            assert_eq!(modes.get(), Mode::Auto, "value {raw:?}");
        }
    }

    #[test]
    fn ensure_default_only_writes_once() {
        let (backing, modes) = store();
        assert!(modes.ensure_default().unwrap());
        assert_eq!(backing.read(MODE_KEY).unwrap().as_deref(), Some("auto"));
        modes.set(Mode::ForcePrimary).unwrap();
        assert!(!modes.ensure_default().unwrap());
        assert_eq!(modes.get(), Mode::ForcePrimary);
    }

    #[test]
    fn surrounding_whitespace_is_tolerated() {
        assert_eq!(Mode::parse(" force_primary\n"), Some(Mode::ForcePrimary));
        assert_eq!(Mode::parse_or_auto("nonsense"), Mode::Auto);
    }
}
