//! ---
//! msf_section: "07-resilience-fault-tolerance"
//! msf_subsection: "module"
//! msf_type: "source"
//! msf_scope: "code"
//! msf_description: "Failover decision engine and its collaborators."
//! msf_version: "v0.1.0"
//! msf_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use msf_common::time::{elapsed_between, Clock};
use tracing::warn;

use crate::state::StateStore;

pub const LAST_NOTIFY_KEY: &str = "last_notify";

/// Minimum spacing between delivered notifications, persisted across restarts.
#[derive(Debug, Clone)]
pub struct NotificationThrottle {
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    window: Duration,
}

impl NotificationThrottle {
    pub fn new(store: Arc<dyn StateStore>, clock: Arc<dyn Clock>, window: Duration) -> Self {
        Self {
            store,
            clock,
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Timestamp of the last delivered notification, if one was recorded.
    pub fn last_notified(&self) -> Option<DateTime<Utc>> {
        let raw = match self.store.read(LAST_NOTIFY_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!(error = %err, "failed to read notification timestamp");
                return None;
            }
        };
        match raw.parse::<i64>().ok().and_then(|secs| DateTime::from_timestamp(secs, 0)) {
            Some(at) => Some(at),
            None => {
                warn!(value = %raw, "corrupt notification timestamp ignored");
                None
            }
        }
    }

    pub fn can_notify(&self) -> bool {
        match self.last_notified() {
            Some(last) => elapsed_between(last, self.clock.now()) >= self.window,
            None => true,
        }
    }

    pub fn mark_notified(&self) {
        let now = self.clock.now().timestamp().to_string();
        if let Err(err) = self.store.write(LAST_NOTIFY_KEY, &now) {
            warn!(error = %err, "failed to persist notification timestamp");
        }
    }
}
