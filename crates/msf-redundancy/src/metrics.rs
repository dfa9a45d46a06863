//! ---
//! msf_section: "07-resilience-fault-tolerance"
//! msf_subsection: "module"
//! msf_type: "source"
//! msf_scope: "code"
//! msf_description: "Failover decision engine and its collaborators."
//! msf_version: "v0.1.0"
//! msf_owner: "tbd"
//! ---
use std::time::Duration;

use msf_metrics::SharedRegistry;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGaugeVec, Opts};

use crate::error::Result;
use crate::health::HealthVerdict;

/// Prometheus handles updated once per tick.
#[derive(Debug, Clone)]
pub struct FailoverMetrics {
    ticks: IntCounter,
    tick_duration: Histogram,
    actions: IntCounterVec,
    notifications: IntCounterVec,
    primary_health: IntGaugeVec,
}

impl FailoverMetrics {
    /// Register failover metrics with the provided registry.
    pub fn register(registry: &SharedRegistry) -> Result<Self> {
        let ticks = IntCounter::with_opts(Opts::new(
            "msf_ticks_total",
            "Completed failover engine ticks",
        ))?;
        let tick_duration = Histogram::with_opts(
            HistogramOpts::new(
                "msf_tick_duration_seconds",
                "Wall time spent evaluating and converging one tick",
            )
            .buckets(vec![0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0]),
        )?;
        let actions = IntCounterVec::new(
            Opts::new("msf_actions_total", "Applied instance actions"),
            &["action"],
        )?;
        let notifications = IntCounterVec::new(
            Opts::new(
                "msf_notifications_total",
                "Notification attempts by outcome",
            ),
            &["outcome"],
        )?;
        let primary_health = IntGaugeVec::new(
            Opts::new(
                "msf_primary_health",
                "Current primary verdict (1 for the active verdict)",
            ),
            &["verdict"],
        )?;

        registry.register(Box::new(ticks.clone()))?;
        registry.register(Box::new(tick_duration.clone()))?;
        registry.register(Box::new(actions.clone()))?;
        registry.register(Box::new(notifications.clone()))?;
        registry.register(Box::new(primary_health.clone()))?;

        Ok(Self {
            ticks,
            tick_duration,
            actions,
            notifications,
            primary_health,
        })
    }

    pub fn observe_tick(&self, elapsed: Duration) {
        self.ticks.inc();
        self.tick_duration.observe(elapsed.as_secs_f64());
    }

    pub fn record_action(&self, action: &str) {
        self.actions.with_label_values(&[action]).inc();
    }

    pub fn record_notification(&self, outcome: &str) {
        self.notifications.with_label_values(&[outcome]).inc();
    }

    pub fn set_health(&self, verdict: HealthVerdict) {
        for candidate in HealthVerdict::ALL {
            self.primary_health
                .with_label_values(&[candidate.as_str()])
                .set(i64::from(candidate == verdict));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msf_metrics::new_registry;

    #[test]
    fn records_are_visible_in_registry() {
        let registry = new_registry();
        let metrics = FailoverMetrics::register(&registry).unwrap();
        metrics.observe_tick(Duration::from_millis(40));
        metrics.record_action("secondary-started");
        metrics.record_notification("delivered");
        metrics.set_health(HealthVerdict::Error);

        let families = registry.gather();
        let names: Vec<&str> = families.iter().map(|f| f.get_name()).collect();
        for expected in [
            "msf_ticks_total",
            "msf_tick_duration_seconds",
            "msf_actions_total",
            "msf_notifications_total",
            "msf_primary_health",
        ] {
            assert!(names.contains(&expected), "missing {expected}");
        }

        let health = families
            .iter()
            .find(|f| f.get_name() == "msf_primary_health")
            .unwrap();
        let active: Vec<_> = health
            .get_metric()
            .iter()
            .filter(|m| m.get_gauge().get_value() == 1.0)
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].get_label()[0].get_value(), "error");
    }

    #[test]
    fn double_registration_fails() {
        let registry = new_registry();
        FailoverMetrics::register(&registry).unwrap();
        assert!(FailoverMetrics::register(&registry).is_err());
    }
}
