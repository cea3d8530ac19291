//! Prometheus metrics for one exporter.
//!
//! Every [`ExporterMetrics`] owns its own [`Registry`], labelled with the
//! exporter name, so several exporters in one process never collide. The
//! crate does not serve the registry; embedders gather it through
//! [`ExporterMetrics::registry`].

use crate::position::Position;
use crate::Result;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Clone)]
pub struct ExporterMetrics {
    registry: Registry,
    restart_count: IntCounter,
    last_exported_position: IntGauge,
    exported_records: IntCounter,
    requests_made: IntCounter,
    requests_response_time: Histogram,
}

impl ExporterMetrics {
    pub fn new(exporter: &str) -> Result<Self> {
        let labels = HashMap::from([("exporter".to_string(), exporter.to_string())]);
        let registry = Registry::new_custom(None, Some(labels))?;

        let restart_count = IntCounter::with_opts(Opts::new(
            "restart_count",
            "Number of restarts",
        ))?;
        let last_exported_position = IntGauge::with_opts(Opts::new(
            "last_exported_position",
            "The last position that was saved by the exporter",
        ))?;
        let exported_records = IntCounter::with_opts(Opts::new(
            "exported_records_count",
            "Number of records acknowledged by the broker",
        ))?;
        let requests_made = IntCounter::with_opts(Opts::new(
            "requests_made_count",
            "Number of publish requests made to the broker",
        ))?;
        let requests_response_time = Histogram::with_opts(HistogramOpts::new(
            "requests_response_time",
            "The response time of publish requests in seconds",
        ))?;

        registry.register(Box::new(restart_count.clone()))?;
        registry.register(Box::new(last_exported_position.clone()))?;
        registry.register(Box::new(exported_records.clone()))?;
        registry.register(Box::new(requests_made.clone()))?;
        registry.register(Box::new(requests_response_time.clone()))?;

        Ok(Self {
            registry,
            restart_count,
            last_exported_position,
            exported_records,
            requests_made,
            requests_response_time,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn restart_count(&self) -> u64 {
        self.restart_count.get()
    }

    pub fn last_exported_position(&self) -> i64 {
        self.last_exported_position.get()
    }

    pub fn exported_records(&self) -> u64 {
        self.exported_records.get()
    }

    pub fn requests_made(&self) -> u64 {
        self.requests_made.get()
    }

    pub(crate) fn record_restart(&self) {
        self.restart_count.inc();
    }

    /// Records one publish request; only acknowledged batches count records.
    pub(crate) fn record_request(&self, records: usize, elapsed: Duration, acknowledged: bool) {
        self.requests_made.inc();
        self.requests_response_time.observe(elapsed.as_secs_f64());
        if acknowledged {
            self.exported_records.inc_by(records as u64);
        }
    }

    /// Tracks the saved position when it has a numeric value or key.
    pub(crate) fn record_position(&self, position: &Position) {
        if let Some(value) = position
            .as_u64()
            .or_else(|| position.key())
            .and_then(|value| i64::try_from(value).ok())
        {
            self.last_exported_position.set(value);
        }
    }
}

impl std::fmt::Debug for ExporterMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExporterMetrics")
            .field("restart_count", &self.restart_count())
            .field("last_exported_position", &self.last_exported_position())
            .field("exported_records", &self.exported_records())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_registry_holds_exporter_metrics() {
        let metrics = ExporterMetrics::new("acme-exporter").unwrap();
        let families = metrics.registry().gather();
        let names: Vec<&str> = families.iter().map(|f| f.get_name()).collect();

        for name in [
            "restart_count",
            "last_exported_position",
            "exported_records_count",
            "requests_made_count",
            "requests_response_time",
        ] {
            assert!(names.contains(&name), "missing {}", name);
        }

        let label = &families[0].get_metric()[0].get_label()[0];
        assert_eq!(label.get_name(), "exporter");
        assert_eq!(label.get_value(), "acme-exporter");
    }

    #[test]
    fn test_position_gauge_uses_number_then_key() {
        let metrics = ExporterMetrics::new("acme-exporter").unwrap();

        metrics.record_position(&Position::from(json!(1000)));
        assert_eq!(metrics.last_exported_position(), 1000);

        metrics.record_position(&Position::from(json!({"timestamp": 1001, "key": 7})));
        assert_eq!(metrics.last_exported_position(), 7);

        metrics.record_position(&Position::LegacyInteger(12));
        assert_eq!(metrics.last_exported_position(), 12);

        metrics.record_position(&Position::from(json!({"timestamp": 1002})));
        assert_eq!(metrics.last_exported_position(), 12);
    }

    #[test]
    fn test_failed_request_counts_no_records() {
        let metrics = ExporterMetrics::new("acme-exporter").unwrap();

        metrics.record_request(3, Duration::from_millis(5), true);
        metrics.record_request(4, Duration::from_millis(5), false);

        assert_eq!(metrics.requests_made(), 2);
        assert_eq!(metrics.exported_records(), 3);
    }
}
