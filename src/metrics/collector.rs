//! Metrics Collector

use std::time::Duration;

use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use tracing::error;

use crate::error::RelayError;

/// Relay session metrics, exported in the Prometheus text format
pub struct Metrics {
    registry: Registry,
    sessions_total: IntCounter,
    active_sessions: IntGauge,
    session_errors_total: IntCounterVec,
    bytes_upstream_total: IntCounter,
    bytes_downstream_total: IntCounter,
    session_duration: Histogram,
}

impl Metrics {
    /// Create a new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let sessions_total = IntCounter::new(
            "vless_sessions_total",
            "Total number of accepted WebSocket sessions",
        )?;
        let active_sessions = IntGauge::new(
            "vless_active_sessions",
            "Number of currently open sessions",
        )?;
        let session_errors_total = IntCounterVec::new(
            Opts::new("vless_session_errors_total", "Sessions ended by an error"),
            &["kind"],
        )?;
        let bytes_upstream_total = IntCounter::new(
            "vless_bytes_upstream_total",
            "Bytes relayed from clients to upstream targets",
        )?;
        let bytes_downstream_total = IntCounter::new(
            "vless_bytes_downstream_total",
            "Bytes relayed from upstream targets to clients",
        )?;
        let session_duration = Histogram::with_opts(
            HistogramOpts::new(
                "vless_session_duration_seconds",
                "Duration of relay sessions in seconds",
            )
            .buckets(vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 600.0]),
        )?;

        registry.register(Box::new(sessions_total.clone()))?;
        registry.register(Box::new(active_sessions.clone()))?;
        registry.register(Box::new(session_errors_total.clone()))?;
        registry.register(Box::new(bytes_upstream_total.clone()))?;
        registry.register(Box::new(bytes_downstream_total.clone()))?;
        registry.register(Box::new(session_duration.clone()))?;

        Ok(Self {
            registry,
            sessions_total,
            active_sessions,
            session_errors_total,
            bytes_upstream_total,
            bytes_downstream_total,
            session_duration,
        })
    }

    pub fn session_started(&self) {
        self.sessions_total.inc();
        self.active_sessions.inc();
    }

    /// Record the end of a session, successful or not
    pub fn session_finished(
        &self,
        duration: Duration,
        bytes_up: u64,
        bytes_down: u64,
        error: Option<&RelayError>,
    ) {
        self.active_sessions.dec();
        self.bytes_upstream_total.inc_by(bytes_up);
        self.bytes_downstream_total.inc_by(bytes_down);
        self.session_duration.observe(duration.as_secs_f64());
        if let Some(e) = error {
            self.session_errors_total.with_label_values(&[e.kind()]).inc();
        }
    }

    pub fn active_sessions(&self) -> i64 {
        self.active_sessions.get()
    }

    pub fn sessions_total(&self) -> u64 {
        self.sessions_total.get()
    }

    pub fn errors_of_kind(&self, kind: &str) -> u64 {
        self.session_errors_total.with_label_values(&[kind]).get()
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn export_prometheus(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        match encoder.encode_to_string(&metric_families) {
            Ok(output) => output,
            Err(e) => {
                error!(error = %e, "Failed to encode Prometheus metrics");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_lifecycle() {
        let metrics = Metrics::new().unwrap();
        metrics.session_started();
        metrics.session_started();
        assert_eq!(metrics.active_sessions(), 2);

        metrics.session_finished(Duration::from_millis(20), 10, 20, None);
        metrics.session_finished(
            Duration::from_millis(5),
            0,
            0,
            Some(&RelayError::AuthenticationFailed),
        );

        assert_eq!(metrics.active_sessions(), 0);
        assert_eq!(metrics.sessions_total(), 2);
        assert_eq!(metrics.errors_of_kind("auth_failed"), 1);
        assert_eq!(metrics.errors_of_kind("header_too_short"), 0);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = Metrics::new().unwrap();
        metrics.session_started();
        metrics.session_finished(Duration::from_secs(1), 100, 200, Some(&RelayError::HeaderTooShort));

        let output = metrics.export_prometheus();
        assert!(output.contains("vless_sessions_total 1"));
        assert!(output.contains("vless_bytes_downstream_total 200"));
        assert!(output.contains("kind=\"header_too_short\""));
    }
}
