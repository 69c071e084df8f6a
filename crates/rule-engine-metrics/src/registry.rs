// rule-engine-metrics/src/registry.rs
// ============================================================================
// Module: Metrics Registry (C11)
// Description: Registers every counter/histogram/gauge spec §4.11 names
//              against a `prometheus::Registry` and routes every label
//              write through the cardinality guard first.
// Purpose: No call site can bypass the guard — `MetricsRegistry` is the
//          only way to touch a metric.
// Dependencies: prometheus, parking_lot
// ============================================================================

use parking_lot::Mutex;
use prometheus::CounterVec;
use prometheus::Encoder;
use prometheus::Gauge;
use prometheus::GaugeVec;
use prometheus::HistogramOpts;
use prometheus::HistogramVec;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;
use rule_engine_core::CircuitState;

use crate::cardinality::CardinalityGuard;
use crate::error::MetricsError;

const EXEC_DURATION_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];
const HTTP_DURATION_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

fn circuit_state_value(state: CircuitState) -> f64 {
    match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    }
}

/// Owns every C11 metric and the cardinality guard that every labeled write
/// passes through (spec §4.11).
pub struct MetricsRegistry {
    registry: Registry,
    guard: Mutex<CardinalityGuard>,
    rule_execution_total: CounterVec,
    rule_timeout_total: CounterVec,
    http_requests_total: CounterVec,
    telemetry_ingestion_total: CounterVec,
    notifications_sent_total: CounterVec,
    device_state_changes_total: CounterVec,
    rule_execution_duration_seconds: HistogramVec,
    data_collection_duration_seconds: HistogramVec,
    http_request_duration_seconds: HistogramVec,
    queue_depth: Gauge,
    worker_count: Gauge,
    circuit_state: GaugeVec,
}

impl MetricsRegistry {
    /// Builds a fresh registry and registers every metric (spec §4.11).
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Registration`] if `prometheus` rejects a
    /// metric definition (e.g. a duplicate name).
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let rule_execution_total = CounterVec::new(Opts::new("rule_execution_total", "Rule chain executions by outcome"), &["ruleChainId", "organizationId", "status"])?;
        let rule_timeout_total = CounterVec::new(Opts::new("rule_timeout_total", "Timeouts raised during chain execution"), &["ruleChainId", "type"])?;
        let http_requests_total = CounterVec::new(Opts::new("http_requests_total", "HTTP requests served"), &["method", "route", "status_code"])?;
        let telemetry_ingestion_total = CounterVec::new(Opts::new("telemetry_ingestion_total", "Telemetry readings ingested"), &["organizationId", "result"])?;
        let notifications_sent_total = CounterVec::new(Opts::new("notifications_sent_total", "Notifications published by protocol"), &["protocol", "result"])?;
        let device_state_changes_total = CounterVec::new(Opts::new("device_state_changes_total", "Device-state instances written"), &["ruleChainId", "actionType"])?;

        let rule_execution_duration_seconds =
            HistogramVec::new(HistogramOpts::new("rule_execution_duration_seconds", "Rule chain execution latency").buckets(EXEC_DURATION_BUCKETS.to_vec()), &["ruleChainId"])?;
        let data_collection_duration_seconds =
            HistogramVec::new(HistogramOpts::new("data_collection_duration_seconds", "Data collection latency").buckets(EXEC_DURATION_BUCKETS.to_vec()), &["organizationId"])?;
        let http_request_duration_seconds =
            HistogramVec::new(HistogramOpts::new("http_request_duration_seconds", "HTTP request latency").buckets(HTTP_DURATION_BUCKETS.to_vec()), &["method", "route"])?;

        let queue_depth = Gauge::new("rule_engine_queue_depth", "Pending jobs in the event queue")?;
        let worker_count = Gauge::new("rule_engine_worker_count", "Active worker tasks")?;
        let circuit_state = GaugeVec::new(Opts::new("rule_engine_circuit_state", "Breaker state: 0=closed, 1=half-open, 2=open"), &["type"])?;

        registry.register(Box::new(rule_execution_total.clone()))?;
        registry.register(Box::new(rule_timeout_total.clone()))?;
        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(telemetry_ingestion_total.clone()))?;
        registry.register(Box::new(notifications_sent_total.clone()))?;
        registry.register(Box::new(device_state_changes_total.clone()))?;
        registry.register(Box::new(rule_execution_duration_seconds.clone()))?;
        registry.register(Box::new(data_collection_duration_seconds.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;
        registry.register(Box::new(worker_count.clone()))?;
        registry.register(Box::new(circuit_state.clone()))?;

        Ok(Self {
            registry,
            guard: Mutex::new(CardinalityGuard::new()),
            rule_execution_total,
            rule_timeout_total,
            http_requests_total,
            telemetry_ingestion_total,
            notifications_sent_total,
            device_state_changes_total,
            rule_execution_duration_seconds,
            data_collection_duration_seconds,
            http_request_duration_seconds,
            queue_depth,
            worker_count,
            circuit_state,
        })
    }

    fn check_labels(&self, pairs: &[(&str, &str)]) -> Result<(), MetricsError> {
        let mut guard = self.guard.lock();
        for (label, value) in pairs {
            guard.check(label, value)?;
        }
        Ok(())
    }

    /// Records one rule-chain execution and its latency (spec §4.11).
    ///
    /// # Errors
    ///
    /// Returns a [`MetricsError`] and records nothing when a label is
    /// forbidden or a cardinality cap is exceeded (spec §8 invariant 6).
    pub fn record_rule_execution(&self, rule_chain_id: &str, organization_id: &str, status: &str, duration_secs: f64) -> Result<(), MetricsError> {
        self.check_labels(&[("ruleChainId", rule_chain_id), ("organizationId", organization_id), ("status", status)])?;
        self.rule_execution_total.with_label_values(&[rule_chain_id, organization_id, status]).inc();
        self.rule_execution_duration_seconds.with_label_values(&[rule_chain_id]).observe(duration_secs);
        Ok(())
    }

    /// Records a timeout raised during chain execution (spec §4.11, §7).
    ///
    /// # Errors
    ///
    /// See [`Self::record_rule_execution`].
    pub fn record_rule_timeout(&self, rule_chain_id: &str, timeout_code: &str) -> Result<(), MetricsError> {
        self.check_labels(&[("ruleChainId", rule_chain_id), ("type", timeout_code)])?;
        self.rule_timeout_total.with_label_values(&[rule_chain_id, timeout_code]).inc();
        Ok(())
    }

    /// Records one served HTTP request and its latency (spec §4.11).
    ///
    /// # Errors
    ///
    /// See [`Self::record_rule_execution`].
    pub fn record_http_request(&self, method: &str, route: &str, status_code: &str, duration_secs: f64) -> Result<(), MetricsError> {
        self.check_labels(&[("method", method), ("route", route), ("status_code", status_code)])?;
        self.http_requests_total.with_label_values(&[method, route, status_code]).inc();
        self.http_request_duration_seconds.with_label_values(&[method, route]).observe(duration_secs);
        Ok(())
    }

    /// Records one telemetry ingestion outcome (spec §4.11).
    ///
    /// # Errors
    ///
    /// See [`Self::record_rule_execution`].
    pub fn record_telemetry_ingestion(&self, organization_id: &str, result: &str) -> Result<(), MetricsError> {
        self.check_labels(&[("organizationId", organization_id), ("result", result)])?;
        self.telemetry_ingestion_total.with_label_values(&[organization_id, result]).inc();
        Ok(())
    }

    /// Records data-collection latency for one job (spec §4.11).
    ///
    /// # Errors
    ///
    /// See [`Self::record_rule_execution`].
    pub fn record_data_collection_duration(&self, organization_id: &str, duration_secs: f64) -> Result<(), MetricsError> {
        self.check_labels(&[("organizationId", organization_id)])?;
        self.data_collection_duration_seconds.with_label_values(&[organization_id]).observe(duration_secs);
        Ok(())
    }

    /// Records one published notification (spec §4.11).
    ///
    /// # Errors
    ///
    /// See [`Self::record_rule_execution`].
    pub fn record_notification_sent(&self, protocol: &str, result: &str) -> Result<(), MetricsError> {
        self.check_labels(&[("protocol", protocol), ("result", result)])?;
        self.notifications_sent_total.with_label_values(&[protocol, result]).inc();
        Ok(())
    }

    /// Records one persisted device-state instance (spec §4.11).
    ///
    /// # Errors
    ///
    /// See [`Self::record_rule_execution`].
    pub fn record_device_state_change(&self, rule_chain_id: &str, action_type: &str) -> Result<(), MetricsError> {
        self.check_labels(&[("ruleChainId", rule_chain_id), ("actionType", action_type)])?;
        self.device_state_changes_total.with_label_values(&[rule_chain_id, action_type]).inc();
        Ok(())
    }

    /// Sets the queue-depth gauge (spec §4.11).
    pub fn set_queue_depth(&self, depth: i64) {
        self.queue_depth.set(depth as f64);
    }

    /// Sets the active-worker-count gauge (spec §4.11).
    pub fn set_worker_count(&self, count: i64) {
        self.worker_count.set(count as f64);
    }

    /// Sets the circuit-state gauge for a named breaker kind, e.g. `"backpressure"`
    /// or `"chain"` (spec §4.11).
    ///
    /// # Errors
    ///
    /// Returns a [`MetricsError`] and records nothing when `kind` is not a
    /// recognized label value (spec §8 invariant 6).
    pub fn set_circuit_state(&self, kind: &str, state: CircuitState) -> Result<(), MetricsError> {
        self.check_labels(&[("type", kind)])?;
        self.circuit_state.with_label_values(&[kind]).set(circuit_state_value(state));
        Ok(())
    }

    /// Renders every registered metric in Prometheus text exposition format
    /// for the metrics HTTP endpoint.
    ///
    /// # Errors
    ///
    /// Returns a [`MetricsError`] if encoding the metric families fails.
    pub fn gather(&self) -> Result<String, MetricsError> {
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer).map_err(MetricsError::Registration)?;
        String::from_utf8(buffer).map_err(|err| MetricsError::Registration(prometheus::Error::Msg(err.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_rule_execution_and_exposes_it() {
        let metrics = MetricsRegistry::new().expect("registry");
        metrics.record_rule_execution("chain-1", "org-1", "success", 0.042).expect("record");
        let output = metrics.gather().expect("gather");
        assert!(output.contains("rule_execution_total"));
        assert!(output.contains("rule_execution_duration_seconds"));
    }

    #[test]
    fn rule_timeout_records_against_registered_labels() {
        let metrics = MetricsRegistry::new().expect("registry");
        metrics.record_rule_timeout("chain-1", "DATA_COLLECTION_TIMEOUT").expect("record");
        let output = metrics.gather().expect("gather");
        assert!(output.contains("rule_timeout_total"));
    }

    #[test]
    fn cardinality_overflow_is_fatal_and_records_nothing() {
        let metrics = MetricsRegistry::new().expect("registry");
        for i in 0..5 {
            metrics.record_rule_execution("chain-1", "org-1", &format!("status-{i}"), 0.01).expect("record");
        }
        let err = metrics.record_rule_execution("chain-1", "org-1", "status-5", 0.01).unwrap_err();
        assert!(matches!(err, MetricsError::CardinalityExceeded { .. }));
    }

    #[test]
    fn circuit_state_gauge_encodes_numeric_value() {
        let metrics = MetricsRegistry::new().expect("registry");
        metrics.set_circuit_state("backpressure", CircuitState::Open).expect("set");
        let output = metrics.gather().expect("gather");
        assert!(output.contains("rule_engine_circuit_state"));
    }
}
