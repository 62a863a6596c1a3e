//! Observability for the optimization engine
//!
//! Provides:
//! - Prometheus metrics (generation/analysis/simulation latency, cluster size,
//!   potential savings, catalog reloads, upstream failures, catalog version)
//! - Structured JSON events through tracing

use prometheus::{
    register_gauge, register_gauge_vec, register_histogram, register_int_counter_vec,
    register_int_gauge_vec, Encoder, Gauge, GaugeVec, Histogram, IntCounterVec, IntGaugeVec,
    TextEncoder,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for request-path computations (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<WizardMetricsInner> = OnceLock::new();

struct WizardMetricsInner {
    generation_latency_seconds: Histogram,
    analysis_latency_seconds: Histogram,
    simulation_latency_seconds: Histogram,
    cluster_nodes: IntGaugeVec,
    potential_savings_dollars: Gauge,
    catalog_reloads: IntCounterVec,
    upstream_errors: IntCounterVec,
    catalog_version_info: GaugeVec,
}

impl WizardMetricsInner {
    fn new() -> Self {
        Self {
            generation_latency_seconds: register_histogram!(
                "karp_ops_config_generation_latency_seconds",
                "Time spent generating provisioner and node template manifests",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register config_generation_latency_seconds"),

            analysis_latency_seconds: register_histogram!(
                "karp_ops_cost_analysis_latency_seconds",
                "Time spent computing the cluster cost snapshot",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register cost_analysis_latency_seconds"),

            simulation_latency_seconds: register_histogram!(
                "karp_ops_rebalancing_latency_seconds",
                "Time spent planning or simulating rebalancing",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register rebalancing_latency_seconds"),

            cluster_nodes: register_int_gauge_vec!(
                "karp_ops_cluster_nodes",
                "Nodes in the last inventory snapshot by capacity type",
                &["capacity_type"]
            )
            .expect("Failed to register cluster_nodes"),

            potential_savings_dollars: register_gauge!(
                "karp_ops_potential_monthly_savings_dollars",
                "Monthly savings reported by the last cost analysis"
            )
            .expect("Failed to register potential_monthly_savings_dollars"),

            catalog_reloads: register_int_counter_vec!(
                "karp_ops_catalog_reloads_total",
                "Catalog reload attempts by result",
                &["result"]
            )
            .expect("Failed to register catalog_reloads_total"),

            upstream_errors: register_int_counter_vec!(
                "karp_ops_upstream_errors_total",
                "Failed inventory or pricing fetches by provider",
                &["provider"]
            )
            .expect("Failed to register upstream_errors_total"),

            catalog_version_info: register_gauge_vec!(
                "karp_ops_catalog_version_info",
                "Fingerprint of the catalog currently served",
                &["version"]
            )
            .expect("Failed to register catalog_version_info"),
        }
    }
}

/// Handle to the process-wide metrics; clones share the same series
#[derive(Clone)]
pub struct WizardMetrics {
    _private: (),
}

impl Default for WizardMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl WizardMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(WizardMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &WizardMetricsInner {
        GLOBAL_METRICS.get_or_init(WizardMetricsInner::new)
    }

    pub fn observe_generation_latency(&self, duration_secs: f64) {
        self.inner().generation_latency_seconds.observe(duration_secs);
    }

    pub fn observe_analysis_latency(&self, duration_secs: f64) {
        self.inner().analysis_latency_seconds.observe(duration_secs);
    }

    pub fn observe_simulation_latency(&self, duration_secs: f64) {
        self.inner().simulation_latency_seconds.observe(duration_secs);
    }

    pub fn set_cluster_nodes(&self, spot: usize, on_demand: usize) {
        let nodes = &self.inner().cluster_nodes;
        nodes.with_label_values(&["spot"]).set(spot as i64);
        nodes.with_label_values(&["on-demand"]).set(on_demand as i64);
    }

    pub fn set_potential_savings(&self, monthly: f64) {
        self.inner().potential_savings_dollars.set(monthly);
    }

    pub fn inc_catalog_reload(&self, success: bool) {
        let result = if success { "success" } else { "failure" };
        self.inner().catalog_reloads.with_label_values(&[result]).inc();
    }

    pub fn inc_upstream_error(&self, provider: &str) {
        self.inner().upstream_errors.with_label_values(&[provider]).inc();
    }

    /// Replace the catalog version series
    pub fn set_catalog_version(&self, version: &str) {
        self.inner().catalog_version_info.reset();
        self.inner()
            .catalog_version_info
            .with_label_values(&[version])
            .set(1.0);
    }

    /// Render the default registry in Prometheus text format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&prometheus::gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Structured events emitted by the server
///
/// Every event carries `event = "<name>"` and the instance name so log
/// pipelines can filter on them.
#[derive(Clone)]
pub struct EventLogger {
    instance: String,
}

impl EventLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn log_config_generated(&self, preset_id: &str, region: &str, zone: &str, catalog_version: &str) {
        info!(
            event = "config_generated",
            instance = %self.instance,
            preset_id = %preset_id,
            region = %region,
            zone = %zone,
            catalog_version = %catalog_version,
            "Generated provisioner configuration"
        );
    }

    pub fn log_cost_analyzed(
        &self,
        nodes: usize,
        current_total: f64,
        potential_total: f64,
        savings_percentage: f64,
        pricing_gaps: usize,
    ) {
        info!(
            event = "cost_analyzed",
            instance = %self.instance,
            nodes = nodes,
            current_total = current_total,
            potential_total = potential_total,
            savings_percentage = savings_percentage,
            pricing_gaps = pricing_gaps,
            "Computed cluster cost snapshot"
        );
    }

    pub fn log_rebalancing_simulated(&self, strategy: &str, actions: usize, savings: &str, estimated_time: &str) {
        info!(
            event = "rebalancing_simulated",
            instance = %self.instance,
            strategy = %strategy,
            actions = actions,
            savings = %savings,
            estimated_time = %estimated_time,
            "Simulated rebalancing plan"
        );
    }

    pub fn log_catalog_reloaded(&self, old_version: &str, new_version: &str, success: bool) {
        if success {
            info!(
                event = "catalog_reloaded",
                instance = %self.instance,
                old_version = %old_version,
                new_version = %new_version,
                "Preset catalog reloaded"
            );
        } else {
            warn!(
                event = "catalog_reload_failed",
                instance = %self.instance,
                old_version = %old_version,
                "Catalog reload rejected, keeping previous version"
            );
        }
    }

    pub fn log_upstream_failure(&self, provider: &str, error: &str, consecutive_failures: u32) {
        warn!(
            event = "upstream_failure",
            instance = %self.instance,
            provider = %provider,
            error = %error,
            consecutive_failures = consecutive_failures,
            "Collaborator call failed"
        );
    }

    pub fn log_startup(&self, version: &str, catalog_version: &str, addr: &str) {
        info!(
            event = "server_started",
            instance = %self.instance,
            server_version = %version,
            catalog_version = %catalog_version,
            addr = %addr,
            "karp-ops server started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "server_shutdown",
            instance = %self.instance,
            reason = %reason,
            "karp-ops server shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_render_after_observations() {
        let metrics = WizardMetrics::new();
        metrics.observe_generation_latency(0.001);
        metrics.observe_analysis_latency(0.002);
        metrics.set_cluster_nodes(3, 7);
        metrics.set_catalog_version("abc123def456");
        metrics.inc_upstream_error("inventory");

        let text = metrics.render().unwrap();
        assert!(text.contains("karp_ops_cluster_nodes"));
        assert!(text.contains("abc123def456"));
    }

    #[test]
    fn test_event_logger_creation() {
        let logger = EventLogger::new("karp-ops-0");
        assert_eq!(logger.instance(), "karp-ops-0");
    }
}
