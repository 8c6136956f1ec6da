//! # Metrics
//!
//! Metric names recorded through the `metrics` facade, plus installation of
//! the Prometheus recorder used by the binary. Library code only records;
//! whether anything is exported is up to the embedding process.

use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::core::error::{LbError, LbResult};

pub const ASSIGNMENTS_TOTAL: &str = "agent_lb_assignments_total";
pub const ASSIGNMENT_FAILURES_TOTAL: &str = "agent_lb_assignment_failures_total";
pub const ASSIGNMENT_DURATION_SECONDS: &str = "agent_lb_assignment_duration_seconds";
pub const ENDPOINT_CHANGES_TOTAL: &str = "agent_lb_endpoint_changes_total";
pub const PUSHES_TOTAL: &str = "agent_lb_pushes_total";
pub const PUSH_FAILURES_TOTAL: &str = "agent_lb_push_failures_total";

const DURATION_BUCKETS: &[f64] = &[0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05, 0.1];

/// Register descriptions for every metric this crate records
pub fn describe_metrics() {
    describe_counter!(ASSIGNMENTS_TOTAL, "Endpoint lists computed, labelled by algorithm");
    describe_counter!(ASSIGNMENT_FAILURES_TOTAL, "Endpoint list requests that failed, labelled by error type");
    describe_histogram!(ASSIGNMENT_DURATION_SECONDS, Unit::Seconds, "Time to compute one endpoint list");
    describe_counter!(ENDPOINT_CHANGES_TOTAL, "Zone endpoint list or algorithm changes detected");
    describe_counter!(PUSHES_TOTAL, "Endpoint lists pushed to agents");
    describe_counter!(PUSH_FAILURES_TOTAL, "Endpoint list pushes that failed");
}

/// Install the Prometheus recorder globally and return a handle for rendering
pub fn install_prometheus_recorder() -> LbResult<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(ASSIGNMENT_DURATION_SECONDS.to_string()), DURATION_BUCKETS)
        .map_err(|e| LbError::config(format!("Failed to set histogram buckets: {}", e)))?
        .install_recorder()
        .map_err(|e| LbError::config(format!("Failed to install metrics recorder: {}", e)))?;

    describe_metrics();
    Ok(handle)
}
