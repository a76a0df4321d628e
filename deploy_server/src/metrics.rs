//! Prometheus metrics for deployment observability.

use metrics::{counter, histogram};

/// Initialize metrics exporter (Prometheus).
pub fn init_metrics() {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    if let Err(e) = builder.install() {
        tracing::warn!("Failed to install Prometheus exporter: {}", e);
    }
}

/// Record an accepted intake request.
pub fn job_received() {
    counter!("deploy_jobs_received_total").increment(1);
}

/// Record a project status transition.
pub fn deployment_status_changed(status: &str) {
    counter!("deploy_jobs_total", "status" => status.to_string()).increment(1);
}

/// Record a fatal failure by kind.
pub fn deployment_failed(kind: &str) {
    counter!("deploy_failures_total", "kind" => kind.to_string()).increment(1);
}

/// Record total time from intake to terminal status.
pub fn build_duration(duration_ms: u64) {
    histogram!("deploy_build_duration_ms").record(duration_ms as f64);
}

/// Record step duration.
pub fn step_duration(step_name: &str, duration_ms: u64) {
    histogram!("deploy_step_duration_ms", "step" => step_name.to_string())
        .record(duration_ms as f64);
}

/// Record whether proxy wiring went live.
pub fn publish_result(outcome: &str) {
    counter!("deploy_publish_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record whether a thumbnail is a real capture or the placeholder.
pub fn screenshot_result(source: &str) {
    counter!("deploy_screenshots_total", "source" => source.to_string()).increment(1);
}
