use crate::errors::LoadTestError;
use crate::scenario::IterationOutcome;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;

const CHECK_LABEL: &str = "check";
const RESULT_LABEL: &str = "result";

pub struct PrometheusMetrics {
    prometheus_handle: Arc<PrometheusHandle>,
}

impl PrometheusMetrics {
    pub fn new() -> Result<Self, LoadTestError> {
        Ok(Self::new_with_handle(Arc::new(Self::init_handle()?)))
    }

    pub(crate) fn new_with_handle(prometheus_handle: Arc<PrometheusHandle>) -> Self {
        describe_counter!("checks", "Check results by check name and outcome");
        describe_counter!("iterations", "Completed iterations");
        describe_counter!("http_reqs", "HTTP requests issued");
        describe_counter!("http_req_failed", "HTTP requests that got no response");
        describe_histogram!("http_req_duration", "Time to receive the response, in seconds");
        describe_histogram!(
            "iteration_duration",
            "Time to complete a full iteration including the pause, in seconds"
        );
        describe_gauge!("loadtest_vus", "Virtual users of the current run");
        Self { prometheus_handle }
    }

    // Creates and installs the prometheus exporter as global recorder
    // Only one recorder can be registered for the lifetime of the application
    fn init_handle() -> Result<PrometheusHandle, LoadTestError> {
        Ok(PrometheusBuilder::new().install_recorder()?)
    }

    pub fn gather_metrics(&self) -> String {
        self.prometheus_handle.render()
    }
}

pub fn set_vus(vus: usize) {
    gauge!("loadtest_vus").set(vus as f64);
}

pub fn record_iteration(outcome: &IterationOutcome) {
    counter!("iterations").increment(1);
    counter!("http_reqs").increment(1);
    if outcome.status.is_none() {
        counter!("http_req_failed").increment(1);
    }
    histogram!("http_req_duration").record(outcome.request_duration.as_secs_f64());
    histogram!("iteration_duration").record(outcome.duration.as_secs_f64());

    for check in &outcome.checks {
        let result = if check.passed { "pass" } else { "fail" };
        counter!("checks", CHECK_LABEL => check.name, RESULT_LABEL => result).increment(1);
    }
}
