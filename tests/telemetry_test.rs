//! Integration tests for telemetry initialization and span helpers.

use workpool::JobId;
use workpool::telemetry::job::{Outcome, record_outcome, start_job_span};

#[test]
fn telemetry_initializes_without_endpoint() {
    // A global subscriber can only be set once per process; a second
    // init in the same process returns Err, which is acceptable here.
    let config = workpool::telemetry::TelemetryConfig {
        endpoint: None,
        service_name: "workpool-test".to_string(),
        log_level: "info".to_string(),
    };
    if let Ok(guard) = workpool::telemetry::init_telemetry(config) {
        assert!(!guard.is_exporting());
        guard.force_flush();
    }
}

#[test]
fn job_span_creates_and_records_outcome() {
    let span = start_job_span("worker-test", JobId::new());
    record_outcome(&span, Outcome::Failure);
}

#[test]
fn outcome_maps_to_completion_value() {
    assert!(Outcome::Success.is_success());
    assert!(Outcome::Skipped.is_success());
    assert!(!Outcome::Failure.is_success());
    assert!(!Outcome::Panicked.is_success());
    assert_eq!(Outcome::Panicked.to_string(), "panicked");
}

#[test]
fn metric_instruments_work_without_provider() {
    use opentelemetry::KeyValue;
    use workpool::telemetry::metrics;

    metrics::jobs_submitted().add(1, &[]);
    metrics::jobs_finished().add(1, &[KeyValue::new("outcome", "success")]);
    metrics::job_duration_ms().record(1.5, &[KeyValue::new("outcome", "success")]);
    metrics::workers_started().add(1, &[]);
}
