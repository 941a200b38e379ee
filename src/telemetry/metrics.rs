//! Metric instrument factories for workpool.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without a registered provider the instruments are no-ops.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("workpool")
}

/// Counter: submissions accepted by a dispatcher.
pub fn jobs_submitted() -> Counter<u64> {
    meter()
        .u64_counter("workpool.jobs.submitted")
        .with_description("Number of jobs accepted by the dispatcher")
        .build()
}

/// Counter: envelopes finished by a worker.
/// Labels: `outcome` ("success" | "failure" | "skipped" | "panicked").
pub fn jobs_finished() -> Counter<u64> {
    meter()
        .u64_counter("workpool.jobs.finished")
        .with_description("Number of jobs finished by workers")
        .build()
}

/// Histogram: time a worker spent on one envelope.
/// Labels: `outcome`.
pub fn job_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("workpool.job.duration_ms")
        .with_description("Job execution duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: worker threads spawned.
pub fn workers_started() -> Counter<u64> {
    meter()
        .u64_counter("workpool.workers.started")
        .with_description("Number of worker threads spawned")
        .build()
}
