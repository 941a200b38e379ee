//! Job execution span helpers.

use tracing::Span;

use crate::job::JobId;

/// How a worker finished one envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// `execute` returned `Ok`.
    Success,
    /// `execute` returned an error.
    Failure,
    /// The job was already completed; `execute` was not called.
    Skipped,
    /// `execute` panicked.
    Panicked,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
            Outcome::Skipped => "skipped",
            Outcome::Panicked => "panicked",
        }
    }

    /// The value written to the completion handle.
    pub fn is_success(self) -> bool {
        matches!(self, Outcome::Success | Outcome::Skipped)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Start a span covering one job on one worker.
///
/// `job.outcome` is declared empty and filled in by [`record_outcome`].
pub fn start_job_span(worker_id: &str, job_id: JobId) -> Span {
    tracing::info_span!(
        "job.execute",
        "worker.id" = worker_id,
        "job.id" = %job_id,
        "job.outcome" = tracing::field::Empty,
    )
}

pub fn record_outcome(span: &Span, outcome: Outcome) {
    span.record("job.outcome", outcome.as_str());
}
