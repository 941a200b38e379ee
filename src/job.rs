//! The job contract.
//!
//! A job is caller-owned work. The engine never inspects it beyond the four
//! operations of [`Job`]: it asks whether the job is already done, runs it,
//! and reports the outcome back through the callbacks.

use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// A unit of work the engine can execute on one of its workers.
///
/// `execute` is treated as one opaque blocking call. The engine never
/// interrupts it and never retries it; retry policy belongs to the job.
pub trait Job: Send + 'static {
    /// Do the work.
    ///
    /// Returning [`AlreadyCompleted`] reports that the job found itself done
    /// and did nothing: the submission resolves to success and neither
    /// callback runs.
    fn execute(&mut self) -> anyhow::Result<()>;

    /// Whether the job has already completed. A completed job is not
    /// executed again and its submission resolves to success.
    fn is_completed(&self) -> bool;

    /// Called after `execute` returned `Ok`.
    fn on_success(&mut self);

    /// Called after `execute` returned an error or panicked.
    fn on_failure(&mut self, error: &anyhow::Error);
}

impl<J: Job + ?Sized> Job for Box<J> {
    fn execute(&mut self) -> anyhow::Result<()> {
        (**self).execute()
    }

    fn is_completed(&self) -> bool {
        (**self).is_completed()
    }

    fn on_success(&mut self) {
        (**self).on_success()
    }

    fn on_failure(&mut self, error: &anyhow::Error) {
        (**self).on_failure(error)
    }
}

/// A shared job instance. The whole execute-then-callback sequence runs
/// under the mutex, so submitting the same instance more than once never runs
/// it concurrently, and once it reports completion later submissions skip
/// execution. The outer callbacks are no-ops; the inner job's callbacks are
/// invoked from `execute`. A panic in the inner `execute` skips them.
impl<J: Job> Job for Arc<Mutex<J>> {
    fn execute(&mut self) -> anyhow::Result<()> {
        let mut job = self.lock().unwrap_or_else(PoisonError::into_inner);
        // Another worker may have finished it while we waited for the lock.
        if job.is_completed() {
            return Err(AlreadyCompleted.into());
        }
        let result = job.execute();
        match &result {
            Ok(()) => job.on_success(),
            Err(err) => job.on_failure(err),
        }
        result
    }

    fn is_completed(&self) -> bool {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_completed()
    }

    fn on_success(&mut self) {}

    fn on_failure(&mut self, _error: &anyhow::Error) {}
}

/// Returned by [`Job::execute`] when the job turned out to be completed
/// already, so the engine records the run as skipped.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("job already completed")]
pub struct AlreadyCompleted;

/// Whether `error` is the [`AlreadyCompleted`] marker.
pub fn is_already_completed(error: &anyhow::Error) -> bool {
    error.is::<AlreadyCompleted>()
}

// ---------------------------------------------------------------------------
// Closure jobs
// ---------------------------------------------------------------------------

/// Job built from a closure by [`from_fn`].
pub struct FnJob<F> {
    f: F,
    completed: bool,
}

/// Wrap a closure as a job. It reports itself completed after the first
/// successful run.
pub fn from_fn<F>(f: F) -> FnJob<F>
where
    F: FnMut() -> anyhow::Result<()> + Send + 'static,
{
    FnJob {
        f,
        completed: false,
    }
}

impl<F> Job for FnJob<F>
where
    F: FnMut() -> anyhow::Result<()> + Send + 'static,
{
    fn execute(&mut self) -> anyhow::Result<()> {
        (self.f)()
    }

    fn is_completed(&self) -> bool {
        self.completed
    }

    fn on_success(&mut self) {
        self.completed = true;
    }

    fn on_failure(&mut self, _error: &anyhow::Error) {}
}

// ---------------------------------------------------------------------------
// JobId
// ---------------------------------------------------------------------------

/// Identifier assigned to each submission, used to correlate logs and spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        runs: u32,
        done: bool,
    }

    impl Job for Counter {
        fn execute(&mut self) -> anyhow::Result<()> {
            self.runs += 1;
            Ok(())
        }

        fn is_completed(&self) -> bool {
            self.done
        }

        fn on_success(&mut self) {
            self.done = true;
        }

        fn on_failure(&mut self, _error: &anyhow::Error) {}
    }

    #[test]
    fn fn_job_completes_after_first_success() {
        let mut job = from_fn(|| Ok(()));
        assert!(!job.is_completed());
        job.execute().unwrap();
        job.on_success();
        assert!(job.is_completed());
    }

    #[test]
    fn fn_job_stays_incomplete_on_failure() {
        let mut job = from_fn(|| Err(anyhow::anyhow!("nope")));
        let err = job.execute().unwrap_err();
        job.on_failure(&err);
        assert!(!job.is_completed());
    }

    #[test]
    fn shared_job_skips_execute_once_completed() {
        let shared = Arc::new(Mutex::new(Counter {
            runs: 0,
            done: false,
        }));
        let mut a = Arc::clone(&shared);
        let mut b = Arc::clone(&shared);

        a.execute().unwrap();
        assert!(a.is_completed());
        let err = b.execute().unwrap_err();
        assert!(is_already_completed(&err));

        assert_eq!(shared.lock().unwrap().runs, 1);
        assert!(b.is_completed());
    }

    #[test]
    fn job_id_displays_short_prefix() {
        let id = JobId::new();
        assert_eq!(id.to_string().len(), 8);
        assert!(id.0.to_string().starts_with(&id.to_string()));
    }
}
