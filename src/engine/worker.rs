//! Worker: one thread that alternates between offering itself to the
//! dispatcher and running the job it is handed.

use crossbeam_channel::{Receiver, Sender, select};
use opentelemetry::KeyValue;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::registry::{self, Envelope, Inbox, StopSignal};
use crate::cancel::CancelToken;
use crate::error::Result;
use crate::job::{Job, is_already_completed};
use crate::telemetry::job::{Outcome, record_outcome, start_job_span};
use crate::telemetry::metrics;

/// Engine-side handle to a running worker thread.
#[derive(Debug)]
pub(crate) struct WorkerHandle {
    pub(crate) id: String,
    stop: StopSignal,
    thread: JoinHandle<()>,
}

impl WorkerHandle {
    /// Ask the worker to exit after its current job, if any.
    pub(crate) fn stop(&mut self) {
        self.stop.trigger();
    }

    /// Wait for the worker thread to exit.
    pub(crate) fn join(self) {
        if self.thread.join().is_err() {
            error!(worker = %self.id, "worker thread panicked");
        }
    }
}

/// State owned by the worker thread.
pub(crate) struct Worker {
    id: String,
    ready: Sender<Inbox>,
    inbox_tx: Inbox,
    inbox: Receiver<Envelope>,
    stop: Receiver<()>,
    cancel: CancelToken,
}

impl Worker {
    /// Spawn a worker thread. It starts offering itself to `ready` at once.
    pub(crate) fn spawn(
        thread_name: String,
        ready: Sender<Inbox>,
        cancel: CancelToken,
        dispatch: tracing::Dispatch,
    ) -> Result<WorkerHandle> {
        let id = format!("worker-{}", Uuid::new_v4());
        let stop = StopSignal::new();
        let (inbox_tx, inbox) = registry::inbox();

        let worker = Worker {
            id: id.clone(),
            ready,
            inbox_tx,
            inbox,
            stop: stop.listener(),
            cancel,
        };

        let thread = thread::Builder::new()
            .name(thread_name)
            .spawn(move || tracing::dispatcher::with_default(&dispatch, || worker.run()))?;

        metrics::workers_started().add(1, &[]);

        Ok(WorkerHandle { id, stop, thread })
    }

    fn run(self) {
        debug!(worker = %self.id, "starting");
        loop {
            select! {
                send(self.ready, self.inbox_tx.clone()) -> res => {
                    if res.is_err() {
                        debug!(worker = %self.id, "ready registry closed, stopping");
                        return;
                    }
                    debug!(worker = %self.id, "back in ready registry");
                }
                recv(self.inbox) -> msg => match msg {
                    Ok(envelope) => self.execute(envelope),
                    Err(_) => return,
                },
                recv(self.stop) -> _ => {
                    debug!(worker = %self.id, "stopping");
                    return;
                }
                recv(self.cancel.signal()) -> _ => {
                    debug!(worker = %self.id, "cancelled, stopping");
                    return;
                }
            }
        }
    }

    /// Run one envelope to completion and resolve its handle.
    pub(crate) fn execute(&self, envelope: Envelope) {
        let Envelope {
            id,
            mut job,
            completer,
        } = envelope;

        let span = start_job_span(&self.id, id);
        let _entered = span.enter();
        let started = Instant::now();

        let outcome = if job.is_completed() {
            debug!("already completed, skipping execution");
            Outcome::Skipped
        } else {
            let result = panic::catch_unwind(AssertUnwindSafe(|| job.execute()));
            match result {
                Ok(Ok(())) => {
                    guard_callback("on_success", || job.on_success());
                    info!("completed executing");
                    Outcome::Success
                }
                Ok(Err(err)) if is_already_completed(&err) => {
                    debug!("completed elsewhere, skipping execution");
                    Outcome::Skipped
                }
                Ok(Err(err)) => {
                    error!(error = %err, "error while executing");
                    guard_callback("on_failure", || job.on_failure(&err));
                    Outcome::Failure
                }
                Err(payload) => {
                    let err = anyhow::anyhow!("job panicked: {}", panic_message(&*payload));
                    error!(error = %err, "job panicked");
                    guard_callback("on_failure", || job.on_failure(&err));
                    Outcome::Panicked
                }
            }
        };

        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        record_outcome(&span, outcome);
        let labels = [KeyValue::new("outcome", outcome.as_str())];
        metrics::jobs_finished().add(1, &labels);
        metrics::job_duration_ms().record(duration_ms, &labels);

        completer.resolve(outcome.is_success());
    }
}

/// Run a job callback, logging instead of unwinding if it panics.
fn guard_callback(name: &str, f: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
        error!(
            callback = name,
            panic = panic_message(&*payload),
            "job callback panicked"
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion;
    use crate::job::{self, JobId};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn test_worker() -> Worker {
        let (ready, _ready_rx) = registry::ready_registry();
        let (inbox_tx, inbox) = registry::inbox();
        let (_stop_tx, stop) = crossbeam_channel::bounded(0);
        Worker {
            id: "worker-test".to_string(),
            ready,
            inbox_tx,
            inbox,
            stop,
            cancel: CancelToken::new(),
        }
    }

    fn envelope(job: impl Job) -> (Envelope, crate::completion::CompletionHandle) {
        let id = JobId::new();
        let (completer, handle) = completion::channel(id);
        (
            Envelope {
                id,
                job: Box::new(job),
                completer,
            },
            handle,
        )
    }

    #[test]
    fn execute_resolves_success() {
        let (env, handle) = envelope(job::from_fn(|| Ok(())));
        test_worker().execute(env);
        assert!(handle.wait());
    }

    #[test]
    fn execute_resolves_failure() {
        let (env, handle) = envelope(job::from_fn(|| Err(anyhow::anyhow!("boom"))));
        test_worker().execute(env);
        assert!(!handle.wait());
    }

    #[test]
    fn execute_catches_panics() {
        let (env, handle) = envelope(job::from_fn(|| panic!("kaboom")));
        test_worker().execute(env);
        assert!(!handle.wait());
    }

    #[test]
    fn execute_skips_completed_job() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let mut job = job::from_fn(move || {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });
        job.on_success();

        let (env, handle) = envelope(job);
        test_worker().execute(env);
        assert!(handle.wait());
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn already_completed_error_resolves_as_skip() {
        struct DoneElsewhere(Arc<AtomicBool>);
        impl Job for DoneElsewhere {
            fn execute(&mut self) -> anyhow::Result<()> {
                Err(job::AlreadyCompleted.into())
            }
            fn is_completed(&self) -> bool {
                false
            }
            fn on_success(&mut self) {}
            fn on_failure(&mut self, _error: &anyhow::Error) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let failed = Arc::new(AtomicBool::new(false));
        let (env, handle) = envelope(DoneElsewhere(Arc::clone(&failed)));
        test_worker().execute(env);
        assert!(handle.wait());
        assert!(!failed.load(Ordering::SeqCst));
    }

    #[test]
    fn panic_message_reads_string_payloads() {
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*payload), "owned");
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(&*payload), "static");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(&*payload), "non-string panic payload");
    }
}
