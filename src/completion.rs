//! Single-resolution completion signal.
//!
//! [`channel`] returns a [`Completer`] for the worker and a
//! [`CompletionHandle`] for the submitter. The completer is consumed by
//! [`Completer::resolve`], so an envelope can be resolved at most once. The
//! underlying `oneshot` has a one-value buffer, so resolving never waits for
//! the submitter to read.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

use crate::job::JobId;

/// Create a linked completer/handle pair for one submission.
pub(crate) fn channel(job_id: JobId) -> (Completer, CompletionHandle) {
    let (tx, rx) = oneshot::channel();
    (
        Completer { tx },
        CompletionHandle {
            job_id,
            rx,
            outcome: None,
        },
    )
}

/// Producing half. Held by the envelope until a worker resolves it.
#[derive(Debug)]
pub(crate) struct Completer {
    tx: oneshot::Sender<bool>,
}

impl Completer {
    /// Resolve with the job's outcome. Never blocks; if the handle was
    /// dropped the value is discarded.
    pub(crate) fn resolve(self, success: bool) {
        let _ = self.tx.send(success);
    }
}

/// Receiving half returned by [`Engine::submit`](crate::engine::Engine::submit).
///
/// Resolves to `true` if the job succeeded (or was already completed) and
/// `false` otherwise. A job that never reached a worker, because the engine
/// stopped first, also resolves to `false`. Once resolved, every read returns
/// the same value.
///
/// The handle can be dropped at any time without affecting the engine.
#[derive(Debug)]
pub struct CompletionHandle {
    job_id: JobId,
    rx: oneshot::Receiver<bool>,
    outcome: Option<bool>,
}

impl CompletionHandle {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Block the current thread until the job resolves.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context; await
    /// the handle there instead.
    pub fn wait(self) -> bool {
        if let Some(outcome) = self.outcome {
            return outcome;
        }
        self.rx.blocking_recv().unwrap_or(false)
    }

    /// Non-blocking read. `None` while the job is still pending.
    pub fn try_outcome(&mut self) -> Option<bool> {
        if self.outcome.is_none() {
            match self.rx.try_recv() {
                Ok(success) => self.outcome = Some(success),
                Err(oneshot::error::TryRecvError::Closed) => self.outcome = Some(false),
                Err(oneshot::error::TryRecvError::Empty) => {}
            }
        }
        self.outcome
    }

    pub fn is_resolved(&mut self) -> bool {
        self.try_outcome().is_some()
    }
}

impl Future for CompletionHandle {
    type Output = bool;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<bool> {
        let this = self.get_mut();
        if let Some(outcome) = this.outcome {
            return Poll::Ready(outcome);
        }
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(result) => {
                let outcome = result.unwrap_or(false);
                this.outcome = Some(outcome);
                Poll::Ready(outcome)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_once_and_reads_are_stable() {
        let (completer, mut handle) = channel(JobId::new());
        assert_eq!(handle.try_outcome(), None);

        completer.resolve(true);
        assert_eq!(handle.try_outcome(), Some(true));
        assert_eq!(handle.try_outcome(), Some(true));
        assert!(handle.wait());
    }

    #[test]
    fn dropped_completer_resolves_false() {
        let (completer, mut handle) = channel(JobId::new());
        drop(completer);
        assert_eq!(handle.try_outcome(), Some(false));
    }

    #[test]
    fn resolve_does_not_wait_for_a_reader() {
        let (completer, handle) = channel(JobId::new());
        drop(handle);
        // Must return immediately even though nobody will ever read.
        completer.resolve(false);
    }

    #[test]
    fn wait_blocks_until_resolved() {
        let (completer, handle) = channel(JobId::new());
        let resolver = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            completer.resolve(false);
        });
        assert!(!handle.wait());
        resolver.join().unwrap();
    }

    #[tokio::test]
    async fn handle_is_awaitable() {
        let (completer, handle) = channel(JobId::new());
        let id = handle.job_id();
        completer.resolve(true);
        assert!(handle.await);
        assert_ne!(id, JobId::new());
    }
}
