//! The engine: worker-set lifecycle, submission intake, and the dispatch loop
//! that hands each job to exactly one idle worker.

use crossbeam_channel::{Receiver, SendError, Sender, select};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::registry::{self, Envelope, Inbox, StopSignal};
use super::worker::{Worker, WorkerHandle};
use crate::cancel::CancelToken;
use crate::completion::{self, CompletionHandle};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::job::{Job, JobId};
use crate::telemetry::metrics;

/// Lifecycle of an engine's worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    NotStarted,
    Running,
    /// Stopped; `start` may be called again.
    Stopped,
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Lifecycle::NotStarted => "not_started",
            Lifecycle::Running => "running",
            Lifecycle::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

enum PoolState {
    NotStarted,
    Running(Pool),
    /// The token fired under a running pool. Its threads are exiting on
    /// their own and are joined by `shutdown`.
    Cancelled(Pool),
    Stopped,
}

/// Everything created by one `start`.
struct Pool {
    submissions: Sender<Envelope>,
    stop: StopSignal,
    workers: Vec<WorkerHandle>,
    dispatcher: JoinHandle<()>,
}

impl Pool {
    fn signal_stop(&mut self) {
        for worker in &mut self.workers {
            worker.stop();
        }
        self.stop.trigger();
    }

    fn join(self) {
        if self.dispatcher.join().is_err() {
            error!("dispatcher thread panicked");
        }
        for worker in self.workers {
            worker.join();
        }
    }
}

/// A fixed-size pool of worker threads fed by a single dispatcher.
///
/// `submit` hands the job to the dispatcher through a zero-capacity channel,
/// so it returns only once the dispatcher has taken the job. The dispatcher
/// in turn waits for an idle worker before taking the next one, which gives
/// natural backpressure when every worker is busy.
///
/// ```no_run
/// use workpool::{CancelToken, Engine, job};
///
/// let engine = Engine::new(CancelToken::new());
/// engine.start(2)?;
/// let handle = engine.submit(job::from_fn(|| Ok(())))?;
/// assert!(handle.wait());
/// engine.shutdown();
/// # Ok::<(), workpool::Error>(())
/// ```
pub struct Engine {
    id: String,
    cancel: CancelToken,
    config: EngineConfig,
    dispatch: tracing::Dispatch,
    state: Mutex<PoolState>,
}

impl Engine {
    /// Create an engine with default settings. Nothing runs until `start`.
    ///
    /// Cancelling `cancel` stops the dispatcher and every idle worker, and
    /// makes later `start`/`submit` calls fail with [`Error::Cancelled`].
    pub fn new(cancel: CancelToken) -> Self {
        Self::with_config(cancel, EngineConfig::default())
    }

    pub fn with_config(cancel: CancelToken, config: EngineConfig) -> Self {
        Self {
            id: format!("dispatcher-{}", Uuid::new_v4()),
            cancel,
            config,
            dispatch: tracing::dispatcher::get_default(|d| d.clone()),
            state: Mutex::new(PoolState::NotStarted),
        }
    }

    /// Route this engine's log events to `dispatch` instead of the default
    /// captured at construction.
    pub fn with_logger(mut self, dispatch: tracing::Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> Lifecycle {
        match *self.lock_state() {
            PoolState::NotStarted => Lifecycle::NotStarted,
            PoolState::Running(_) => Lifecycle::Running,
            PoolState::Cancelled(_) | PoolState::Stopped => Lifecycle::Stopped,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == Lifecycle::Running
    }

    /// Ids of the workers in the running pool; empty when not running.
    pub fn worker_ids(&self) -> Vec<String> {
        match &*self.lock_state() {
            PoolState::Running(pool) => pool.workers.iter().map(|w| w.id.clone()).collect(),
            _ => Vec::new(),
        }
    }

    pub fn worker_count(&self) -> usize {
        match &*self.lock_state() {
            PoolState::Running(pool) => pool.workers.len(),
            _ => 0,
        }
    }

    /// Spawn `worker_count` workers and the dispatch loop.
    ///
    /// Does nothing if the pool is already running. Fails with
    /// [`Error::Cancelled`] once the token has fired, even over a pool that
    /// was running when it fired.
    pub fn start(&self, worker_count: usize) -> Result<()> {
        self.in_logger_scope(|| {
            let mut state = self.lock_state();
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if matches!(*state, PoolState::Running(_)) {
                debug!(engine = %self.id, "already running");
                return Ok(());
            }
            if worker_count == 0 {
                return Err(Error::NoWorkers);
            }

            let pool = self.spawn_pool(worker_count)?;
            *state = PoolState::Running(pool);
            info!(engine = %self.id, workers = worker_count, "engine started");
            Ok(())
        })
    }

    /// Start with the worker count from this engine's [`EngineConfig`].
    pub fn start_configured(&self) -> Result<()> {
        self.start(self.config.workers)
    }

    /// Submit a job, blocking until the dispatcher accepts it.
    ///
    /// # Errors
    ///
    /// [`Error::NotRunning`] if the pool is not running, or stops while the
    /// caller is waiting; [`Error::Cancelled`] if the engine's token fired.
    pub fn submit(&self, job: impl Job) -> Result<CompletionHandle> {
        self.in_logger_scope(|| {
            let submissions = match &*self.lock_state() {
                PoolState::Running(pool) => pool.submissions.clone(),
                _ => return Err(self.closed_error()),
            };
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let id = JobId::new();
            let (completer, handle) = completion::channel(id);
            let envelope = Envelope {
                id,
                job: Box::new(job),
                completer,
            };

            // The state lock is released before this blocking send.
            submissions
                .send(envelope)
                .map_err(|_| self.closed_error())?;
            debug!(engine = %self.id, job = %id, "submitted");
            Ok(handle)
        })
    }

    /// Signal every worker and the dispatcher to stop.
    ///
    /// Returns without waiting for in-flight jobs; they run to completion.
    /// Jobs accepted by the dispatcher but not yet handed to a worker resolve
    /// to `false`. No-op unless running.
    pub fn stop(&self) {
        drop(self.stop_pool());
    }

    /// [`stop`](Self::stop), then wait for the dispatcher and every worker
    /// thread of the stopped pool to exit.
    pub fn shutdown(&self) {
        if let Some(pool) = self.stop_pool() {
            self.in_logger_scope(|| pool.join());
        }
    }

    fn stop_pool(&self) -> Option<Pool> {
        self.in_logger_scope(|| {
            let mut state = self.lock_state();
            let mut pool = match std::mem::replace(&mut *state, PoolState::Stopped) {
                PoolState::Running(pool) | PoolState::Cancelled(pool) => pool,
                other => {
                    *state = other;
                    return None;
                }
            };
            drop(state);

            pool.signal_stop();
            info!(engine = %self.id, "engine stopped");
            Some(pool)
        })
    }

    fn spawn_pool(&self, worker_count: usize) -> Result<Pool> {
        let mut stop = StopSignal::new();
        let (ready_tx, ready_rx) = registry::ready_registry();
        let (submissions_tx, submissions_rx) = registry::submissions();

        let mut workers = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            match Worker::spawn(
                worker_thread_name(&self.config.thread_prefix, index),
                ready_tx.clone(),
                self.cancel.clone(),
                self.dispatch.clone(),
            ) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    warn!(engine = %self.id, error = %e, "failed to spawn worker");
                    for worker in &mut workers {
                        worker.stop();
                    }
                    return Err(e);
                }
            }
        }

        let dispatcher = Dispatcher {
            id: self.id.clone(),
            submissions: submissions_rx,
            ready: ready_rx,
            stop: stop.listener(),
            cancel: self.cancel.clone(),
        };
        let dispatch = self.dispatch.clone();
        let spawned = thread::Builder::new()
            .name(dispatcher_thread_name(&self.config.thread_prefix))
            .spawn(move || tracing::dispatcher::with_default(&dispatch, || dispatcher.run()));

        match spawned {
            Ok(dispatcher) => Ok(Pool {
                submissions: submissions_tx,
                stop,
                workers,
                dispatcher,
            }),
            Err(e) => {
                warn!(engine = %self.id, error = %e, "failed to spawn dispatcher");
                for worker in &mut workers {
                    worker.stop();
                }
                stop.trigger();
                Err(e.into())
            }
        }
    }

    fn closed_error(&self) -> Error {
        if self.cancel.is_cancelled() {
            Error::Cancelled
        } else {
            Error::NotRunning
        }
    }

    /// Lock the lifecycle state. A running pool whose token has fired is
    /// moved to `Cancelled` here, so every reader sees it as stopped.
    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if self.cancel.is_cancelled() && matches!(*state, PoolState::Running(_)) {
            if let PoolState::Running(mut pool) =
                std::mem::replace(&mut *state, PoolState::Stopped)
            {
                pool.signal_stop();
                debug!(engine = %self.id, "token cancelled, pool stopped");
                *state = PoolState::Cancelled(pool);
            }
        }
        state
    }

    fn in_logger_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }
}

fn worker_thread_name(prefix: &str, index: usize) -> String {
    format!("{prefix}-worker-{index}")
}

fn dispatcher_thread_name(prefix: &str) -> String {
    format!("{prefix}-dispatcher")
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}

/// The single dispatch loop of a running pool.
struct Dispatcher {
    id: String,
    submissions: Receiver<Envelope>,
    ready: Receiver<Inbox>,
    stop: Receiver<()>,
    cancel: CancelToken,
}

impl Dispatcher {
    fn run(self) {
        loop {
            select! {
                recv(self.submissions) -> msg => match msg {
                    Ok(envelope) => {
                        debug!(engine = %self.id, job = %envelope.id, "dispatching");
                        metrics::jobs_submitted().add(1, &[]);
                        if !self.hand_off(envelope) {
                            return;
                        }
                    }
                    Err(_) => return,
                },
                recv(self.stop) -> _ => {
                    debug!(engine = %self.id, "stopping...");
                    return;
                }
                recv(self.cancel.signal()) -> _ => {
                    debug!(engine = %self.id, "cancelled, stopping...");
                    return;
                }
            }
        }
    }

    /// Wait for an idle worker and give it the envelope. Returns `false` if
    /// the dispatcher must exit instead; the envelope is then dropped, which
    /// resolves its handle to `false`.
    fn hand_off(&self, mut envelope: Envelope) -> bool {
        loop {
            let inbox = select! {
                recv(self.ready) -> inbox => match inbox {
                    Ok(inbox) => inbox,
                    Err(_) => {
                        warn!(engine = %self.id, job = %envelope.id, "no workers left, dropping job");
                        return false;
                    }
                },
                recv(self.stop) -> _ => {
                    debug!(engine = %self.id, job = %envelope.id, "stopping with undelivered job");
                    return false;
                }
                recv(self.cancel.signal()) -> _ => {
                    debug!(engine = %self.id, job = %envelope.id, "cancelled with undelivered job");
                    return false;
                }
            };

            match inbox.send(envelope) {
                Ok(()) => return true,
                // The worker exited between offering itself and receiving.
                Err(SendError(returned)) => envelope = returned,
            }
        }
    }
}
