//! Coordination plumbing shared by the dispatcher and its workers.
//!
//! Both the ready registry and the worker inboxes are zero-capacity
//! channels: a send completes only when a receiver takes the value at the
//! same moment. An idle worker is therefore discoverable only while it is
//! blocked offering its inbox, and a handoff never sits in a buffer.

use crossbeam_channel::{Receiver, Sender};

use crate::completion::Completer;
use crate::job::{Job, JobId};

/// One submission travelling from `submit` to a worker.
pub(crate) struct Envelope {
    pub(crate) id: JobId,
    pub(crate) job: Box<dyn Job>,
    pub(crate) completer: Completer,
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Envelope").field("id", &self.id).finish()
    }
}

/// A worker's private inbox, as seen by the dispatcher.
pub(crate) type Inbox = Sender<Envelope>;

/// Create the rendezvous through which idle workers offer their inboxes.
pub(crate) fn ready_registry() -> (Sender<Inbox>, Receiver<Inbox>) {
    crossbeam_channel::bounded(0)
}

/// Create a worker inbox.
pub(crate) fn inbox() -> (Sender<Envelope>, Receiver<Envelope>) {
    crossbeam_channel::bounded(0)
}

/// Create the submission rendezvous between `submit` and the dispatcher.
pub(crate) fn submissions() -> (Sender<Envelope>, Receiver<Envelope>) {
    crossbeam_channel::bounded(0)
}

/// Close-only stop signal. Nothing is ever sent; dropping the sender
/// disconnects every listener at once.
#[derive(Debug)]
pub(crate) struct StopSignal {
    trigger: Option<Sender<()>>,
    listener: Receiver<()>,
}

impl StopSignal {
    pub(crate) fn new() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(0);
        Self {
            trigger: Some(tx),
            listener: rx,
        }
    }

    pub(crate) fn listener(&self) -> Receiver<()> {
        self.listener.clone()
    }

    pub(crate) fn trigger(&mut self) {
        self.trigger.take();
    }
}
