//! Lifecycle cancellation token.
//!
//! A token is a zero-capacity channel whose only sender is dropped on
//! [`CancelToken::cancel`]. Every clone shares the same receiver, so a
//! `recv` arm in a `crossbeam_channel::select!` fires for all waiters at
//! once when the token is cancelled.

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex, PoisonError};

/// Cloneable cancellation signal handed to an [`Engine`](crate::engine::Engine)
/// at construction.
#[derive(Debug, Clone)]
pub struct CancelToken {
    trigger: Arc<Mutex<Option<Sender<()>>>>,
    signal: Receiver<()>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(0);
        Self {
            trigger: Arc::new(Mutex::new(Some(tx))),
            signal: rx,
        }
    }

    /// Cancel the token. Idempotent.
    pub fn cancel(&self) {
        self.trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.signal.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Receiver that becomes ready (disconnected) once the token is cancelled.
    pub(crate) fn signal(&self) -> &Receiver<()> {
        &self.signal
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn clones_observe_cancellation() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());

        token.cancel();
        assert!(clone.is_cancelled());

        // Cancelling twice is harmless.
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn signal_wakes_blocked_receiver() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = std::thread::spawn(move || waiter.signal().recv().is_err());

        std::thread::sleep(Duration::from_millis(20));
        token.cancel();
        assert!(handle.join().unwrap());
    }
}
