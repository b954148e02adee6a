// src/core/completion.rs

//! # Completion Latch
//!
//! Every compiled task node owns one [`Completion`]. Expansion may turn a single node into
//! thousands of concrete instances, and a dependent must wait for all of them, so the latch
//! counts instances rather than firing on the first one:
//!
//! - the producer calls [`Completion::admit`] for every instance it enqueues and receives a
//!   [`Ticket`]; dropping the ticket marks that instance finished, whatever its outcome.
//! - the producer calls [`Completion::seal`] once the stream has moved past the node.
//! - the latch is done once it is sealed and no tickets are outstanding. It never re-arms.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

#[derive(Debug, Default, Clone, Copy)]
struct LatchState {
    pending: usize,
    sealed: bool,
}

impl LatchState {
    fn is_done(&self) -> bool {
        self.sealed && self.pending == 0
    }
}

/// A one-shot, multi-waiter completion signal shared by all instances of a task node.
#[derive(Debug, Default)]
pub struct Completion {
    state: Mutex<LatchState>,
    notify: Notify,
}

impl Completion {
    /// Creates an unsealed latch with no registered instances.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, LatchState> {
        // The state is two plain fields; a panic mid-update cannot leave it inconsistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, apply: impl FnOnce(&mut LatchState)) {
        let done = {
            let mut state = self.lock();
            apply(&mut state);
            state.is_done()
        };
        if done {
            self.notify.notify_waiters();
        }
    }

    /// Registers one more instance of this node. The instance counts as finished
    /// when the returned ticket is dropped.
    pub fn admit(self: &Arc<Self>) -> Ticket {
        self.update(|state| state.pending += 1);
        Ticket {
            completion: Arc::clone(self),
        }
    }

    /// Declares that no further instances will be admitted. Idempotent.
    pub fn seal(&self) {
        self.update(|state| state.sealed = true);
    }

    /// Returns `true` once the node is sealed and every admitted instance has finished.
    pub fn is_done(&self) -> bool {
        self.lock().is_done()
    }

    /// Waits until [`Completion::is_done`] holds. Returns immediately if it already does.
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register interest before checking, so a concurrent completion is not missed.
            notified.as_mut().enable();
            if self.is_done() {
                return;
            }
            notified.await;
        }
    }
}

/// Proof that one instance of a node is in flight. Dropping it finishes the instance.
#[derive(Debug)]
pub struct Ticket {
    completion: Arc<Completion>,
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.completion
            .update(|state| state.pending = state.pending.saturating_sub(1));
    }
}
