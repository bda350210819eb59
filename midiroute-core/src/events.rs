// Copyright 2025 Midiroute Contributors
// SPDX-License-Identifier: MIT

//! Small observer registry used for component change notifications
//!
//! Subscribers receive events over unbounded crossbeam channels, so a
//! publisher never blocks on a slow observer and handlers cannot
//! re-enter the publisher (delivery is decoupled from emission).
//! Disconnected subscribers are pruned on the next emit.

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;

/// Multi-subscriber event broadcaster.
pub struct EventHub<T> {
    subscribers: Mutex<Vec<Sender<T>>>,
}

impl<T: Clone> EventHub<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Register a new observer. Dropping the receiver unsubscribes it.
    pub fn subscribe(&self) -> Receiver<T> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber, pruning dead ones.
    pub fn emit(&self, event: T) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl<T: Clone> Default for EventHub<T> {
    fn default() -> Self {
        Self::new()
    }
}
