// SPDX-License-Identifier: GPL-3.0-only

//! Single-slot, latest-wins hand-off between two threads
//!
//! The slot is a lock-free queue of capacity one. Publishing replaces any
//! value still waiting and rings a doorbell; the consumer waits on the
//! doorbell and takes whatever is newest.

use crossbeam_channel::{Receiver, Sender, bounded};
use crossbeam_queue::ArrayQueue;
use std::time::Duration;

pub struct FrameMailbox<T> {
    slot: ArrayQueue<T>,
    doorbell_tx: Sender<()>,
    doorbell_rx: Receiver<()>,
}

impl<T> FrameMailbox<T> {
    pub fn new() -> Self {
        let (doorbell_tx, doorbell_rx) = bounded(1);
        Self {
            slot: ArrayQueue::new(1),
            doorbell_tx,
            doorbell_rx,
        }
    }

    /// Store `value`, returning the unconsumed value it displaced
    pub fn publish(&self, value: T) -> Option<T> {
        let displaced = self.slot.force_push(value);
        self.ring();
        displaced
    }

    pub fn take(&self) -> Option<T> {
        self.slot.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.slot.is_empty()
    }

    /// Wake the consumer without publishing
    pub fn ring(&self) {
        // Full means a wake is already pending
        let _ = self.doorbell_tx.try_send(());
    }

    /// Block until rung or `timeout` elapses; true when rung
    pub fn wait(&self, timeout: Duration) -> bool {
        self.doorbell_rx.recv_timeout(timeout).is_ok()
    }
}

impl<T> Default for FrameMailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}
