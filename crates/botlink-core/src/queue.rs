//! The instruction queue.
//!
//! [`InstructionQueue`] holds the ordered list of instructions waiting to be
//! sent. Insertion order is execution order on the robot. The queue is
//! shared between the UI thread that edits it and the worker that sends it,
//! so all state sits behind a mutex and [`snapshot`](InstructionQueue::snapshot)
//! hands the encoder an owned copy.
//!
//! Each successful mutation publishes exactly once through the queue's
//! [`Notifier`], after the lock is released.

use std::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::helpers::lock;
use crate::instruction::Instruction;
use crate::notifier::{Notifier, SubscriptionId};

/// Maximum number of queued instructions. The packet length prefix is one byte.
pub const MAX_INSTRUCTIONS: usize = u8::MAX as usize;

/// Ordered, thread-safe queue of instructions awaiting transmission.
#[derive(Debug, Default)]
pub struct InstructionQueue {
    items: Mutex<Vec<Instruction>>,
    notifier: Notifier<InstructionQueue>,
}

impl InstructionQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an instruction to the end of the queue.
    ///
    /// Fails with [`Error::CapacityExceeded`] once the queue already holds
    /// [`MAX_INSTRUCTIONS`] entries.
    pub fn append(&self, instruction: Instruction) -> Result<()> {
        let len = {
            let mut items = self.lock();
            if items.len() >= MAX_INSTRUCTIONS {
                tracing::debug!(
                    instruction = %instruction,
                    len = items.len(),
                    "Instruction queue full, rejecting append"
                );
                return Err(Error::CapacityExceeded);
            }
            items.push(instruction);
            items.len()
        };

        tracing::trace!(instruction = %instruction, len, "Appended instruction");
        self.notifier.publish(self);
        Ok(())
    }

    /// Remove and return the instruction at `index`.
    ///
    /// Later entries shift left by one. On an invalid index the queue is left
    /// untouched and no notification is published.
    pub fn remove_at(&self, index: usize) -> Result<Instruction> {
        let removed = {
            let mut items = self.lock();
            if index >= items.len() {
                return Err(Error::IndexOutOfRange {
                    index,
                    len: items.len(),
                });
            }
            items.remove(index)
        };

        tracing::trace!(index, instruction = %removed, "Removed instruction");
        self.notifier.publish(self);
        Ok(removed)
    }

    /// Remove every instruction. Always publishes, even if already empty.
    pub fn clear(&self) {
        self.lock().clear();
        tracing::trace!("Cleared instruction queue");
        self.notifier.publish(self);
    }

    /// Owned copy of the queue contents at this instant.
    pub fn snapshot(&self) -> Vec<Instruction> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Register a listener called after every successful mutation.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&InstructionQueue) + Send + Sync + 'static,
    {
        self.notifier.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Instruction>> {
        lock(&self.items)
    }
}
