//! Store-and-forward buffer for user messages with no live consumer.

use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use super::store::MailboxStore;
use crate::core::{LinkResult, PendingMessage};

/// Ordered, durable list of user messages awaiting a foreground consumer.
///
/// Every operation runs under one lock, so a reader never sees half an
/// append and a drain never races an append.
pub struct PendingMailbox {
    store: Box<dyn MailboxStore>,
    lock: Mutex<()>,
}

impl std::fmt::Debug for PendingMailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingMailbox").finish_non_exhaustive()
    }
}

impl PendingMailbox {
    /// Mailbox over `store`.
    pub fn new(store: impl MailboxStore + 'static) -> Self {
        Self::from_boxed(Box::new(store))
    }

    /// Mailbox over an already boxed store.
    pub fn from_boxed(store: Box<dyn MailboxStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a message at the end. Durable once this returns `Ok`.
    pub fn append(&self, message: PendingMessage) -> LinkResult<()> {
        let _guard = self.guard();
        let mut messages = self.store.load()?;
        messages.push(message);
        self.store.save(&messages)?;
        debug!(pending = messages.len(), "message appended to mailbox");
        Ok(())
    }

    /// Take every stored message out of the store and hand each to `emit` in
    /// arrival order. With nothing stored this does nothing, not even a write.
    ///
    /// The store is cleared before the first `emit`; if clearing fails,
    /// nothing is emitted and the messages stay stored for the next drain.
    ///
    /// Returns the emitted messages.
    pub fn drain_all<F>(&self, mut emit: F) -> LinkResult<Vec<PendingMessage>>
    where
        F: FnMut(&PendingMessage),
    {
        let _guard = self.guard();
        let messages = self.store.load()?;
        if messages.is_empty() {
            return Ok(messages);
        }

        self.store.clear()?;
        for message in &messages {
            emit(message);
        }
        debug!(drained = messages.len(), "mailbox drained");
        Ok(messages)
    }

    /// Number of stored messages.
    pub fn len(&self) -> LinkResult<usize> {
        let _guard = self.guard();
        Ok(self.store.load()?.len())
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> LinkResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Drop every stored message without emitting it.
    pub fn clear(&self) -> LinkResult<()> {
        let _guard = self.guard();
        self.store.clear()
    }
}
