//! Worker → consumer update queue.

use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// A keyed update waiting to be applied on the consumer thread.
#[derive(Debug, Clone, PartialEq)]
pub struct MailboxEntry {
    pub key: String,
    pub value: Value,
}

/// Unbounded FIFO shared between the session worker and the consumer.
///
/// Cloning yields another handle to the same queue. `put` may be called from any thread;
/// `drain` belongs to the consumer.
#[derive(Debug, Clone, Default)]
pub struct UpdateMailbox {
    queue: Arc<Mutex<VecDeque<MailboxEntry>>>,
}

impl UpdateMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue an update. Never fails.
    pub fn put(&self, key: impl Into<String>, value: Value) {
        self.lock().push_back(MailboxEntry {
            key: key.into(),
            value,
        });
    }

    /// Remove and return everything queued so far, oldest first.
    pub fn drain(&self) -> Vec<MailboxEntry> {
        std::mem::take(&mut *self.lock()).into()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A producer that panicked mid-push cannot leave a half-written entry behind,
    // so a poisoned queue is still consistent.
    fn lock(&self) -> MutexGuard<'_, VecDeque<MailboxEntry>> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }
}
