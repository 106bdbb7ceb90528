//! Turns session output lines into conversation records.

use super::mailbox::UpdateMailbox;
use super::state::{ConversationRecord, Role, CONVERSATION_HISTORY};
use log::{debug, error, info};
use std::sync::{Arc, Mutex, MutexGuard};

const USER_PREFIX: &str = "User:";
const ASSISTANT_PREFIX: &str = "Assistant:";

/// Receives the text a session or audio component would otherwise print.
///
/// Handed to collaborators when they are constructed, in place of any process-wide
/// stdout interception.
pub trait LineSink: Send + Sync {
    fn emit(&self, text: &str);
}

/// Classify one line of session output. Returns `None` for diagnostics.
pub fn classify(line: &str) -> Option<ConversationRecord> {
    if let Some(rest) = line.strip_prefix(USER_PREFIX) {
        Some(ConversationRecord::new(Role::User, rest.trim()))
    } else {
        line.strip_prefix(ASSISTANT_PREFIX)
            .map(|rest| ConversationRecord::new(Role::Assistant, rest.trim()))
    }
}

/// Worker-side view of the transcript.
///
/// Holds the last history it published so each append is sent as a complete replacement
/// sequence. Publishing happens under the history lock, which keeps mailbox order identical
/// to append order even if more than one producer ever shares a capture.
#[derive(Debug, Clone)]
pub struct TranscriptCapture {
    mailbox: UpdateMailbox,
    history: Arc<Mutex<Vec<ConversationRecord>>>,
}

impl TranscriptCapture {
    pub fn new(mailbox: UpdateMailbox) -> Self {
        Self {
            mailbox,
            history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn observe(&self, line: &str) {
        let Some(record) = classify(line) else {
            return;
        };
        debug!("TranscriptCapture: {:?} line captured", record.role);

        let mut history = self.lock();
        let mut updated = history.clone();
        updated.push(record);
        if self.publish(&updated) {
            *history = updated;
        }
    }

    /// Empty the transcript. Queued behind any appends already in the mailbox, so a
    /// stale append can never resurrect cleared records.
    pub fn clear(&self) {
        let mut history = self.lock();
        if self.publish(&[]) {
            history.clear();
        }
    }

    pub fn snapshot(&self) -> Vec<ConversationRecord> {
        self.lock().clone()
    }

    fn publish(&self, history: &[ConversationRecord]) -> bool {
        match serde_json::to_value(history) {
            Ok(value) => {
                self.mailbox.put(CONVERSATION_HISTORY, value);
                true
            }
            Err(e) => {
                error!("Failed to encode conversation history: {}", e);
                false
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ConversationRecord>> {
        self.history.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl LineSink for TranscriptCapture {
    fn emit(&self, text: &str) {
        for line in text.lines() {
            self.observe(line);
            info!(target: "talkback::session", "{}", line);
        }
    }
}
