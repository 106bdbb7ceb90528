//! Consumer-side session state.
//!
//! Only the consumer thread holds a `SessionState` and only `StateBridge::apply_pending`
//! writes the keys the worker publishes. The worker never gets a reference to it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Key holding the full transcript, replaced wholesale on every append.
pub const CONVERSATION_HISTORY: &str = "conversation_history";
/// Key holding whether a session worker is currently running.
pub const IS_ACTIVE: &str = "is_active";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Assistant,
}

/// One line of dialogue. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub role: Role,
    pub content: String,
}

impl ConversationRecord {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Error)]
#[error("cannot apply update for '{key}': {reason}")]
pub struct ApplyError {
    pub key: String,
    pub reason: String,
}

/// Anything the bridge can apply keyed updates to.
pub trait StateStore {
    /// Set `key` to `value`, creating the key when it does not exist yet.
    fn apply(&mut self, key: &str, value: Value) -> Result<(), ApplyError>;
}

impl StateStore for Map<String, Value> {
    fn apply(&mut self, key: &str, value: Value) -> Result<(), ApplyError> {
        self.insert(key.to_string(), value);
        Ok(())
    }
}

/// State read by the presentation layer.
///
/// The two well-known keys are decoded into typed fields; anything else is kept verbatim.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    conversation_history: Vec<ConversationRecord>,
    is_active: bool,
    extra: Map<String, Value>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversation_history(&self) -> &[ConversationRecord] {
        &self.conversation_history
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Value of a key outside the typed ones.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}

impl StateStore for SessionState {
    fn apply(&mut self, key: &str, value: Value) -> Result<(), ApplyError> {
        let invalid = |e: serde_json::Error| ApplyError {
            key: key.to_string(),
            reason: e.to_string(),
        };

        match key {
            CONVERSATION_HISTORY => {
                // Decode fully before assigning so a bad payload leaves the old history intact.
                self.conversation_history = serde_json::from_value(value).map_err(invalid)?;
            }
            IS_ACTIVE => {
                self.is_active = serde_json::from_value(value).map_err(invalid)?;
            }
            _ => {
                self.extra.insert(key.to_string(), value);
            }
        }
        Ok(())
    }
}
