//! Worker → consumer state bridge.
//!
//! The consumer thread owns the `SessionState`. Session workers never touch it; they publish
//! keyed updates into the mailbox and the consumer applies them at the start of each tick.
//!
//! ## Architecture
//!
//! ```text
//!   worker thread                                  consumer thread
//! ┌──────────────────────────┐                  ┌──────────────────────────┐
//! │ session / audio output   │                  │ tick                     │
//! │        │ LineSink        │                  │   StateBridge            │
//! │        ▼                 │   put(key, v)    │     .apply_pending(state)│
//! │ TranscriptCapture ───────┼────────┐         │        ▲                 │
//! │ worker lifecycle ────────┼──────┐ │         │        │ drain()         │
//! └──────────────────────────┘      ▼ ▼         │        │                 │
//!                              ┌──────────────┐ │        │                 │
//!                              │UpdateMailbox │─┼────────┘                 │
//!                              └──────────────┘ └──────────────────────────┘
//! ```

mod applier;
mod mailbox;
mod state;
mod transcript;

pub use applier::{ApplyReport, StateBridge};
pub use mailbox::{MailboxEntry, UpdateMailbox};
pub use state::{
    ApplyError, ConversationRecord, Role, SessionState, StateStore, CONVERSATION_HISTORY,
    IS_ACTIVE,
};
pub use transcript::{classify, LineSink, TranscriptCapture};
