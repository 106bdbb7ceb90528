//! Session lifecycle: the worker thread that owns a streaming session and the
//! controller the consumer thread uses to start and stop it.
//!
//! ```text
//!  consumer thread                     worker thread (private current-thread loop)
//! ┌────────────────────────┐ spawn   ┌──────────────────────────────────────────────┐
//! │ LifecycleController    │────────▶│ CREATED → LOOP_READY → SESSION_INITIALIZING  │
//! │   request_start        │         │        → STREAMING → STOPPING → CLOSED       │
//! │   request_stop ────────┼─stop()─▶│ (FAILED from anywhere before CLOSED)         │
//! │   is_alive / is_active │ on loop │ cleanup: stop audio → close loop → inactive  │
//! └────────────────────────┘         └──────────────────────────────────────────────┘
//! ```

mod backend;
mod config;
mod controller;
mod devices;
mod scope;
mod scripted;
#[cfg(test)]
pub(crate) mod testing;
mod worker;

pub use backend::{AudioStreamer, SessionBackend, StreamSession};
pub use config::{LifecycleOptions, SessionConfig};
pub use controller::{LifecycleController, StartOutcome, StopOutcome};
pub use devices::{parse_device_index, DeviceResolutionError, DeviceSelection};
pub use scope::{GenerationGate, ScopedSink, WorkerScope};
pub use scripted::{parse_script, ScriptStep, ScriptedBackend};
pub use worker::{SessionWorker, WorkerHandle, WorkerStatus};
