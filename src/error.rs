use thiserror::Error;

use crate::bridge::ApplyError;

/// Failures surfaced to the consumer thread.
///
/// Worker-side failures never cross the thread boundary as panics or `Err` returns from the
/// worker itself; they are recorded on the worker handle and reported through the controller.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("session failed to initialize: {0}")]
    Initialization(String),

    #[error("streaming failed: {0}")]
    Streaming(String),

    #[error("failed to deliver stop request: {0}")]
    StopSignal(String),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error("failed to spawn session worker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("session worker exited during startup{}", .0.as_deref().map(|e| format!(": {}", e)).unwrap_or_default())]
    StartFailed(Option<String>),

    #[error("invalid session config: {0}")]
    Config(String),
}

pub type BridgeResult<T> = Result<T, BridgeError>;
