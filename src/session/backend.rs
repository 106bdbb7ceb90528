//! Interfaces of the remote streaming service and the audio hardware.
//!
//! Both live outside this crate. The worker only needs the calls below; everything they
//! print goes through the `LineSink` they were constructed with.

use super::config::SessionConfig;
use super::devices::DeviceSelection;
use crate::bridge::LineSink;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// A bidirectional speech session with the remote model.
#[async_trait]
pub trait StreamSession: Send + Sync {
    async fn initialize(&self) -> Result<()>;

    /// Runs until the session ends on its own or `stop` is called.
    async fn start(&self) -> Result<()>;

    /// Ends the session. Called at most once per session by the worker.
    async fn stop(&self) -> Result<()>;
}

/// Microphone capture and speaker playback bound to one session.
#[async_trait]
pub trait AudioStreamer: Send + Sync {
    async fn start_streaming(&self) -> Result<()>;
    async fn stop_streaming(&self) -> Result<()>;
}

/// Builds the collaborators for each new worker.
pub trait SessionBackend: Send + Sync {
    fn create_session(
        &self,
        config: &SessionConfig,
        sink: Arc<dyn LineSink>,
    ) -> Result<Arc<dyn StreamSession>>;

    fn create_audio(
        &self,
        session: Arc<dyn StreamSession>,
        devices: DeviceSelection,
        sink: Arc<dyn LineSink>,
    ) -> Result<Arc<dyn AudioStreamer>>;
}
