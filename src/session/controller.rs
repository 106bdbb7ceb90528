//! Consumer-facing start/stop API for session workers.

use super::backend::SessionBackend;
use super::config::{LifecycleOptions, SessionConfig};
use super::scope::GenerationGate;
use super::worker::{SessionWorker, WorkerHandle, WorkerStatus};
use crate::bridge::{ApplyReport, StateBridge, StateStore, TranscriptCapture, UpdateMailbox};
use crate::error::{BridgeError, BridgeResult};
use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// A worker was already alive; nothing was spawned.
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// There was no live worker.
    NotRunning,
    Stopped,
    /// The worker did not exit within the stop timeout and was left to finish on its own.
    Abandoned,
}

/// Starts and stops the background session on behalf of the consumer thread.
///
/// Holds at most one worker. The transcript survives across workers, so a restarted
/// session continues the same conversation until `clear_history` is called. Each start
/// retires the previous worker's generation, so a worker abandoned on a stop timeout can
/// no longer publish once its successor is running.
pub struct LifecycleController {
    backend: Arc<dyn SessionBackend>,
    bridge: StateBridge,
    capture: TranscriptCapture,
    gate: GenerationGate,
    options: LifecycleOptions,
    worker: Mutex<Option<WorkerHandle>>,
}

impl LifecycleController {
    pub fn new(backend: Arc<dyn SessionBackend>, options: LifecycleOptions) -> Self {
        let mailbox = UpdateMailbox::new();
        Self {
            backend,
            bridge: StateBridge::new(mailbox.clone()),
            capture: TranscriptCapture::new(mailbox),
            gate: GenerationGate::new(),
            options,
            worker: Mutex::new(None),
        }
    }

    pub fn bridge(&self) -> &StateBridge {
        &self.bridge
    }

    /// Apply everything the worker has published since the last tick.
    pub fn apply_pending<S: StateStore + ?Sized>(&self, state: &mut S) -> ApplyReport {
        self.bridge.apply_pending(state)
    }

    pub fn request_start(&self, config: &SessionConfig) -> BridgeResult<StartOutcome> {
        config.validate()?;

        let mut slot = self.slot();
        if slot.as_ref().is_some_and(WorkerHandle::is_alive) {
            debug!("Session worker already running, ignoring start request");
            return Ok(StartOutcome::AlreadyRunning);
        }
        if let Some(stale) = slot.take() {
            debug!("Reaping finished session worker ({:?})", stale.status());
            stale.join();
        }

        let scope = self.gate.advance();
        info!(
            "Starting session {}: model={}, voice={}, region={}",
            scope.generation(),
            config.model_id,
            config.voice.as_str(),
            config.region
        );
        let handle = SessionWorker::spawn(
            config.clone(),
            Arc::clone(&self.backend),
            Arc::new(self.capture.clone()),
            self.bridge.mailbox().clone(),
            scope,
        )?;

        if handle.wait_for_exit(self.options.start_grace) {
            let cause = handle.last_error();
            handle.join();
            let err = BridgeError::StartFailed(cause);
            error!("Failed to start audio streaming: {}", err);
            return Err(err);
        }

        *slot = Some(handle);
        Ok(StartOutcome::Started)
    }

    pub fn request_stop(&self) -> BridgeResult<StopOutcome> {
        let mut slot = self.slot();
        let Some(handle) = slot.take() else {
            return Ok(StopOutcome::NotRunning);
        };
        if !handle.is_alive() {
            handle.join();
            return Ok(StopOutcome::NotRunning);
        }

        info!("Stopping session");
        handle.request_stop();

        if handle.wait_for_exit(self.options.stop_timeout) {
            handle.join();
            info!("Session stopped");
            Ok(StopOutcome::Stopped)
        } else {
            warn!(
                "Session worker did not exit within {:?}, abandoning it",
                self.options.stop_timeout
            );
            Ok(StopOutcome::Abandoned)
        }
    }

    pub fn is_alive(&self) -> bool {
        self.slot().as_ref().is_some_and(WorkerHandle::is_alive)
    }

    pub fn is_active(&self) -> bool {
        self.slot().as_ref().is_some_and(WorkerHandle::is_active)
    }

    pub fn status(&self) -> Option<WorkerStatus> {
        self.slot().as_ref().map(WorkerHandle::status)
    }

    pub fn last_error(&self) -> Option<String> {
        self.slot().as_ref().and_then(WorkerHandle::last_error)
    }

    pub fn clear_history(&self) {
        self.capture.clear();
    }

    fn slot(&self) -> MutexGuard<'_, Option<WorkerHandle>> {
        self.worker.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for LifecycleController {
    fn drop(&mut self) {
        if let Err(e) = self.request_stop() {
            warn!("Failed to stop session on shutdown: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{ConversationRecord, Role, SessionState};
    use crate::session::testing::{FailAt, FakeBackend};
    use std::thread;
    use std::time::{Duration, Instant};

    fn options() -> LifecycleOptions {
        LifecycleOptions {
            start_grace: Duration::from_millis(250),
            stop_timeout: Duration::from_secs(5),
        }
    }

    fn config() -> SessionConfig {
        SessionConfig {
            audio_warmup: Duration::ZERO,
            ..SessionConfig::default()
        }
    }

    fn controller(backend: &FakeBackend) -> LifecycleController {
        LifecycleController::new(Arc::new(backend.clone()), options())
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_stop_without_worker_is_noop() {
        let backend = FakeBackend::new(FailAt::Nothing);
        let controller = controller(&backend);

        assert_eq!(controller.request_stop().unwrap(), StopOutcome::NotRunning);
        assert!(!controller.is_alive());
        assert!(!controller.is_active());
        assert!(controller.status().is_none());
    }

    #[test]
    fn test_start_then_stop() {
        let backend = FakeBackend::new(FailAt::Nothing);
        let controller = controller(&backend);
        let mut state = SessionState::new();

        assert_eq!(
            controller.request_start(&config()).unwrap(),
            StartOutcome::Started
        );
        assert!(controller.is_alive());
        controller.apply_pending(&mut state);
        assert!(state.is_active());

        assert_eq!(controller.request_stop().unwrap(), StopOutcome::Stopped);
        assert!(!controller.is_alive());
        assert!(controller.status().is_none());

        controller.apply_pending(&mut state);
        assert!(!state.is_active());
        assert_eq!(backend.counters().session_stops(), 1);
    }

    #[test]
    fn test_second_start_is_noop() {
        let backend = FakeBackend::new(FailAt::Nothing);
        let controller = controller(&backend);

        controller.request_start(&config()).unwrap();
        wait_until(|| controller.status() == Some(WorkerStatus::Streaming));

        assert_eq!(
            controller.request_start(&config()).unwrap(),
            StartOutcome::AlreadyRunning
        );
        assert_eq!(backend.counters().sessions_created(), 1);
        controller.request_stop().unwrap();
    }

    #[test]
    fn test_concurrent_starts_spawn_one_worker() {
        let backend = FakeBackend::new(FailAt::Nothing);
        let controller = Arc::new(controller(&backend));

        let outcomes: Vec<StartOutcome> = (0..8)
            .map(|_| {
                let controller = Arc::clone(&controller);
                thread::spawn(move || controller.request_start(&config()).unwrap())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect();

        let started = outcomes
            .iter()
            .filter(|o| **o == StartOutcome::Started)
            .count();
        assert_eq!(started, 1);
        wait_until(|| backend.counters().session_starts() == 1);
        assert_eq!(backend.counters().sessions_created(), 1);

        assert_eq!(controller.request_stop().unwrap(), StopOutcome::Stopped);
    }

    #[test]
    fn test_start_failure_is_reported_and_retryable() {
        let backend = FakeBackend::new(FailAt::Initialize);
        let controller = controller(&backend);
        let mut state = SessionState::new();

        let err = controller.request_start(&config()).unwrap_err();
        match err {
            BridgeError::StartFailed(Some(cause)) => assert!(cause.contains("access denied")),
            other => panic!("unexpected error: {}", other),
        }
        assert!(!controller.is_alive());

        controller.apply_pending(&mut state);
        assert!(!state.is_active());

        // Nothing is left behind, so another attempt spawns a fresh worker.
        assert!(controller.request_start(&config()).is_err());
        assert_eq!(backend.counters().sessions_created(), 2);
    }

    #[test]
    fn test_invalid_config_never_spawns() {
        let backend = FakeBackend::new(FailAt::Nothing);
        let controller = controller(&backend);
        let bad = SessionConfig {
            region: "mars-north-1".to_string(),
            ..config()
        };

        assert!(matches!(
            controller.request_start(&bad),
            Err(BridgeError::Config(_))
        ));
        assert_eq!(backend.counters().sessions_created(), 0);
    }

    #[test]
    fn test_streaming_failure_after_grace_ends_inactive() {
        let backend = FakeBackend::new(FailAt::FailOnRelease);
        let controller = controller(&backend);
        let mut state = SessionState::new();

        assert_eq!(
            controller.request_start(&config()).unwrap(),
            StartOutcome::Started
        );
        wait_until(|| controller.status() == Some(WorkerStatus::Streaming));
        backend.release();
        wait_until(|| !controller.is_alive());
        assert_eq!(controller.status(), Some(WorkerStatus::Failed));

        controller.apply_pending(&mut state);
        assert!(!state.is_active());

        // The dead worker is reaped and the stop is a no-op.
        assert_eq!(controller.request_stop().unwrap(), StopOutcome::NotRunning);
    }

    #[test]
    fn test_stop_timeout_abandons_worker() {
        let backend = FakeBackend::new(FailAt::IgnoreStop);
        let controller = LifecycleController::new(
            Arc::new(backend.clone()),
            LifecycleOptions {
                start_grace: Duration::from_millis(50),
                stop_timeout: Duration::from_millis(100),
            },
        );

        controller.request_start(&config()).unwrap();
        wait_until(|| controller.status() == Some(WorkerStatus::Streaming));

        assert_eq!(controller.request_stop().unwrap(), StopOutcome::Abandoned);
        assert!(!controller.is_alive());
        assert!(controller.status().is_none());

        backend.release();
        let mut state = SessionState::new();
        wait_until(|| {
            controller.apply_pending(&mut state);
            backend.counters().audio_stops() == 1 && !state.is_active()
        });
    }

    #[test]
    fn test_transcript_survives_restart_and_clear() {
        let backend = FakeBackend::new(FailAt::Nothing).with_script(&["User: hello"]);
        let controller = controller(&backend);
        let mut state = SessionState::new();

        controller.request_start(&config()).unwrap();
        wait_until(|| {
            controller.apply_pending(&mut state);
            state.conversation_history().len() == 1
        });
        controller.request_stop().unwrap();

        controller.request_start(&config()).unwrap();
        wait_until(|| {
            controller.apply_pending(&mut state);
            state.conversation_history().len() == 2
        });
        controller.request_stop().unwrap();
        assert_eq!(
            state.conversation_history(),
            &[
                ConversationRecord::new(Role::User, "hello"),
                ConversationRecord::new(Role::User, "hello"),
            ]
        );

        controller.clear_history();
        controller.apply_pending(&mut state);
        assert!(state.conversation_history().is_empty());
    }

    #[test]
    fn test_abandoned_worker_cannot_touch_successor_state() {
        let backend = FakeBackend::new(FailAt::IgnoreStop)
            .with_script(&["User: hello"])
            .first_session_only();
        let controller = LifecycleController::new(
            Arc::new(backend.clone()),
            LifecycleOptions {
                start_grace: Duration::from_millis(250),
                stop_timeout: Duration::from_millis(100),
            },
        );
        let mut state = SessionState::new();

        controller.request_start(&config()).unwrap();
        wait_until(|| controller.status() == Some(WorkerStatus::Streaming));
        assert_eq!(controller.request_stop().unwrap(), StopOutcome::Abandoned);

        assert_eq!(
            controller.request_start(&config()).unwrap(),
            StartOutcome::Started
        );
        wait_until(|| {
            controller.apply_pending(&mut state);
            controller.status() == Some(WorkerStatus::Streaming)
                && state.is_active()
                && state.conversation_history().len() == 2
        });

        // Let the abandoned session finish; its cleanup runs on its own thread.
        backend.release();
        wait_until(|| backend.counters().audio_stops() == 1);
        thread::sleep(Duration::from_millis(200));

        controller.apply_pending(&mut state);
        assert!(controller.is_alive());
        assert!(controller.is_active());
        assert!(state.is_active());
        assert_eq!(state.conversation_history().len(), 2);

        assert_eq!(controller.request_stop().unwrap(), StopOutcome::Stopped);
        controller.apply_pending(&mut state);
        assert!(!state.is_active());
    }
}
