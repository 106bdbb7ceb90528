//! Background thread that owns one streaming session.

use super::backend::{AudioStreamer, SessionBackend, StreamSession};
use super::config::SessionConfig;
use super::devices::DeviceSelection;
use super::scope::{ScopedSink, WorkerScope};
use crate::bridge::{LineSink, UpdateMailbox, IS_ACTIVE};
use crate::error::BridgeError;
use anyhow::Result;
use futures_util::FutureExt;
use log::{debug, error, info, warn};
use serde_json::json;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::runtime::{Builder, Handle};

/// Lifecycle of a session worker.
///
/// Moves forward only. `Failed` is terminal and reachable from anything but `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum WorkerStatus {
    Created = 0,
    LoopReady = 1,
    SessionInitializing = 2,
    Streaming = 3,
    Stopping = 4,
    Closed = 5,
    Failed = 6,
}

impl WorkerStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerStatus::Created,
            1 => WorkerStatus::LoopReady,
            2 => WorkerStatus::SessionInitializing,
            3 => WorkerStatus::Streaming,
            4 => WorkerStatus::Stopping,
            5 => WorkerStatus::Closed,
            _ => WorkerStatus::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, WorkerStatus::Closed | WorkerStatus::Failed)
    }
}

/// Ensures the session's `stop` runs once no matter how many paths ask for it.
struct SessionControl {
    session: Arc<dyn StreamSession>,
    stop_sent: AtomicBool,
}

impl SessionControl {
    fn new(session: Arc<dyn StreamSession>) -> Self {
        Self {
            session,
            stop_sent: AtomicBool::new(false),
        }
    }

    async fn stop(&self) -> Result<()> {
        if self.stop_sent.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.session.stop().await
    }
}

/// Where a stop request from another thread gets scheduled.
#[derive(Clone)]
struct StopTarget {
    handle: Handle,
    control: Arc<SessionControl>,
}

/// State visible to both the worker thread and the controller.
struct WorkerShared {
    status: AtomicU8,
    is_active: AtomicBool,
    stop_requested: AtomicBool,
    stop_target: Mutex<Option<StopTarget>>,
    last_error: Mutex<Option<String>>,
}

impl WorkerShared {
    fn new() -> Self {
        Self {
            status: AtomicU8::new(WorkerStatus::Created as u8),
            is_active: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            stop_target: Mutex::new(None),
            last_error: Mutex::new(None),
        }
    }

    fn status(&self) -> WorkerStatus {
        WorkerStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    /// Advance to `next`. Returns false when the move is not allowed from the current state.
    fn transition(&self, next: WorkerStatus) -> bool {
        self.status
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                let current = WorkerStatus::from_u8(current);
                let allowed = !current.is_terminal()
                    && (next == WorkerStatus::Failed || next > current);
                allowed.then_some(next as u8)
            })
            .is_ok()
    }

    fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    fn target(&self) -> MutexGuard<'_, Option<StopTarget>> {
        self.stop_target.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record_error(&self, err: &BridgeError) {
        let mut last = self.last_error.lock().unwrap_or_else(|e| e.into_inner());
        *last = Some(err.to_string());
    }
}

/// Controller-side handle to a running worker.
pub struct WorkerHandle {
    thread: JoinHandle<()>,
    shared: Arc<WorkerShared>,
    exited: mpsc::Receiver<()>,
}

impl WorkerHandle {
    pub fn is_alive(&self) -> bool {
        !self.thread.is_finished()
    }

    pub fn is_active(&self) -> bool {
        self.shared.is_active.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> WorkerStatus {
        self.shared.status()
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared
            .last_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Ask the worker to unwind.
    ///
    /// If the session is up, its `stop` is spawned onto the worker's own loop; otherwise
    /// the flag is picked up before the worker's next phase.
    pub fn request_stop(&self) {
        self.shared.stop_requested.store(true, Ordering::SeqCst);
        self.shared.transition(WorkerStatus::Stopping);

        let target = self.shared.target();
        if let Some(target) = target.as_ref() {
            let control = Arc::clone(&target.control);
            target.handle.spawn(async move {
                if let Err(e) = control.stop().await {
                    let err = BridgeError::StopSignal(format!("{:#}", e));
                    warn!("SessionWorker: {}", err);
                }
            });
            debug!("SessionWorker: stop scheduled on worker loop");
        } else {
            debug!("SessionWorker: stop flagged before session was up");
        }
    }

    /// Wait up to `timeout` for the worker thread to finish its cleanup.
    pub fn wait_for_exit(&self, timeout: Duration) -> bool {
        match self.exited.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        }
    }

    pub fn join(self) {
        if self.thread.join().is_err() {
            error!("Session worker thread panicked");
        }
    }
}

/// Runs when the worker thread leaves `run`, including by unwinding.
struct ExitGuard {
    shared: Arc<WorkerShared>,
    scope: WorkerScope,
    mailbox: UpdateMailbox,
    exited: mpsc::Sender<()>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.shared.target().take();
        self.shared.transition(WorkerStatus::Closed);
        self.shared.is_active.store(false, Ordering::SeqCst);
        if !self.scope.publish(|| self.mailbox.put(IS_ACTIVE, json!(false))) {
            debug!(
                "SessionWorker: generation {} was superseded, not publishing is_active",
                self.scope.generation()
            );
        }
        let _ = self.exited.send(());
        info!("Session worker finished ({:?})", self.shared.status());
    }
}

pub struct SessionWorker {
    config: SessionConfig,
    backend: Arc<dyn SessionBackend>,
    sink: Arc<dyn LineSink>,
    mailbox: UpdateMailbox,
    scope: WorkerScope,
    shared: Arc<WorkerShared>,
}

impl SessionWorker {
    /// Spawn a worker thread for `config`. The config is moved in, so later settings
    /// changes never reach this session.
    ///
    /// Everything the worker publishes, through `mailbox` or `sink`, is dropped once
    /// `scope` is no longer current.
    pub fn spawn(
        config: SessionConfig,
        backend: Arc<dyn SessionBackend>,
        sink: Arc<dyn LineSink>,
        mailbox: UpdateMailbox,
        scope: WorkerScope,
    ) -> std::io::Result<WorkerHandle> {
        let shared = Arc::new(WorkerShared::new());
        let (exited_tx, exited_rx) = mpsc::channel();

        let worker = SessionWorker {
            config,
            backend,
            sink: Arc::new(ScopedSink::new(sink, scope.clone())),
            mailbox,
            scope,
            shared: Arc::clone(&shared),
        };

        let thread = thread::Builder::new()
            .name("talkback-session".to_string())
            .spawn(move || worker.run(exited_tx))?;

        Ok(WorkerHandle {
            thread,
            shared,
            exited: exited_rx,
        })
    }

    fn run(self, exited: mpsc::Sender<()>) {
        let _guard = ExitGuard {
            shared: Arc::clone(&self.shared),
            scope: self.scope.clone(),
            mailbox: self.mailbox.clone(),
            exited,
        };

        let runtime = match Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime,
            Err(e) => {
                self.fail(BridgeError::Initialization(format!(
                    "failed to build event loop: {}",
                    e
                )));
                return;
            }
        };

        self.shared.transition(WorkerStatus::LoopReady);
        self.shared.is_active.store(true, Ordering::SeqCst);
        self.scope.publish(|| self.mailbox.put(IS_ACTIVE, json!(true)));
        if self.config.debug {
            debug!("SessionWorker: loop ready for {:?}", self.config);
        }

        if self.shared.stop_requested() {
            info!("SessionWorker: stop requested before session creation");
            return;
        }

        let session = match self.backend.create_session(&self.config, Arc::clone(&self.sink)) {
            Ok(session) => session,
            Err(e) => {
                self.fail(BridgeError::Initialization(format!("{:#}", e)));
                return;
            }
        };
        let control = Arc::new(SessionControl::new(session));

        *self.shared.target() = Some(StopTarget {
            handle: runtime.handle().clone(),
            control: Arc::clone(&control),
        });

        let outcome = runtime.block_on(async {
            let mut audio: Option<Arc<dyn AudioStreamer>> = None;

            let result = AssertUnwindSafe(self.drive(&control, &mut audio))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(BridgeError::Streaming(panic_message(panic))));

            self.shared.transition(WorkerStatus::Stopping);
            if let Some(audio) = audio.take() {
                if let Err(e) = audio.stop_streaming().await {
                    warn!("Error stopping audio streamer: {:#}", e);
                }
            }
            if let Err(e) = control.stop().await {
                warn!("{}", BridgeError::StopSignal(format!("{:#}", e)));
            }
            result
        });

        if let Err(e) = outcome {
            self.fail(e);
        }

        // Nothing may be scheduled onto the loop once it starts closing.
        self.shared.target().take();
        drop(runtime);
        debug!("SessionWorker: event loop closed");
    }

    async fn drive(
        &self,
        control: &SessionControl,
        audio_slot: &mut Option<Arc<dyn AudioStreamer>>,
    ) -> Result<(), BridgeError> {
        self.shared.transition(WorkerStatus::SessionInitializing);
        control
            .session
            .initialize()
            .await
            .map_err(|e| BridgeError::Initialization(format!("{:#}", e)))?;
        info!("SessionWorker: session initialized");

        if self.shared.stop_requested() {
            return Ok(());
        }

        let devices = DeviceSelection::resolve(&self.config, self.sink.as_ref());
        debug!(
            "Creating audio streamer with input_device_index={:?}, output_device_index={:?}",
            devices.input_device_index, devices.output_device_index
        );
        let audio = self
            .backend
            .create_audio(Arc::clone(&control.session), devices, Arc::clone(&self.sink))
            .map_err(|e| BridgeError::Streaming(format!("{:#}", e)))?;
        *audio_slot = Some(Arc::clone(&audio));

        if !self.config.audio_warmup.is_zero() {
            tokio::time::sleep(self.config.audio_warmup).await;
        }

        if self.shared.stop_requested() || !self.shared.transition(WorkerStatus::Streaming) {
            return Ok(());
        }
        info!("SessionWorker: streaming");

        let session = Arc::clone(&control.session);
        let result = tokio::select! {
            r = session.start() => r,
            r = audio.start_streaming() => r,
        };
        result.map_err(|e| BridgeError::Streaming(format!("{:#}", e)))
    }

    fn fail(&self, err: BridgeError) {
        error!("Error in streaming thread: {}", err);
        self.sink.emit(&format!("Error in streaming thread: {}", err));
        self.shared.record_error(&err);
        self.shared.transition(WorkerStatus::Failed);
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}
