//! In-process fakes for the session collaborators.

use super::backend::{AudioStreamer, SessionBackend, StreamSession};
use super::config::SessionConfig;
use super::devices::DeviceSelection;
use crate::bridge::LineSink;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

#[derive(Default)]
pub struct RecordingSink {
    lines: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

impl LineSink for RecordingSink {
    fn emit(&self, text: &str) {
        self.lines
            .lock()
            .unwrap()
            .extend(text.lines().map(str::to_string));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Nothing,
    CreateSession,
    Initialize,
    CreateAudio,
    Streaming,
    PanicStreaming,
    StopAudio,
    /// `stop` is accepted but the session keeps running until `release`.
    IgnoreStop,
    /// Streams normally, then errors out once `release` is called.
    FailOnRelease,
    /// `initialize` does not return until `release` is called.
    HoldInitialize,
}

#[derive(Default)]
pub struct Counters {
    sessions_created: AtomicUsize,
    session_starts: AtomicUsize,
    session_stops: AtomicUsize,
    audio_created: AtomicUsize,
    audio_stops: AtomicUsize,
}

impl Counters {
    pub fn sessions_created(&self) -> usize {
        self.sessions_created.load(Ordering::SeqCst)
    }
    pub fn session_starts(&self) -> usize {
        self.session_starts.load(Ordering::SeqCst)
    }
    pub fn session_stops(&self) -> usize {
        self.session_stops.load(Ordering::SeqCst)
    }
    pub fn audio_created(&self) -> usize {
        self.audio_created.load(Ordering::SeqCst)
    }
    pub fn audio_stops(&self) -> usize {
        self.audio_stops.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct FakeBackend {
    fail_at: FailAt,
    script: Vec<String>,
    end_after_script: bool,
    first_session_only: bool,
    counters: Arc<Counters>,
    release: Arc<watch::Sender<bool>>,
}

impl FakeBackend {
    pub fn new(fail_at: FailAt) -> Self {
        let (release, _) = watch::channel(false);
        Self {
            fail_at,
            script: Vec::new(),
            end_after_script: false,
            first_session_only: false,
            counters: Arc::new(Counters::default()),
            release: Arc::new(release),
        }
    }

    pub fn with_script(mut self, lines: &[&str]) -> Self {
        self.script = lines.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn ending_after_script(mut self) -> Self {
        self.end_after_script = true;
        self
    }

    /// Apply `fail_at` and `release` to the first session only; later sessions behave
    /// normally and ignore `release`.
    pub fn first_session_only(mut self) -> Self {
        self.first_session_only = true;
        self
    }

    pub fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.counters)
    }

    /// Unblock every session created by this backend.
    pub fn release(&self) {
        self.release.send_replace(true);
    }
}

impl SessionBackend for FakeBackend {
    fn create_session(
        &self,
        _config: &SessionConfig,
        sink: Arc<dyn LineSink>,
    ) -> Result<Arc<dyn StreamSession>> {
        if self.fail_at == FailAt::CreateSession {
            return Err(anyhow!("no credentials"));
        }
        let created_before = self.counters.sessions_created.fetch_add(1, Ordering::SeqCst);
        let (fail_at, release) = if self.first_session_only && created_before > 0 {
            (FailAt::Nothing, watch::channel(false).1)
        } else {
            (self.fail_at, self.release.subscribe())
        };
        Ok(Arc::new(FakeSession {
            fail_at,
            script: self.script.clone(),
            end_after_script: self.end_after_script,
            counters: Arc::clone(&self.counters),
            sink,
            stopped: watch::channel(false).0,
            release,
        }))
    }

    fn create_audio(
        &self,
        _session: Arc<dyn StreamSession>,
        _devices: DeviceSelection,
        _sink: Arc<dyn LineSink>,
    ) -> Result<Arc<dyn AudioStreamer>> {
        if self.fail_at == FailAt::CreateAudio {
            return Err(anyhow!("device busy"));
        }
        self.counters.audio_created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeAudio {
            fail_at: self.fail_at,
            counters: Arc::clone(&self.counters),
        }))
    }
}

struct FakeSession {
    fail_at: FailAt,
    script: Vec<String>,
    end_after_script: bool,
    counters: Arc<Counters>,
    sink: Arc<dyn LineSink>,
    stopped: watch::Sender<bool>,
    release: watch::Receiver<bool>,
}

#[async_trait]
impl StreamSession for FakeSession {
    async fn initialize(&self) -> Result<()> {
        match self.fail_at {
            FailAt::Initialize => Err(anyhow!("access denied")),
            FailAt::HoldInitialize => {
                wait_until_set(&mut self.release.clone()).await;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn start(&self) -> Result<()> {
        self.counters.session_starts.fetch_add(1, Ordering::SeqCst);
        for line in &self.script {
            self.sink.emit(line);
        }
        match self.fail_at {
            FailAt::Streaming => return Err(anyhow!("stream reset")),
            FailAt::PanicStreaming => panic!("decoder blew up"),
            _ => {}
        }
        if self.end_after_script {
            return Ok(());
        }

        let mut stopped = self.stopped.subscribe();
        let mut release = self.release.clone();
        if self.fail_at == FailAt::IgnoreStop {
            wait_until_set(&mut release).await;
        } else if self.fail_at == FailAt::FailOnRelease {
            wait_until_set(&mut release).await;
            return Err(anyhow!("connection dropped"));
        } else {
            tokio::select! {
                _ = wait_until_set(&mut stopped) => {}
                _ = wait_until_set(&mut release) => {}
            }
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.counters.session_stops.fetch_add(1, Ordering::SeqCst);
        self.stopped.send_replace(true);
        Ok(())
    }
}

async fn wait_until_set(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

struct FakeAudio {
    fail_at: FailAt,
    counters: Arc<Counters>,
}

#[async_trait]
impl AudioStreamer for FakeAudio {
    async fn start_streaming(&self) -> Result<()> {
        std::future::pending::<()>().await;
        Ok(())
    }

    async fn stop_streaming(&self) -> Result<()> {
        self.counters.audio_stops.fetch_add(1, Ordering::SeqCst);
        if self.fail_at == FailAt::StopAudio {
            return Err(anyhow!("device unplugged"));
        }
        Ok(())
    }
}
