//! Offline stand-ins for the remote session and the audio hardware.
//!
//! The scripted session replays a text file as if it were the model's console output,
//! which is enough to drive the whole bridge from the `talkback` binary.

use super::backend::{AudioStreamer, SessionBackend, StreamSession};
use super::config::SessionConfig;
use super::devices::DeviceSelection;
use crate::bridge::LineSink;
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

const DEFAULT_LINE_DELAY: Duration = Duration::from_millis(400);

const DEFAULT_SCRIPT: &str = "\
Connecting to service...
Session ready
User: turn on the lights
Assistant: Done. The living room lights are on.
# delay 800
User: and set them to fifty percent
Assistant: Brightness set to fifty percent.
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
    Line(String),
    Delay(Duration),
}

/// Parse a session script. `# delay <ms>` pauses playback, other `#` lines and blank
/// lines are skipped, everything else is emitted verbatim.
pub fn parse_script(text: &str) -> Vec<ScriptStep> {
    text.lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                return None;
            }
            if let Some(comment) = trimmed.strip_prefix('#') {
                return comment
                    .trim()
                    .strip_prefix("delay")
                    .and_then(|ms| ms.trim().parse::<u64>().ok())
                    .map(|ms| ScriptStep::Delay(Duration::from_millis(ms)));
            }
            Some(ScriptStep::Line(line.trim_end().to_string()))
        })
        .collect()
}

pub struct ScriptedBackend {
    script_path: Option<PathBuf>,
    line_delay: Duration,
}

impl ScriptedBackend {
    pub fn new(script_path: Option<PathBuf>) -> Self {
        Self {
            script_path,
            line_delay: DEFAULT_LINE_DELAY,
        }
    }

    pub fn with_line_delay(mut self, delay: Duration) -> Self {
        self.line_delay = delay;
        self
    }
}

impl SessionBackend for ScriptedBackend {
    fn create_session(
        &self,
        config: &SessionConfig,
        sink: Arc<dyn LineSink>,
    ) -> Result<Arc<dyn StreamSession>> {
        Ok(Arc::new(ScriptedSession {
            script_path: self.script_path.clone(),
            line_delay: self.line_delay,
            label: format!(
                "{} ({}, voice {})",
                config.model_id,
                config.region,
                config.voice.as_str()
            ),
            sink,
            steps: Mutex::new(Vec::new()),
            stopped: watch::channel(false).0,
        }))
    }

    fn create_audio(
        &self,
        _session: Arc<dyn StreamSession>,
        devices: DeviceSelection,
        sink: Arc<dyn LineSink>,
    ) -> Result<Arc<dyn AudioStreamer>> {
        Ok(Arc::new(NullAudio {
            devices,
            sink,
            stopped: watch::channel(false).0,
        }))
    }
}

struct ScriptedSession {
    script_path: Option<PathBuf>,
    line_delay: Duration,
    label: String,
    sink: Arc<dyn LineSink>,
    steps: Mutex<Vec<ScriptStep>>,
    stopped: watch::Sender<bool>,
}

#[async_trait]
impl StreamSession for ScriptedSession {
    async fn initialize(&self) -> Result<()> {
        let text = match &self.script_path {
            Some(path) => tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read session script {}", path.display()))?,
            None => DEFAULT_SCRIPT.to_string(),
        };
        let steps = parse_script(&text);
        debug!("Scripted session loaded {} step(s)", steps.len());
        *self.steps.lock().unwrap_or_else(|e| e.into_inner()) = steps;
        self.sink.emit(&format!("Initialized session with {}", self.label));
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        let steps = std::mem::take(&mut *self.steps.lock().unwrap_or_else(|e| e.into_inner()));
        let mut stopped = self.stopped.subscribe();

        for step in steps {
            let pause = match step {
                ScriptStep::Line(line) => {
                    self.sink.emit(&line);
                    self.line_delay
                }
                ScriptStep::Delay(delay) => delay,
            };
            if !sleep_unless_stopped(pause, &mut stopped).await {
                self.sink.emit("Session stopped by user");
                return Ok(());
            }
        }

        self.sink.emit("Session ended");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.stopped.send_replace(true);
        Ok(())
    }
}

/// Audio component that owns no device; it only reports what it was asked to open.
struct NullAudio {
    devices: DeviceSelection,
    sink: Arc<dyn LineSink>,
    stopped: watch::Sender<bool>,
}

#[async_trait]
impl AudioStreamer for NullAudio {
    async fn start_streaming(&self) -> Result<()> {
        let describe = |index: Option<usize>| {
            index.map_or_else(|| "default".to_string(), |i| i.to_string())
        };
        self.sink.emit(&format!(
            "Audio streaming with input device {}, output device {}",
            describe(self.devices.input_device_index),
            describe(self.devices.output_device_index)
        ));

        let mut stopped = self.stopped.subscribe();
        while !*stopped.borrow_and_update() {
            if stopped.changed().await.is_err() {
                break;
            }
        }
        Ok(())
    }

    async fn stop_streaming(&self) -> Result<()> {
        self.stopped.send_replace(true);
        Ok(())
    }
}

/// Sleep for `duration`. Returns false if the stop flag was raised first.
async fn sleep_unless_stopped(duration: Duration, stopped: &mut watch::Receiver<bool>) -> bool {
    if *stopped.borrow_and_update() {
        return false;
    }
    let elapsed = tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = stopped.changed() => false,
    };
    elapsed && !*stopped.borrow()
}
