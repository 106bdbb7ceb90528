use crate::error::BridgeError;
use crate::settings::{AppSettings, Voice, SUPPORTED_REGIONS};
use std::time::Duration;

/// Snapshot of everything a worker needs, taken when the session is requested.
///
/// The worker receives its own copy; later settings changes only affect the next session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub region: String,
    pub model_id: String,
    pub voice: Voice,
    pub debug: bool,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub audio_warmup: Duration,
}

impl SessionConfig {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            region: settings.region.clone(),
            model_id: settings.model_id.clone(),
            voice: settings.voice,
            debug: settings.debug_mode,
            input_device: settings.selected_microphone.clone(),
            output_device: settings.selected_output_device.clone(),
            audio_warmup: Duration::from_millis(settings.audio_warmup_ms),
        }
    }

    pub fn validate(&self) -> Result<(), BridgeError> {
        if !SUPPORTED_REGIONS.contains(&self.region.as_str()) {
            return Err(BridgeError::Config(format!(
                "unsupported region '{}' (supported: {})",
                self.region,
                SUPPORTED_REGIONS.join(", ")
            )));
        }
        if self.model_id.trim().is_empty() {
            return Err(BridgeError::Config("model id is empty".to_string()));
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_settings(&AppSettings::default())
    }
}

/// Timing knobs for the lifecycle controller.
#[derive(Debug, Clone, Copy)]
pub struct LifecycleOptions {
    /// How long `request_start` waits before checking the worker survived startup.
    pub start_grace: Duration,
    /// Upper bound on how long `request_stop` waits for the worker to exit.
    pub stop_timeout: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            start_grace: Duration::from_millis(500),
            stop_timeout: Duration::from_secs(5),
        }
    }
}

impl LifecycleOptions {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            start_grace: Duration::from_millis(settings.start_grace_ms),
            stop_timeout: Duration::from_millis(settings.stop_timeout_ms),
        }
    }
}
