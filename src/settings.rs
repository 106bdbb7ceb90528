use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const SUPPORTED_REGIONS: &[&str] = &["us-east-1"];

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    #[default]
    Matthew,
    Amy,
    Tiffany,
}

impl Voice {
    pub fn as_str(self) -> &'static str {
        match self {
            Voice::Matthew => "matthew",
            Voice::Amy => "amy",
            Voice::Tiffany => "tiffany",
        }
    }
}

impl std::str::FromStr for Voice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "matthew" => Ok(Voice::Matthew),
            "amy" => Ok(Voice::Amy),
            "tiffany" => Ok(Voice::Tiffany),
            other => Err(format!("unknown voice '{}'", other)),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AppSettings {
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default)]
    pub voice: Voice,
    #[serde(default = "default_debug_mode")]
    pub debug_mode: bool,
    /// Input device label in `"<index>: <name>"` form.
    #[serde(default)]
    pub selected_microphone: Option<String>,
    #[serde(default)]
    pub selected_output_device: Option<String>,
    /// Pause between building the audio component and starting it, letting devices settle.
    #[serde(default = "default_audio_warmup_ms")]
    pub audio_warmup_ms: u64,
    #[serde(default = "default_start_grace_ms")]
    pub start_grace_ms: u64,
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_model_id() -> String {
    "amazon.nova-sonic-v1:0".to_string()
}

fn default_debug_mode() -> bool {
    false
}

fn default_audio_warmup_ms() -> u64 {
    500
}

fn default_start_grace_ms() -> u64 {
    500
}

fn default_stop_timeout_ms() -> u64 {
    5000
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            region: default_region(),
            model_id: default_model_id(),
            voice: Voice::default(),
            debug_mode: default_debug_mode(),
            selected_microphone: None,
            selected_output_device: None,
            audio_warmup_ms: default_audio_warmup_ms(),
            start_grace_ms: default_start_grace_ms(),
            stop_timeout_ms: default_stop_timeout_ms(),
        }
    }
}

/// Load settings from a JSON file. A missing file yields the defaults.
pub fn load_settings(path: &Path) -> Result<AppSettings> {
    if !path.exists() {
        warn!(
            "Settings file {} not found, using defaults",
            path.display()
        );
        return Ok(AppSettings::default());
    }

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read settings from {}", path.display()))?;
    let settings: AppSettings = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse settings in {}", path.display()))?;
    debug!("Loaded settings from {}: {:?}", path.display(), settings);
    Ok(settings)
}
