use crate::settings::{AppSettings, Voice};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "talkback", about = "Talkback - voice session console")]
pub struct CliArgs {
    /// Settings file (JSON). Missing files fall back to defaults
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Service region
    #[arg(long)]
    pub region: Option<String>,

    /// Model identifier
    #[arg(long)]
    pub model_id: Option<String>,

    /// Voice (matthew, amy, tiffany)
    #[arg(long)]
    pub voice: Option<Voice>,

    /// Enable debug mode with verbose logging
    #[arg(long)]
    pub debug: bool,

    /// Input device label, e.g. "2: USB Mic"
    #[arg(long)]
    pub input_device: Option<String>,

    /// Output device label, e.g. "1: Speakers"
    #[arg(long)]
    pub output_device: Option<String>,

    /// Session script replayed as the model's output
    #[arg(long)]
    pub script: Option<PathBuf>,

    /// Consumer tick interval in milliseconds
    #[arg(long, default_value_t = 100)]
    pub tick_ms: u64,
}

impl CliArgs {
    /// Command line values take precedence over the settings file.
    pub fn apply_to(&self, settings: &mut AppSettings) {
        if let Some(region) = &self.region {
            settings.region = region.clone();
        }
        if let Some(model_id) = &self.model_id {
            settings.model_id = model_id.clone();
        }
        if let Some(voice) = self.voice {
            settings.voice = voice;
        }
        if self.debug {
            settings.debug_mode = true;
        }
        if let Some(label) = &self.input_device {
            settings.selected_microphone = Some(label.clone());
        }
        if let Some(label) = &self.output_device {
            settings.selected_output_device = Some(label.clone());
        }
    }
}
