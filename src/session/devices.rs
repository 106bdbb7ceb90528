//! Audio device label resolution.
//!
//! Labels come from the host's device picker as `"<index>: <name>"`. Only the index is
//! passed on to the audio component.

use super::config::SessionConfig;
use crate::bridge::LineSink;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeviceResolutionError {
    #[error("device label '{0}' has no index")]
    MissingIndex(String),
    #[error("device label '{label}' has a malformed index '{prefix}'")]
    MalformedIndex { label: String, prefix: String },
}

/// Parse the integer before the first `:` of a device label.
pub fn parse_device_index(label: &str) -> Result<usize, DeviceResolutionError> {
    let prefix = label.split(':').next().unwrap_or_default().trim();
    if prefix.is_empty() {
        return Err(DeviceResolutionError::MissingIndex(label.to_string()));
    }
    prefix
        .parse::<usize>()
        .map_err(|_| DeviceResolutionError::MalformedIndex {
            label: label.to_string(),
            prefix: prefix.to_string(),
        })
}

/// Device indices handed to the audio component. `None` means the system default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceSelection {
    pub input_device_index: Option<usize>,
    pub output_device_index: Option<usize>,
}

impl DeviceSelection {
    /// Resolve both labels. Unparsable labels fall back to the default device and are
    /// reported through `sink`; they never fail the session.
    pub fn resolve(config: &SessionConfig, sink: &dyn LineSink) -> Self {
        Self {
            input_device_index: resolve_label(config.input_device.as_deref(), "input", sink),
            output_device_index: resolve_label(config.output_device.as_deref(), "output", sink),
        }
    }
}

fn resolve_label(label: Option<&str>, kind: &str, sink: &dyn LineSink) -> Option<usize> {
    let label = label.filter(|l| !l.is_empty())?;
    match parse_device_index(label) {
        Ok(index) => Some(index),
        Err(e) => {
            sink.emit(&format!(
                "Could not parse {} device index ({}), using system default",
                kind, e
            ));
            None
        }
    }
}
