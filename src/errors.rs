// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the frame pipeline
//!
//! Fatal configuration failures surface as [`PipelineError`]. Per-frame
//! problems never propagate: they are classified as a [`DropReason`],
//! counted in the pipeline statistics and the frame is discarded.

use std::fmt;

use serde::Serialize;

use crate::pipeline::PipelineState;

/// Result type alias using PipelineError
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type alias for render backend calls
pub type RenderResult<T> = Result<T, RenderError>;

/// Configuration step at which session wiring failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WiringStage {
    /// Connecting the device to the capture session
    Input,
    /// Presentation surface init and frame sink wiring
    Output,
    /// Starting frame delivery
    Commit,
}

/// Fatal pipeline errors
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// No compatible capture device could be resolved
    DeviceUnavailable(String),
    /// A wiring step failed while configuring the session
    SessionWiringFailed { stage: WiringStage, reason: String },
    /// The GPU device backing the presentation surface could not be created
    GpuContextUnavailable(String),
    /// Operation not allowed in the current lifecycle state
    InvalidState(PipelineState),
}

impl PipelineError {
    /// Shorthand for a wiring failure at `stage`
    pub fn wiring(stage: WiringStage, reason: impl Into<String>) -> Self {
        PipelineError::SessionWiringFailed {
            stage,
            reason: reason.into(),
        }
    }

    /// The wiring stage that failed, if this is a wiring error
    pub fn stage(&self) -> Option<WiringStage> {
        match self {
            PipelineError::SessionWiringFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Soft, per-frame reason for discarding a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Filtered extent was empty or not finite
    DegenerateExtent,
    /// Every drawable was still in flight
    NoDrawable,
    /// Raw frame could not be converted to RGBA
    UnsupportedFormat,
    /// A newer frame replaced one the presenter had not taken yet
    MailboxOverwrite,
    /// Frame arrived while the previous one was still being processed
    SourceBusy,
    /// GPU encoding or submission failed for this frame
    RenderFailed,
}

impl DropReason {
    pub const ALL: [DropReason; 6] = [
        DropReason::DegenerateExtent,
        DropReason::NoDrawable,
        DropReason::UnsupportedFormat,
        DropReason::MailboxOverwrite,
        DropReason::SourceBusy,
        DropReason::RenderFailed,
    ];

    /// Stable index used by the statistics counters
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Per-frame render backend failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderError(pub String);

/// Configuration load/save errors
#[derive(Debug)]
pub enum ConfigError {
    /// Reading or writing the config file failed
    Io(std::io::Error),
    /// The config file is not valid JSON for [`crate::config::Config`]
    Parse(serde_json::Error),
    /// No config directory could be determined for this user
    NoConfigDir,
}

impl fmt::Display for WiringStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WiringStage::Input => write!(f, "input"),
            WiringStage::Output => write!(f, "output"),
            WiringStage::Commit => write!(f, "commit"),
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::DeviceUnavailable(msg) => write!(f, "Camera device unavailable: {}", msg),
            PipelineError::SessionWiringFailed { stage, reason } => {
                write!(f, "Session wiring failed at {} stage: {}", stage, reason)
            }
            PipelineError::GpuContextUnavailable(msg) => {
                write!(f, "GPU context unavailable: {}", msg)
            }
            PipelineError::InvalidState(state) => {
                write!(f, "Operation not allowed in {:?} state", state)
            }
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DropReason::DegenerateExtent => "degenerate extent",
            DropReason::NoDrawable => "no drawable available",
            DropReason::UnsupportedFormat => "unsupported format",
            DropReason::MailboxOverwrite => "mailbox overwrite",
            DropReason::SourceBusy => "source busy",
            DropReason::RenderFailed => "render failed",
        };
        f.write_str(name)
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Render error: {}", self.0)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Config I/O error: {}", e),
            ConfigError::Parse(e) => write!(f, "Config parse error: {}", e),
            ConfigError::NoConfigDir => write!(f, "No config directory available"),
        }
    }
}

impl std::error::Error for PipelineError {}
impl std::error::Error for RenderError {}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            ConfigError::NoConfigDir => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err)
    }
}

impl From<String> for RenderError {
    fn from(msg: String) -> Self {
        RenderError(msg)
    }
}

impl From<RenderError> for DropReason {
    fn from(_: RenderError) -> Self {
        DropReason::RenderFailed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wiring_error_reports_stage() {
        let err = PipelineError::wiring(WiringStage::Commit, "pipeline refused to play");
        assert_eq!(err.stage(), Some(WiringStage::Commit));
        assert_eq!(
            err.to_string(),
            "Session wiring failed at commit stage: pipeline refused to play"
        );
        assert_eq!(PipelineError::DeviceUnavailable("x".into()).stage(), None);
    }

    #[test]
    fn test_drop_reason_indices_are_dense() {
        for (i, reason) in DropReason::ALL.iter().enumerate() {
            assert_eq!(reason.index(), i);
        }
    }
}
