// SPDX-License-Identifier: GPL-3.0-only

//! Frame pipeline orchestration
//!
//! ```text
//! capture thread                         fxcam-present thread
//! ┌─────────────┐  ┌────────┐  ┌───────┐  ┌─────────┐  ┌──────────────┐
//! │ FrameSource ├─▶│ Filter ├─▶│ Geom. ├─▶│ Mailbox ├─▶│ Presentation │
//! └─────────────┘  └────────┘  └───────┘  └─────────┘  └──────────────┘
//! ```
//!
//! The capture side never waits on the GPU. A newer frame replaces any frame
//! the presentation thread has not taken yet.

pub mod controller;
pub mod geometry;
pub mod mailbox;
pub mod stats;

pub use controller::{PipelineController, PipelineSettings, PreparedFrame};
pub use geometry::{ContentFit, Correction, GeometryCorrector, Point, Rect, Size, Transform};
pub use mailbox::FrameMailbox;
pub use stats::{PipelineStats, StatsSnapshot};

use serde::Serialize;

/// Lifecycle state of a [`PipelineController`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PipelineState {
    #[default]
    Idle,
    Configuring,
    Running,
    /// Rendering disabled, device and GPU kept for restart
    Stopped,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::Idle => write!(f, "idle"),
            PipelineState::Configuring => write!(f, "configuring"),
            PipelineState::Running => write!(f, "running"),
            PipelineState::Stopped => write!(f, "stopped"),
        }
    }
}
