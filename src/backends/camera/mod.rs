// SPDX-License-Identifier: GPL-3.0-only

//! Camera frame sources
//!
//! A frame source delivers [`RawFrame`]s on its own background thread into a
//! [`FrameSink`] supplied by the pipeline controller.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │  PipelineController  │  ← sequences discover → inputs → outputs → commit
//! └──────────┬───────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐
//! │  FrameSource Trait   │  ← common interface
//! └──────────┬───────────┘
//!            │
//!     ┌──────┴───────┐
//!     ▼              ▼
//! ┌─────────┐  ┌────────────┐
//! │GStreamer│  │TestPattern │  ← concrete implementations
//! └─────────┘  └────────────┘
//! ```

pub mod format_converters;
pub mod frame_loop;
pub mod gst_source;
pub mod test_pattern;
pub mod types;
pub mod v4l2_utils;

pub use gst_source::GStreamerSource;
pub use test_pattern::TestPatternSource;
pub use types::*;

use std::sync::Arc;

use crate::errors::PipelineResult;

/// Callback invoked on the source's capture thread for every delivered frame
pub type FrameSink = Arc<dyn Fn(RawFrame) + Send + Sync>;

/// A camera that produces raw frames on a dedicated background thread
///
/// Setup is split into the steps the controller sequences. Every step
/// reports failures as [`crate::errors::PipelineError`] so the controller can
/// tell the caller which stage broke.
pub trait FrameSource: Send {
    /// Human readable name for logs
    fn name(&self) -> &str;

    /// Resolve and validate the configured device
    ///
    /// Fails with `DeviceUnavailable` when no compatible device exists.
    fn discover(&mut self) -> PipelineResult<()>;

    /// Connect the device to the capture session
    fn attach_input(&mut self) -> PipelineResult<()>;

    /// Route delivered frames into `sink`
    fn attach_output(&mut self, sink: FrameSink) -> PipelineResult<()>;

    /// Begin delivering frames
    fn commit(&mut self) -> PipelineResult<()>;

    /// Resume delivery after [`FrameSource::stop`]
    fn start(&mut self) -> PipelineResult<()>;

    /// Halt delivery
    ///
    /// Idempotent, callable from any thread including the capture thread,
    /// and never waits for the capture thread.
    fn stop(&mut self);

    /// Whether frames are currently being delivered
    fn is_delivering(&self) -> bool;

    /// Release everything the setup steps created so they can run again
    fn teardown(&mut self) {
        self.stop();
    }
}

/// Build the source matching a device description
pub fn create_source(device: &CameraDevice, output_format: PixelFormat) -> Box<dyn FrameSource> {
    match device.kind {
        SourceKind::TestPattern => Box::new(TestPatternSource::new(device.format)),
        SourceKind::V4l2 { .. } | SourceKind::PipeWire { .. } => {
            Box::new(GStreamerSource::new(device.clone(), output_format))
        }
    }
}
