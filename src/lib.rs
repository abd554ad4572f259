// SPDX-License-Identifier: MPL-2.0

//! fxcam - live camera preview with per-frame filters
//!
//! This library provides the frame pipeline behind the fxcam binary:
//! frames are captured, filtered on the capture thread, corrected for
//! device orientation and mirroring, and presented on a dedicated
//! presentation thread.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Frame sources (GStreamer devices and a test pattern)
//! - [`filters`]: Per-frame image transforms (comic, mono, passthrough)
//! - [`pipeline`]: Geometry correction, hand-off and the lifecycle controller
//! - [`presentation`]: Drawable pool, vsync pacing and render backends
//! - [`gpu`] and [`shaders`]: wgpu device setup and the presentation shader
//! - [`config`]: User configuration handling
//! - [`terminal`]: Half-block terminal preview
//!
//! # Example
//!
//! ```ignore
//! use fxcam::backends::camera::{CameraFormat, Framerate, PixelFormat, TestPatternSource};
//! use fxcam::presentation::{NullHost, software_surface_factory};
//! use fxcam::{PipelineController, PipelineSettings};
//!
//! let format = CameraFormat {
//!     width: 640,
//!     height: 480,
//!     framerate: Framerate::from_int(30),
//!     pixel_format: PixelFormat::YUYV,
//! };
//! let controller = PipelineController::new(
//!     Box::new(TestPatternSource::new(format)),
//!     software_surface_factory(NullHost::factory()),
//!     PipelineSettings::default(),
//! );
//! controller.configure()?;
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod filters;
pub mod gpu;
pub mod pipeline;
pub mod presentation;
pub mod shaders;
pub mod terminal;

// Re-export commonly used types
pub use config::Config;
pub use errors::{DropReason, PipelineError, PipelineResult, WiringStage};
pub use filters::{FilterKind, FilterStage};
pub use pipeline::{PipelineController, PipelineSettings, PipelineState, StatsSnapshot};
