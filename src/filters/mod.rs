// SPDX-License-Identifier: GPL-3.0-only

//! Per-frame image filters
//!
//! The [`FilterStage`] converts each raw frame to RGBA and runs the one
//! [`ImageTransform`] chosen at construction. A transform that cannot handle
//! a frame is bypassed with passthrough; a frame that cannot be converted at
//! all is dropped.

pub mod comic;
pub mod mono;
pub mod passthrough;

pub use comic::{ComicFilter, ComicParams};
pub use mono::MonoFilter;
pub use passthrough::Passthrough;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::trace;

use crate::backends::camera::format_converters::to_rgba;
use crate::backends::camera::types::{PixelFormat, RawFrame};
use crate::errors::DropReason;
use crate::pipeline::geometry::Rect;
use crate::pipeline::stats::PipelineStats;

/// RGBA image plus its extent in image space
///
/// The pixel buffer covers exactly the extent, one pixel per unit.
#[derive(Debug, Clone)]
pub struct FilteredImage {
    pub pixels: RgbaImage,
    pub extent: Rect,
    pub sequence: u64,
    pub captured_at: Instant,
}

impl FilteredImage {
    /// Image whose extent starts at the origin
    pub fn at_origin(pixels: RgbaImage) -> Self {
        Self::with_origin(pixels, 0.0, 0.0)
    }

    pub fn with_origin(pixels: RgbaImage, x: f64, y: f64) -> Self {
        let extent = Rect::new(x, y, pixels.width() as f64, pixels.height() as f64);
        Self {
            pixels,
            extent,
            sequence: 0,
            captured_at: Instant::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

/// One image transform applied to every frame
pub trait ImageTransform: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Whether a frame of this source format and size can be processed
    fn accepts(&self, format: PixelFormat, width: u32, height: u32) -> bool;

    fn apply(&self, input: &RgbaImage) -> FilteredImage;
}

/// Which transform a pipeline runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    /// Ink outlines over posterized color
    #[default]
    Comic,
    /// BT.601 luminance grayscale
    Mono,
    Passthrough,
}

impl FilterKind {
    pub const ALL: [FilterKind; 3] = [FilterKind::Comic, FilterKind::Mono, FilterKind::Passthrough];

    pub fn build(&self, comic: ComicParams) -> Box<dyn ImageTransform> {
        match self {
            FilterKind::Comic => Box::new(ComicFilter::new(comic)),
            FilterKind::Mono => Box::new(MonoFilter),
            FilterKind::Passthrough => Box::new(Passthrough),
        }
    }
}

impl std::fmt::Display for FilterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterKind::Comic => write!(f, "comic"),
            FilterKind::Mono => write!(f, "mono"),
            FilterKind::Passthrough => write!(f, "passthrough"),
        }
    }
}

impl std::str::FromStr for FilterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "comic" => Ok(FilterKind::Comic),
            "mono" => Ok(FilterKind::Mono),
            "passthrough" | "none" => Ok(FilterKind::Passthrough),
            other => Err(format!("unknown filter: {}", other)),
        }
    }
}

/// Converts raw frames and applies the configured transform
pub struct FilterStage {
    transform: Box<dyn ImageTransform>,
}

impl FilterStage {
    pub fn new(kind: FilterKind, comic: ComicParams) -> Self {
        Self::from_transform(kind.build(comic))
    }

    pub fn from_transform(transform: Box<dyn ImageTransform>) -> Self {
        Self { transform }
    }

    pub fn name(&self) -> &'static str {
        self.transform.name()
    }

    /// Filter one frame, consuming it
    pub fn apply(&self, frame: RawFrame, stats: &PipelineStats) -> Result<FilteredImage, DropReason> {
        let rgba = to_rgba(&frame).ok_or(DropReason::UnsupportedFormat)?;
        let input =
            RgbaImage::from_raw(frame.width, frame.height, rgba).ok_or(DropReason::UnsupportedFormat)?;

        let mut output = if self.transform.accepts(frame.format, frame.width, frame.height) {
            self.transform.apply(&input)
        } else {
            stats.record_filter_fallback();
            trace!(
                filter = self.transform.name(),
                format = %frame.format,
                width = frame.width,
                height = frame.height,
                "Filter rejected frame, using passthrough"
            );
            Passthrough.apply(&input)
        };

        output.sequence = frame.sequence;
        output.captured_at = frame.captured_at;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_frame(width: u32, height: u32) -> RawFrame {
        RawFrame::packed(width, height, PixelFormat::Gray8, vec![90; (width * height) as usize], 7)
    }

    #[test]
    fn test_comic_on_gray_falls_back() {
        let stats = PipelineStats::default();
        let stage = FilterStage::new(FilterKind::Comic, ComicParams::default());
        let out = stage.apply(gray_frame(8, 8), &stats).unwrap();
        assert_eq!(out.extent, Rect::new(0.0, 0.0, 8.0, 8.0));
        assert_eq!(out.sequence, 7);
        assert_eq!(stats.snapshot().filter_fallbacks, 1);
    }

    #[test]
    fn test_bayer_is_dropped() {
        let stats = PipelineStats::default();
        let stage = FilterStage::new(FilterKind::Mono, ComicParams::default());
        let frame = RawFrame::packed(4, 4, PixelFormat::BayerRGGB, vec![0; 16], 0);
        assert_eq!(stage.apply(frame, &stats).unwrap_err(), DropReason::UnsupportedFormat);
        assert_eq!(stats.snapshot().filter_fallbacks, 0);
    }

    #[test]
    fn test_zero_sized_frame_has_degenerate_extent() {
        let stats = PipelineStats::default();
        let stage = FilterStage::new(FilterKind::Passthrough, ComicParams::default());
        let out = stage
            .apply(RawFrame::packed(0, 0, PixelFormat::RGBA, Vec::new(), 0), &stats)
            .unwrap();
        assert!(out.extent.is_degenerate());
    }

    #[test]
    fn test_filter_kind_parse() {
        assert_eq!("Comic".parse::<FilterKind>(), Ok(FilterKind::Comic));
        assert_eq!("none".parse::<FilterKind>(), Ok(FilterKind::Passthrough));
        assert!("sepia".parse::<FilterKind>().is_err());
    }
}
