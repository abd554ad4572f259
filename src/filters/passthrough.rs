// SPDX-License-Identifier: GPL-3.0-only

use image::RgbaImage;

use super::{FilteredImage, ImageTransform};
use crate::backends::camera::types::PixelFormat;

/// Copies the RGBA input unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl ImageTransform for Passthrough {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn accepts(&self, _format: PixelFormat, _width: u32, _height: u32) -> bool {
        true
    }

    fn apply(&self, input: &RgbaImage) -> FilteredImage {
        FilteredImage::at_origin(input.clone())
    }
}
