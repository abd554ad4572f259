// SPDX-License-Identifier: GPL-3.0-only

//! Luminance grayscale

use image::{Rgba, RgbaImage};

use super::{FilteredImage, ImageTransform};
use crate::backends::camera::format_converters::luma;
use crate::backends::camera::types::PixelFormat;

#[derive(Debug, Clone, Copy, Default)]
pub struct MonoFilter;

impl ImageTransform for MonoFilter {
    fn name(&self) -> &'static str {
        "mono"
    }

    fn accepts(&self, _format: PixelFormat, _width: u32, _height: u32) -> bool {
        true
    }

    fn apply(&self, input: &RgbaImage) -> FilteredImage {
        let mut output = input.clone();
        for pixel in output.pixels_mut() {
            let Rgba([r, g, b, a]) = *pixel;
            let y = luma(r, g, b);
            *pixel = Rgba([y, y, y, a]);
        }
        FilteredImage::at_origin(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mono_uses_bt601_weights() {
        let input = RgbaImage::from_raw(2, 1, vec![255, 0, 0, 255, 0, 255, 0, 128]).unwrap();
        let out = MonoFilter.apply(&input);
        assert_eq!(out.pixels.get_pixel(0, 0).0, [76, 76, 76, 255]);
        assert_eq!(out.pixels.get_pixel(1, 0).0, [150, 150, 150, 128]);
        assert_eq!(out.extent.size.width, 2.0);
    }
}
