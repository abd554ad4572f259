// SPDX-License-Identifier: GPL-3.0-only

//! Comic-book filter
//!
//! Sobel edges on luminance draw dark ink outlines over posterized color.
//! The 3x3 kernel has radius 1, so the output grows by one pixel on every
//! side and its extent starts at (-1, -1). Samples outside the input are
//! clamped to the nearest edge pixel.

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use super::{FilteredImage, ImageTransform};
use crate::backends::camera::format_converters::luma;
use crate::backends::camera::types::PixelFormat;
use crate::constants::comic;

/// Kernel radius of the edge detector
pub const RADIUS: u32 = 1;

/// Tunable comic parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComicParams {
    /// Sobel magnitude (0-1 luma units) at which ink is fully opaque
    pub edge_threshold: f32,
    /// Color levels per channel after posterizing
    pub levels: u32,
}

impl Default for ComicParams {
    fn default() -> Self {
        Self {
            edge_threshold: comic::DEFAULT_EDGE_THRESHOLD,
            levels: comic::DEFAULT_POSTERIZE_LEVELS,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ComicFilter {
    edge_threshold: f32,
    levels: u32,
}

impl ComicFilter {
    pub fn new(params: ComicParams) -> Self {
        Self {
            edge_threshold: params.edge_threshold.max(f32::EPSILON),
            levels: params.levels.max(2),
        }
    }

    fn posterize(&self, value: u8) -> f32 {
        let steps = (self.levels - 1) as f32;
        ((value as f32 / 255.0) * steps).round() / steps
    }
}

impl ImageTransform for ComicFilter {
    fn name(&self) -> &'static str {
        "comic"
    }

    fn accepts(&self, format: PixelFormat, width: u32, height: u32) -> bool {
        format != PixelFormat::Gray8 && width >= 3 && height >= 3
    }

    fn apply(&self, input: &RgbaImage) -> FilteredImage {
        let (width, height) = input.dimensions();
        if width == 0 || height == 0 {
            return FilteredImage::at_origin(RgbaImage::new(0, 0));
        }

        let luminance: Vec<f32> = input
            .pixels()
            .map(|p| luma(p[0], p[1], p[2]) as f32 / 255.0)
            .collect();
        let clamp = |x: i64, y: i64| -> (u32, u32) {
            (x.clamp(0, width as i64 - 1) as u32, y.clamp(0, height as i64 - 1) as u32)
        };
        let sample = |x: i64, y: i64| -> f32 {
            let (cx, cy) = clamp(x, y);
            luminance[(cy * width + cx) as usize]
        };

        let out_w = width + 2 * RADIUS;
        let out_h = height + 2 * RADIUS;
        let ink_start = self.edge_threshold * 0.5;

        let output = RgbaImage::from_fn(out_w, out_h, |ox, oy| {
            let x = ox as i64 - RADIUS as i64;
            let y = oy as i64 - RADIUS as i64;

            let tl = sample(x - 1, y - 1);
            let tm = sample(x, y - 1);
            let tr = sample(x + 1, y - 1);
            let ml = sample(x - 1, y);
            let mr = sample(x + 1, y);
            let bl = sample(x - 1, y + 1);
            let bm = sample(x, y + 1);
            let br = sample(x + 1, y + 1);

            let gx = -tl - 2.0 * ml - bl + tr + 2.0 * mr + br;
            let gy = -tl - 2.0 * tm - tr + bl + 2.0 * bm + br;
            let edge = (gx * gx + gy * gy).sqrt();
            let paper = 1.0 - smoothstep(ink_start, self.edge_threshold, edge);

            let (cx, cy) = clamp(x, y);
            let Rgba([r, g, b, a]) = *input.get_pixel(cx, cy);
            let channel = |c: u8| (self.posterize(c) * paper * 255.0).round().clamp(0.0, 255.0) as u8;
            Rgba([channel(r), channel(g), channel(b), a])
        });

        FilteredImage::with_origin(output, -(RADIUS as f64), -(RADIUS as f64))
    }
}

#[inline]
fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}
