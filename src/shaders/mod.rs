// SPDX-License-Identifier: GPL-3.0-only
//! Presentation shader and shared GPU helpers

pub mod gpu_utils;

pub use gpu_utils::{CachedDimensions, padded_bytes_per_row, read_buffer_async};

use crate::pipeline::geometry::{Affine, Rect};

/// WGSL source for the presentation render pipeline
pub const PRESENT_SHADER: &str = include_str!("present.wgsl");

/// Uniform block matching `PresentParams` in `present.wgsl`
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PresentParams {
    pub inv_row0: [f32; 4],
    pub inv_row1: [f32; 4],
    pub extent: [f32; 4],
    pub target_size: [f32; 4],
}

impl PresentParams {
    /// Build the uniform from the inverse display transform
    pub fn new(inverse: &Affine, extent: &Rect, width: u32, height: u32) -> Self {
        let [r0, r1] = inverse.rows();
        Self {
            inv_row0: [r0[0] as f32, r0[1] as f32, r0[2] as f32, 0.0],
            inv_row1: [r1[0] as f32, r1[1] as f32, r1[2] as f32, 0.0],
            extent: [
                extent.origin.x as f32,
                extent.origin.y as f32,
                extent.size.width as f32,
                extent.size.height as f32,
            ],
            target_size: [width as f32, height as f32, 0.0, 0.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_layout() {
        assert_eq!(std::mem::size_of::<PresentParams>(), 64);
        let params = PresentParams::new(
            &Affine::translation(-3.0, 4.0),
            &Rect::new(-1.0, -1.0, 10.0, 8.0),
            320,
            240,
        );
        assert_eq!(params.inv_row0, [1.0, 0.0, -3.0, 0.0]);
        assert_eq!(params.inv_row1, [0.0, 1.0, 4.0, 0.0]);
        assert_eq!(params.extent, [-1.0, -1.0, 10.0, 8.0]);
    }
}
