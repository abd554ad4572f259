// SPDX-License-Identifier: GPL-3.0-only

//! CPU render backend
//!
//! Performs the same inverse mapping as `present.wgsl` with nearest
//! sampling. Work completes synchronously, so targets are idle as soon as
//! they are presented. Used by tests and by `--software` runs.

use image::{Rgba, RgbaImage};
use std::cell::RefCell;
use std::sync::Arc;

use super::{
    FramePresenter, HostFactory, PresentationSurface, RenderBackend, SurfaceFactory, SurfaceRequest,
};
use crate::errors::{RenderError, RenderResult};
use crate::filters::FilteredImage;
use crate::pipeline::geometry::{Point, Transform};

const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

pub struct SoftwareTarget {
    pixels: RefCell<RgbaImage>,
}

#[derive(Debug, Default)]
pub struct SoftwareBackend {
    rendered: u64,
}

impl SoftwareBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rendered(&self) -> u64 {
        self.rendered
    }
}

impl RenderBackend for SoftwareBackend {
    type Target = SoftwareTarget;

    fn create_target(&mut self, width: u32, height: u32, _slot: usize) -> RenderResult<SoftwareTarget> {
        Ok(SoftwareTarget {
            pixels: RefCell::new(RgbaImage::from_pixel(width, height, BLACK)),
        })
    }

    fn render(
        &mut self,
        target: &SoftwareTarget,
        image: &FilteredImage,
        transform: &Transform,
    ) -> RenderResult<()> {
        let inverse = transform
            .inverse()
            .ok_or_else(|| RenderError("transform is not invertible".to_string()))?;
        let extent = image.extent;
        let (src_w, src_h) = (image.width(), image.height());
        if src_w == 0 || src_h == 0 {
            return Err(RenderError("empty source image".to_string()));
        }

        let mut pixels = target.pixels.borrow_mut();
        for (x, y, pixel) in pixels.enumerate_pixels_mut() {
            let p = inverse.apply(Point::new(x as f64 + 0.5, y as f64 + 0.5));
            let u = (p.x - extent.origin.x) / extent.size.width;
            let v = (p.y - extent.origin.y) / extent.size.height;
            *pixel = if (0.0..=1.0).contains(&u) && (0.0..=1.0).contains(&v) {
                let sx = ((u * src_w as f64) as u32).min(src_w - 1);
                let sy = ((v * src_h as f64) as u32).min(src_h - 1);
                *image.pixels.get_pixel(sx, sy)
            } else {
                BLACK
            };
        }
        self.rendered += 1;
        Ok(())
    }

    fn present(&mut self, _target: &SoftwareTarget) -> RenderResult<()> {
        Ok(())
    }

    fn is_idle(&self, _target: &SoftwareTarget) -> bool {
        true
    }

    fn read_back(&mut self, target: &SoftwareTarget) -> Option<Vec<u8>> {
        Some(target.pixels.borrow().as_raw().clone())
    }
}

/// Surface factory rendering on the CPU
pub fn software_surface_factory(make_host: HostFactory) -> SurfaceFactory {
    Arc::new(move |request: SurfaceRequest| {
        let surface = PresentationSurface::new(SoftwareBackend::new(), request.drawable_count, make_host());
        Ok(Box::new(surface) as Box<dyn FramePresenter>)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::geometry::Rect;

    #[test]
    fn test_renders_through_inverse_transform() {
        let mut backend = SoftwareBackend::new();
        let target = backend.create_target(4, 2, 0).unwrap();
        let source = RgbaImage::from_fn(2, 1, |x, _| {
            if x == 0 { Rgba([255, 0, 0, 255]) } else { Rgba([0, 255, 0, 255]) }
        });
        let image = FilteredImage::at_origin(source);
        let transform = Transform {
            rotation: 0.0,
            sx: 2.0,
            sy: 2.0,
            tx: 0.0,
            ty: 0.0,
            raw_scale: 2.0,
        };
        backend.render(&target, &image, &transform).unwrap();

        let pixels = target.pixels.borrow();
        assert_eq!(pixels.get_pixel(0, 0).0, [255, 0, 0, 255]);
        assert_eq!(pixels.get_pixel(1, 1).0, [255, 0, 0, 255]);
        assert_eq!(pixels.get_pixel(3, 1).0, [0, 255, 0, 255]);
    }

    #[test]
    fn test_outside_extent_is_black() {
        let mut backend = SoftwareBackend::new();
        let target = backend.create_target(4, 4, 0).unwrap();
        let mut image = FilteredImage::at_origin(RgbaImage::from_pixel(2, 2, Rgba([9, 9, 9, 255])));
        image.extent = Rect::new(0.0, 0.0, 2.0, 2.0);
        backend.render(&target, &image, &Transform::identity()).unwrap();
        let pixels = target.pixels.borrow();
        assert_eq!(pixels.get_pixel(1, 1).0, [9, 9, 9, 255]);
        assert_eq!(pixels.get_pixel(3, 3).0, [0, 0, 0, 255]);
    }
}
