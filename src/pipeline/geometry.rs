// SPDX-License-Identifier: GPL-3.0-only

//! Image-space geometry correction
//!
//! Maps a filtered image's extent onto the presentation surface. The
//! transform is composed in a fixed order: rotate for device orientation,
//! flip for mirrored sensors, scale to fill, then recenter. All coordinates
//! are in image space with the y axis pointing down.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::backends::camera::types::Orientation;
use crate::constants::geometry::{
    COARSE_SCALE_QUANTUM, EPSILON, FINE_SCALE_QUANTUM, HIGH_DENSITY_THRESHOLD,
};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Non-finite or non-positive in either dimension
    pub fn is_empty(&self) -> bool {
        !(self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0)
    }
}

/// Axis-aligned rectangle (origin at the minimum corner)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub origin: Point,
    pub size: Size,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            origin: Point::new(x, y),
            size: Size::new(width, height),
        }
    }

    pub fn min_x(&self) -> f64 {
        self.origin.x
    }

    pub fn min_y(&self) -> f64 {
        self.origin.y
    }

    pub fn max_x(&self) -> f64 {
        self.origin.x + self.size.width
    }

    pub fn max_y(&self) -> f64 {
        self.origin.y + self.size.height
    }

    /// Empty, or any component is NaN/infinite
    pub fn is_degenerate(&self) -> bool {
        !(self.origin.x.is_finite() && self.origin.y.is_finite()) || self.size.is_empty()
    }

    /// Whether `other` lies inside this rectangle, within `EPSILON`
    pub fn covers(&self, other: &Rect) -> bool {
        self.min_x() <= other.min_x() + EPSILON
            && self.min_y() <= other.min_y() + EPSILON
            && self.max_x() >= other.max_x() - EPSILON
            && self.max_y() >= other.max_y() - EPSILON
    }
}

/// 2x3 affine matrix
///
/// `x' = a*x + c*y + tx`, `y' = b*x + d*y + ty`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub tx: f64,
    pub ty: f64,
}

impl Default for Affine {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Snap values within floating noise of -1, 0 or 1
fn snap_unit(v: f64) -> f64 {
    for target in [-1.0, 0.0, 1.0] {
        if (v - target).abs() < 1e-12 {
            return target;
        }
    }
    v
}

impl Affine {
    pub const IDENTITY: Affine = Affine {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        tx: 0.0,
        ty: 0.0,
    };

    pub fn rotation(theta: f64) -> Self {
        let (sin, cos) = theta.sin_cos();
        let (sin, cos) = (snap_unit(sin), snap_unit(cos));
        Self {
            a: cos,
            b: sin,
            c: -sin,
            d: cos,
            tx: 0.0,
            ty: 0.0,
        }
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self {
            a: sx,
            d: sy,
            ..Self::IDENTITY
        }
    }

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self {
            tx,
            ty,
            ..Self::IDENTITY
        }
    }

    /// `self` followed by `next`
    pub fn then(&self, next: &Affine) -> Affine {
        Affine {
            a: next.a * self.a + next.c * self.b,
            b: next.b * self.a + next.d * self.b,
            c: next.a * self.c + next.c * self.d,
            d: next.b * self.c + next.d * self.d,
            tx: next.a * self.tx + next.c * self.ty + next.tx,
            ty: next.b * self.tx + next.d * self.ty + next.ty,
        }
    }

    pub fn determinant(&self) -> f64 {
        self.a * self.d - self.b * self.c
    }

    pub fn inverse(&self) -> Option<Affine> {
        let det = self.determinant();
        if det.abs() < f64::EPSILON || !det.is_finite() {
            return None;
        }
        let a = self.d / det;
        let b = -self.b / det;
        let c = -self.c / det;
        let d = self.a / det;
        Some(Affine {
            a,
            b,
            c,
            d,
            tx: -(a * self.tx + c * self.ty),
            ty: -(b * self.tx + d * self.ty),
        })
    }

    pub fn apply(&self, p: Point) -> Point {
        Point::new(
            self.a * p.x + self.c * p.y + self.tx,
            self.b * p.x + self.d * p.y + self.ty,
        )
    }

    /// Bounding box of the mapped rectangle
    pub fn map_rect(&self, rect: &Rect) -> Rect {
        let corners = [
            Point::new(rect.min_x(), rect.min_y()),
            Point::new(rect.max_x(), rect.min_y()),
            Point::new(rect.min_x(), rect.max_y()),
            Point::new(rect.max_x(), rect.max_y()),
        ]
        .map(|p| self.apply(p));
        let min_x = corners.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
        let min_y = corners.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
        let max_x = corners.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
        let max_y = corners.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
        Rect::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }

    pub fn approx_eq(&self, other: &Affine, tolerance: f64) -> bool {
        [
            (self.a, other.a),
            (self.b, other.b),
            (self.c, other.c),
            (self.d, other.d),
            (self.tx, other.tx),
            (self.ty, other.ty),
        ]
        .iter()
        .all(|(l, r)| (l - r).abs() <= tolerance)
    }

    /// Row-major 2x3 form `[[a, c, tx], [b, d, ty]]`
    pub fn rows(&self) -> [[f64; 3]; 2] {
        [[self.a, self.c, self.tx], [self.b, self.d, self.ty]]
    }
}

/// Correction applied to mirrored sensor output for `orientation`
///
/// A horizontal flip, preceded by a half turn when the mirrored sensor is
/// inverted relative to up. Applying it twice yields the identity.
pub fn mirror_correction(orientation: Orientation) -> Affine {
    let half_turn = if orientation.mirrored_sensor_inverted() {
        Affine::rotation(PI)
    } else {
        Affine::IDENTITY
    };
    half_turn.then(&Affine::scale(-1.0, 1.0))
}

/// How the image fills the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentFit {
    /// Cover the whole target, cropping overflow
    #[default]
    Fill,
    /// Fit entirely inside the target, letterboxing the remainder
    Contain,
}

impl ContentFit {
    fn raw_scale(&self, target: Size, bounds: Size) -> f64 {
        let sx = target.width / bounds.width;
        let sy = target.height / bounds.height;
        match self {
            ContentFit::Fill => sx.max(sy),
            ContentFit::Contain => sx.min(sy),
        }
    }
}

/// Composed display transform for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Rotation in radians (orientation plus any mirror half turn)
    pub rotation: f64,
    /// Horizontal scale, negative when mirrored
    pub sx: f64,
    pub sy: f64,
    pub tx: f64,
    pub ty: f64,
    /// Scale before quantization
    pub raw_scale: f64,
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            rotation: 0.0,
            sx: 1.0,
            sy: 1.0,
            tx: 0.0,
            ty: 0.0,
            raw_scale: 1.0,
        }
    }

    /// Isotropic scale magnitude
    pub fn scale(&self) -> f64 {
        self.sy.abs()
    }

    pub fn is_mirrored(&self) -> bool {
        self.sx.is_sign_negative()
    }

    /// rotate → flip/scale → translate
    pub fn matrix(&self) -> Affine {
        Affine::rotation(self.rotation)
            .then(&Affine::scale(self.sx, self.sy))
            .then(&Affine::translation(self.tx, self.ty))
    }

    pub fn inverse(&self) -> Option<Affine> {
        self.matrix().inverse()
    }

    pub fn apply(&self, p: Point) -> Point {
        self.matrix().apply(p)
    }

    pub fn map_rect(&self, rect: &Rect) -> Rect {
        self.matrix().map_rect(rect)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Result of [`GeometryCorrector::compute_transform`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correction {
    pub transform: Transform,
    /// The frame must not be presented
    pub skip: bool,
}

impl Correction {
    fn skipped() -> Self {
        Self {
            transform: Transform::identity(),
            skip: true,
        }
    }
}

/// Scale quantum for a screen density
pub fn scale_quantum(density: f64) -> f64 {
    if density >= HIGH_DENSITY_THRESHOLD {
        FINE_SCALE_QUANTUM
    } else {
        COARSE_SCALE_QUANTUM
    }
}

/// Quantizes scales to a density-aware step with hysteresis
///
/// Once a value is chosen, raw scales within one step of the raw scale that
/// produced it reuse it. New values are rounded outward (up for fill, down
/// for contain) past the raw scale plus one step, so every reused value still
/// covers (or still fits) the target.
#[derive(Debug, Clone)]
pub struct ScaleQuantizer {
    step: f64,
    fit: ContentFit,
    anchor: Option<(f64, f64)>,
}

impl ScaleQuantizer {
    pub fn new(density: f64, fit: ContentFit) -> Self {
        Self {
            step: scale_quantum(density),
            fit,
            anchor: None,
        }
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn resolve(&mut self, raw: f64) -> f64 {
        if let Some((anchor, value)) = self.anchor
            && (raw - anchor).abs() < self.step
        {
            return value;
        }

        // Tiny bias so exact multiples are not pushed a whole step
        let value = match self.fit {
            ContentFit::Fill => ((raw + self.step) / self.step - 1e-9).ceil() * self.step,
            ContentFit::Contain => {
                (((raw - self.step) / self.step + 1e-9).floor() * self.step).max(self.step)
            }
        };
        self.anchor = Some((raw, value));
        value
    }

    pub fn reset(&mut self) {
        self.anchor = None;
    }
}

/// Computes the per-frame display transform
#[derive(Debug, Clone)]
pub struct GeometryCorrector {
    fit: ContentFit,
    density: f64,
    quantizer: ScaleQuantizer,
}

impl GeometryCorrector {
    pub fn new(fit: ContentFit, density: f64) -> Self {
        Self {
            fit,
            density,
            quantizer: ScaleQuantizer::new(density, fit),
        }
    }

    /// Update the screen density; a change restarts quantization
    pub fn set_density(&mut self, density: f64) {
        if density != self.density {
            self.density = density;
            self.quantizer = ScaleQuantizer::new(density, self.fit);
        }
    }

    pub fn compute_transform(
        &mut self,
        extent: Rect,
        target: Size,
        orientation: Orientation,
        is_mirrored: bool,
    ) -> Correction {
        if extent.is_degenerate() || target.is_empty() {
            return Correction::skipped();
        }

        let mut rotation = orientation.rotation_radians();
        let flip = if is_mirrored {
            if orientation.mirrored_sensor_inverted() {
                rotation += PI;
            }
            -1.0
        } else {
            1.0
        };

        let oriented = Affine::rotation(rotation).then(&Affine::scale(flip, 1.0));
        let bounds = oriented.map_rect(&extent);
        let raw_scale = self.fit.raw_scale(target, bounds.size);
        if !raw_scale.is_finite() || raw_scale <= 0.0 {
            return Correction::skipped();
        }
        let scale = self.quantizer.resolve(raw_scale);

        let tx = -bounds.origin.x * scale + (target.width - bounds.size.width * scale) / 2.0;
        let ty = -bounds.origin.y * scale + (target.height - bounds.size.height * scale) / 2.0;

        Correction {
            transform: Transform {
                rotation,
                sx: flip * scale,
                sy: scale,
                tx,
                ty,
                raw_scale,
            },
            skip: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_snaps_quarter_turns() {
        let r = Affine::rotation(-std::f64::consts::FRAC_PI_2);
        assert_eq!((r.a, r.b, r.c, r.d), (0.0, -1.0, 1.0, 0.0));
    }

    #[test]
    fn test_inverse_round_trips_points() {
        let m = Affine::rotation(0.3)
            .then(&Affine::scale(-2.0, 2.0))
            .then(&Affine::translation(5.0, -7.0));
        let inv = m.inverse().unwrap();
        let p = Point::new(12.5, -3.0);
        let q = inv.apply(m.apply(p));
        assert!((p.x - q.x).abs() < 1e-9 && (p.y - q.y).abs() < 1e-9);
        assert!(Affine::scale(0.0, 1.0).inverse().is_none());
    }

    #[test]
    fn test_portrait_swaps_bounds() {
        let mut corrector = GeometryCorrector::new(ContentFit::Fill, 1.0);
        let extent = Rect::new(0.0, 0.0, 640.0, 480.0);
        let target = Size::new(480.0, 640.0);
        let correction = corrector.compute_transform(extent, target, Orientation::Portrait, false);
        assert!(!correction.skip);
        assert!((correction.transform.raw_scale - 1.0).abs() < 1e-12);
        let mapped = correction.transform.map_rect(&extent);
        assert!(mapped.covers(&Rect::new(0.0, 0.0, 480.0, 640.0)));
    }

    #[test]
    fn test_contain_fits_inside() {
        let mut corrector = GeometryCorrector::new(ContentFit::Contain, 1.0);
        let extent = Rect::new(0.0, 0.0, 200.0, 100.0);
        let target = Size::new(300.0, 300.0);
        let correction =
            corrector.compute_transform(extent, target, Orientation::LandscapeRight, false);
        let mapped = correction.transform.map_rect(&extent);
        assert!(Rect::new(0.0, 0.0, 300.0, 300.0).covers(&mapped));
        assert!(mapped.size.width > 290.0);
    }

    #[test]
    fn test_quantum_by_density() {
        assert_eq!(scale_quantum(1.0), COARSE_SCALE_QUANTUM);
        assert_eq!(scale_quantum(2.0), FINE_SCALE_QUANTUM);
        assert_eq!(scale_quantum(3.0), FINE_SCALE_QUANTUM);
    }

    #[test]
    fn test_density_change_restarts_quantizer() {
        let mut corrector = GeometryCorrector::new(ContentFit::Fill, 1.0);
        let extent = Rect::new(0.0, 0.0, 100.0, 100.0);
        let a = corrector.compute_transform(extent, Size::new(150.0, 150.0), Orientation::LandscapeRight, false);
        corrector.set_density(2.0);
        let b = corrector.compute_transform(extent, Size::new(150.0, 150.0), Orientation::LandscapeRight, false);
        assert!(a.transform.scale() >= 1.5);
        assert!(b.transform.scale() >= 1.5);
        assert!(b.transform.scale() <= a.transform.scale());
    }
}
