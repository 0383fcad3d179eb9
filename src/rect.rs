//! Axis-aligned and rotated rectangles.

use nalgebra::{Point2, Rotation2, Vector2};

/// An axis-aligned rectangle in pixel coordinates.
///
/// Rectangles are allowed to have zero width and/or height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    x: f32,
    y: f32,
    w: f32,
    h: f32,
}

impl Rect {
    /// Creates a rectangle extending outwards from a center point.
    pub fn from_center(x_center: f32, y_center: f32, width: f32, height: f32) -> Self {
        Self {
            x: x_center - width * 0.5,
            y: y_center - height * 0.5,
            w: width,
            h: height,
        }
    }

    /// Creates a rectangle extending downwards and right from a point.
    pub fn from_top_left(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            w: width,
            h: height,
        }
    }

    /// Computes the axis-aligned bounding rectangle that encompasses `points`.
    ///
    /// Returns `None` if `points` is an empty iterator.
    pub fn bounding<I: IntoIterator<Item = Point2<f32>>>(points: I) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let (mut min, mut max) = (first, first);
        for p in iter {
            min = Point2::new(min.x.min(p.x), min.y.min(p.y));
            max = Point2::new(max.x.max(p.x), max.y.max(p.y));
        }
        Some(Self {
            x: min.x,
            y: min.y,
            w: max.x - min.x,
            h: max.y - min.y,
        })
    }

    /// Clamps this rectangle so that it lies entirely within `0..=width` / `0..=height`.
    #[must_use]
    pub fn clamp_to(&self, width: f32, height: f32) -> Self {
        let x0 = self.x.clamp(0.0, width);
        let y0 = self.y.clamp(0.0, height);
        let x1 = (self.x + self.w).clamp(0.0, width);
        let y1 = (self.y + self.h).clamp(0.0, height);
        Self {
            x: x0,
            y: y0,
            w: x1 - x0,
            h: y1 - y0,
        }
    }

    #[inline]
    pub fn x(&self) -> f32 {
        self.x
    }

    #[inline]
    pub fn y(&self) -> f32 {
        self.y
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.w
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.h
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.w * 0.5, self.y + self.h * 0.5)
    }
}

/// A square region with a rotation, in pixel coordinates.
///
/// This is the shape a detected palm region takes after rotation alignment: a square of side
/// [`size`][Self::size] centered on [`center`][Self::center], rotated by
/// [`rotation_radians`][Self::rotation_radians] around its center.
///
/// The rectangle defines a *crop coordinate system*: the square's content, un-rotated, with the
/// origin in the top-left corner and both axes running from `0.0` to `size`. The landmark network
/// operates in that system, [`RotatedRect::map_crop_point`] maps its outputs back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatedRect {
    cx: f32,
    cy: f32,
    size: f32,
    radians: f32,
}

impl RotatedRect {
    /// Creates a new rotated square from its center, side length and rotation.
    pub fn new(cx: f32, cy: f32, size: f32, radians: f32) -> Self {
        Self {
            cx,
            cy,
            size,
            radians,
        }
    }

    /// Returns the pixel coordinates of the square's center.
    #[inline]
    pub fn center(&self) -> (f32, f32) {
        (self.cx, self.cy)
    }

    /// Returns the side length of the square in pixels.
    #[inline]
    pub fn size(&self) -> f32 {
        self.size
    }

    /// Returns the square's rotation in radians.
    #[inline]
    pub fn rotation_radians(&self) -> f32 {
        self.radians
    }

    /// Maps a point from crop coordinates to image coordinates.
    ///
    /// `crop_w`/`crop_h` are the dimensions of the crop buffer the point was measured in. The
    /// point is translated so it is relative to the crop's center, rotated by the *negated*
    /// rotation, and translated to the square's center in the image.
    ///
    /// The rotated-crop sampling in [`crate::image::Image::rotated_crop`] uses this exact
    /// transform, which is what makes forward cropping and inverse landmark mapping agree.
    pub fn map_crop_point(&self, x: f32, y: f32, crop_w: f32, crop_h: f32) -> Point2<f32> {
        let rel = Vector2::new(x - crop_w * 0.5, y - crop_h * 0.5);
        let rotated = Rotation2::new(-self.radians) * rel;
        Point2::new(self.cx + rotated.x, self.cy + rotated.y)
    }

    /// Returns the image-space positions of the square's four corners.
    pub fn corners(&self) -> [Point2<f32>; 4] {
        let s = self.size;
        [
            self.map_crop_point(0.0, 0.0, s, s),
            self.map_crop_point(s, 0.0, s, s),
            self.map_crop_point(s, s, s, s),
            self.map_crop_point(0.0, s, s, s),
        ]
    }

    /// Computes the axis-aligned bounding rectangle of the rotated square.
    pub fn bounding_rect(&self) -> Rect {
        Rect::bounding(self.corners()).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use std::f32::consts::{FRAC_PI_2, FRAC_PI_6, PI};

    use super::*;

    #[test]
    fn crop_center_maps_to_region_center() {
        for rot in [0.0, FRAC_PI_6, FRAC_PI_2, PI] {
            let rect = RotatedRect::new(123.0, 77.5, 64.0, rot);
            let p = rect.map_crop_point(32.0, 32.0, 64.0, 64.0);
            assert_relative_eq!(p.x, 123.0, epsilon = 1e-3);
            assert_relative_eq!(p.y, 77.5, epsilon = 1e-3);
        }
    }

    #[test]
    fn unrotated_crop_mapping_is_translation() {
        let rect = RotatedRect::new(100.0, 200.0, 50.0, 0.0);
        let p = rect.map_crop_point(0.0, 0.0, 50.0, 50.0);
        assert_relative_eq!(p.x, 75.0, epsilon = 1e-4);
        assert_relative_eq!(p.y, 175.0, epsilon = 1e-4);
    }

    #[test]
    fn half_turn_flips_offsets() {
        let rect = RotatedRect::new(0.0, 0.0, 10.0, PI);
        let p = rect.map_crop_point(10.0, 5.0, 10.0, 10.0);
        assert_relative_eq!(p.x, -5.0, epsilon = 1e-4);
        assert_relative_eq!(p.y, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn bounding_rect_of_unrotated_square() {
        let rect = RotatedRect::new(50.0, 50.0, 20.0, 0.0);
        let bounds = rect.bounding_rect();
        assert_relative_eq!(bounds.x(), 40.0, epsilon = 1e-4);
        assert_relative_eq!(bounds.y(), 40.0, epsilon = 1e-4);
        assert_relative_eq!(bounds.width(), 20.0, epsilon = 1e-4);
        assert_relative_eq!(bounds.height(), 20.0, epsilon = 1e-4);
    }

    #[test]
    fn bounding_rect_grows_under_rotation() {
        // A square rotated by 45° has a bounding box √2 times as large.
        let rect = RotatedRect::new(0.0, 0.0, 10.0, PI / 4.0);
        let bounds = rect.bounding_rect();
        assert_relative_eq!(bounds.width(), 10.0 * 2.0_f32.sqrt(), epsilon = 1e-3);
        assert_relative_eq!(bounds.height(), 10.0 * 2.0_f32.sqrt(), epsilon = 1e-3);
    }

    #[test]
    fn rect_clamp() {
        let r = Rect::from_top_left(-10.0, 5.0, 30.0, 30.0).clamp_to(25.0, 25.0);
        assert_eq!(r, Rect::from_top_left(0.0, 5.0, 20.0, 20.0));
    }
}
