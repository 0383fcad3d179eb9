//! Utilities for numerics.

use std::cmp::Ordering;
use std::f32::consts::{PI, TAU};

/// The logistic sigmoid function.
///
/// Maps raw network logits to a confidence value in range 0.0 to 1.0.
#[inline]
pub fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

/// Normalizes an angle in radians into the half-open interval `[-π, π)`.
///
/// This is the normalization the palm detector applies to region rotations, so decoded rotation
/// keypoints that end up more than a half turn apart still produce equivalent crops.
#[inline]
pub fn normalize_radians(angle: f32) -> f32 {
    angle - TAU * ((angle + PI) / TAU).floor()
}

/// An `f32` that implements [`Ord`] according to the IEEE 754 totalOrder predicate.
///
/// Used as a sort key for detection confidences, which never contain NaNs but still don't get an
/// `Ord` impl from the standard library.
#[derive(Clone, Copy)]
pub struct TotalF32(pub f32);

impl PartialEq for TotalF32 {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for TotalF32 {}

impl PartialOrd for TotalF32 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TotalF32 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn sigmoid_midpoint() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(10.0) > 0.99);
        assert!(sigmoid(-10.0) < 0.01);
    }

    #[test]
    fn normalize_range() {
        for angle in [-10.0_f32, -PI, -1.0, 0.0, 1.0, PI, 4.0, 10.0, 100.0] {
            let n = normalize_radians(angle);
            assert!(n >= -PI && n < PI, "normalize({angle}) = {n}");
        }
    }

    #[test]
    fn normalize_is_idempotent() {
        for angle in [-7.5_f32, -PI, 0.0, 2.0, 4.0, 9.42] {
            let once = normalize_radians(angle);
            assert_eq!(normalize_radians(once), once);
        }
    }

    #[test]
    fn normalize_wraps_full_turns() {
        assert_relative_eq!(normalize_radians(4.0), 4.0 - TAU, epsilon = 1e-6);
        assert_relative_eq!(normalize_radians(TAU), 0.0, epsilon = 1e-6);
        // The interval is closed at -π and open at π.
        assert_relative_eq!(normalize_radians(PI), -PI, epsilon = 1e-6);
        assert_relative_eq!(normalize_radians(-PI), -PI, epsilon = 1e-6);
    }

    #[test]
    fn normalize_random_angles() {
        for _ in 0..1000 {
            let angle = (fastrand::f32() - 0.5) * 100.0;
            let n = normalize_radians(angle);
            assert!(n >= -PI && n < PI, "normalize({angle}) = {n}");
            // The input is only ever changed by a whole number of turns.
            let turns = (angle - n) / TAU;
            assert_relative_eq!(turns.round(), turns, epsilon = 1e-3);
        }
    }

    #[test]
    fn total_ordering() {
        let mut v = [TotalF32(1.0), TotalF32(-2.0), TotalF32(0.5)];
        v.sort();
        assert_eq!(v.map(|t| t.0), [-2.0, 0.5, 1.0]);
    }
}
