//! Non-Maximum Suppression.
//!
//! SSD detectors produce clusters of near-duplicate candidates for every real object. This module
//! removes the duplicates with a greedy sweep: the highest-confidence candidate is kept, and every
//! remaining candidate whose center lies within a fixed *pixel* distance of it is discarded.
//!
//! The distance metric is deliberately not IoU-based. The reference postprocessing thresholds on
//! Euclidean center distance in pixel space, and changing the metric changes which hands survive
//! in multi-hand scenes.

use crate::image::Resolution;
use crate::num::TotalF32;

use super::OrientedRegion;

/// A non-maximum suppression algorithm keyed on center distance.
pub struct NonMaxSuppression {
    min_distance: f32,
    out_buf: Vec<OrientedRegion>,
}

impl NonMaxSuppression {
    /// The default minimum pixel distance between the centers of two distinct detections.
    pub const DEFAULT_MIN_DISTANCE: f32 = 200.0;

    pub fn new() -> Self {
        Self {
            min_distance: Self::DEFAULT_MIN_DISTANCE,
            out_buf: Vec::new(),
        }
    }

    /// Sets the center distance below which two detections are considered duplicates.
    pub fn set_min_distance(&mut self, distance: f32) {
        self.min_distance = distance;
    }

    /// Performs non-maximum suppression on `regions`.
    ///
    /// `regions` will be drained in the process. The surviving regions are yielded in descending
    /// confidence order. `resolution` is required because the suppression distance is measured in
    /// pixels of the source image, not in normalized units.
    pub fn process(
        &mut self,
        regions: &mut Vec<OrientedRegion>,
        resolution: Resolution,
    ) -> impl Iterator<Item = OrientedRegion> + '_ {
        self.out_buf.clear();

        // Sort by ascending confidence, process highest confidence first by starting at the back.
        regions.sort_unstable_by_key(|region| TotalF32(region.score));

        while let Some(seed) = regions.pop() {
            let (seed_x, seed_y) = seed.pixel_center(resolution);
            regions.retain(|other| {
                let (x, y) = other.pixel_center(resolution);
                let dist = ((x - seed_x).powi(2) + (y - seed_y).powi(2)).sqrt();
                dist >= self.min_distance
            });
            self.out_buf.push(seed);
        }

        self.out_buf.drain(..)
    }
}

impl Default for NonMaxSuppression {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(x_px: f32, y_px: f32, score: f32) -> OrientedRegion {
        // Normalized against the 1000×1000 test resolution used below.
        OrientedRegion {
            x_center: x_px / 1000.0,
            y_center: y_px / 1000.0,
            size: 0.1,
            rotation: 0.0,
            score,
        }
    }

    #[test]
    fn close_pair_keeps_higher_score() {
        let mut nms = NonMaxSuppression::new();
        // 150 px apart: duplicates
        let mut regions = vec![region(100.0, 100.0, 0.7), region(250.0, 100.0, 0.9)];
        let out = nms
            .process(&mut regions, Resolution::new(1000, 1000))
            .collect::<Vec<_>>();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].score, 0.9);
    }

    #[test]
    fn distant_pair_survives() {
        let mut nms = NonMaxSuppression::new();
        // 250 px apart: distinct hands
        let mut regions = vec![region(100.0, 100.0, 0.7), region(350.0, 100.0, 0.9)];
        let out = nms
            .process(&mut regions, Resolution::new(1000, 1000))
            .collect::<Vec<_>>();
        assert_eq!(out.len(), 2);
        // descending score order
        assert_eq!(out[0].score, 0.9);
        assert_eq!(out[1].score, 0.7);
    }

    #[test]
    fn chain_is_suppressed_greedily() {
        let mut nms = NonMaxSuppression::new();
        // B is close to both A and C; A and C are far apart. The sweep keeps A (highest),
        // drops B, then keeps C.
        let mut regions = vec![
            region(100.0, 100.0, 0.9), // A
            region(250.0, 100.0, 0.8), // B
            region(400.0, 100.0, 0.7), // C
        ];
        let out = nms
            .process(&mut regions, Resolution::new(1000, 1000))
            .collect::<Vec<_>>();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].score, 0.9);
        assert_eq!(out[1].score, 0.7);
    }

    #[test]
    fn empty_input() {
        let mut nms = NonMaxSuppression::new();
        let mut regions = Vec::new();
        assert_eq!(
            nms.process(&mut regions, Resolution::new(64, 64)).count(),
            0
        );
    }
}
