//! Common functionality for object detection.
//!
//! This module covers the model-independent half of SSD-style detection: decoding raw regressor
//! and score tensors against a precomputed anchor grid ([`decode_boxes`]) and deduplicating the
//! resulting candidates ([`nms`]). The palm-specific region construction on top of this lives in
//! [`crate::hand::detection`].

pub mod nms;
pub mod ssd;

use crate::image::Resolution;
use crate::iter::zip_exact;
use crate::nn::Tensor;
use crate::num::sigmoid;
use crate::rect::RotatedRect;

use self::ssd::Anchors;

/// A 2D keypoint decoded alongside a detection box.
///
/// Keypoints use the same normalized coordinate system as the anchor grid. The palm detector emits
/// keypoints only to derive the region orientation, not as landmarks of their own.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
}

/// A candidate detection decoded from one anchor, before suppression.
///
/// All coordinates are normalized to the square network input.
#[derive(Debug, Clone, Copy)]
pub struct RawDetection {
    /// Post-sigmoid confidence.
    pub score: f32,
    pub x_center: f32,
    pub y_center: f32,
    /// Side length of the square detection box.
    pub box_size: f32,
    /// First orientation keypoint (palm center for the reference model).
    pub keypoint0: Keypoint,
    /// Third orientation keypoint (middle finger base for the reference model).
    pub keypoint2: Keypoint,
}

/// Decodes an SSD regressor/score tensor pair into candidate detections.
///
/// `raw_boxes` must have shape `[1, N, 18]` and `raw_scores` shape `[1, N, 1]`, where `N` is the
/// anchor count. Each regressor row holds 9 coordinate pairs that decode as
/// `value · anchorSize / model_scale + anchorCenter`. The row layout is a fixed contract with the
/// reference detection model: pair 0 is the box center, pair 1 references the box extent, pairs 2
/// and 4 are the keypoints used for orientation. Candidates at or below `score_threshold` and
/// candidates with a non-positive box size are dropped.
pub fn decode_boxes(
    raw_boxes: &Tensor,
    raw_scores: &Tensor,
    anchors: &Anchors,
    score_threshold: f32,
    model_scale: f32,
) -> Vec<RawDetection> {
    let num_anchors = anchors.anchor_count();
    assert_eq!(raw_boxes.shape(), &[1, num_anchors, 18]);
    assert_eq!(raw_scores.shape(), &[1, num_anchors, 1]);

    let mut detections = Vec::new();
    for (index, (logit, anchor)) in
        zip_exact(raw_scores.as_slice(), anchors.iter()).enumerate()
    {
        let score = sigmoid(*logit);
        if score <= score_threshold {
            continue;
        }

        let row = raw_boxes.row(index);
        let decode = |pair: usize| Keypoint {
            x: row[pair * 2] * anchor.width() / model_scale + anchor.x_center(),
            y: row[pair * 2 + 1] * anchor.height() / model_scale + anchor.y_center(),
        };

        let center = decode(0);
        let extent = decode(1);
        let w = extent.x - anchor.x_center();
        let h = extent.y - anchor.y_center();
        let box_size = w.max(h);
        if box_size <= 0.0 {
            continue;
        }

        detections.push(RawDetection {
            score,
            x_center: center.x,
            y_center: center.y,
            box_size,
            keypoint0: decode(2),
            keypoint2: decode(4),
        });
    }

    detections
}

/// An oriented square detection region in normalized image coordinates.
///
/// `x_center` is normalized to the image width and `y_center` to the image height, while `size` is
/// normalized to the *longer* image dimension. That asymmetry comes from the letterboxing applied
/// before detection: the square's side is measured in units of the padded square, but the center
/// has had the padding removed per axis.
#[derive(Debug, Clone, Copy)]
pub struct OrientedRegion {
    pub x_center: f32,
    pub y_center: f32,
    pub size: f32,
    /// Rotation in radians, normalized into `[-π, π)`.
    pub rotation: f32,
    pub score: f32,
}

impl OrientedRegion {
    /// Returns the region's center in pixel coordinates.
    pub fn pixel_center(&self, res: Resolution) -> (f32, f32) {
        (
            self.x_center * res.width() as f32,
            self.y_center * res.height() as f32,
        )
    }

    /// Converts the region to a pixel-space rotated square for cropping.
    pub fn rotated_rect(&self, res: Resolution) -> RotatedRect {
        let (cx, cy) = self.pixel_center(res);
        let size = self.size * res.width().max(res.height()) as f32;
        RotatedRect::new(cx, cy, size, self.rotation)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use crate::detection::ssd::{Anchor, Anchors};

    use super::*;

    fn single_anchor() -> Anchors {
        Anchors::from_anchors(vec![Anchor::new(0.5, 0.5, 1.0, 1.0)])
    }

    fn boxes(row: [f32; 18]) -> Tensor {
        Tensor::new([1, 1, 18], row.to_vec())
    }

    #[test]
    fn score_threshold_is_exclusive() {
        let anchors = single_anchor();
        let raw = boxes([0.0; 18]);
        // sigmoid(0) == 0.5, which is not *above* the threshold
        let scores = Tensor::new([1, 1, 1], vec![0.0]);
        assert!(decode_boxes(&raw, &scores, &anchors, 0.5, 192.0).is_empty());
    }

    #[test]
    fn decodes_relative_to_anchor() {
        let anchors = single_anchor();
        let mut row = [0.0; 18];
        row[0] = 19.2; // center x offset: 0.1 after scaling
        row[1] = -19.2;
        row[2] = 19.2; // extent pair: box size 0.1
        row[3] = 9.6;
        row[8] = 38.4; // keypoint2
        let raw = boxes(row);
        let scores = Tensor::new([1, 1, 1], vec![10.0]);

        let dets = decode_boxes(&raw, &scores, &anchors, 0.5, 192.0);
        assert_eq!(dets.len(), 1);
        let det = &dets[0];
        assert!(det.score > 0.99);
        assert_relative_eq!(det.x_center, 0.6, epsilon = 1e-6);
        assert_relative_eq!(det.y_center, 0.4, epsilon = 1e-6);
        // max of the two extent axes
        assert_relative_eq!(det.box_size, 0.1, epsilon = 1e-6);
        assert_relative_eq!(det.keypoint0.x, 0.5, epsilon = 1e-6);
        assert_relative_eq!(det.keypoint2.x, 0.7, epsilon = 1e-6);
    }

    #[test]
    fn non_positive_box_size_is_dropped() {
        let anchors = single_anchor();
        let mut row = [0.0; 18];
        row[2] = -19.2;
        row[3] = -9.6;
        let raw = boxes(row);
        let scores = Tensor::new([1, 1, 1], vec![10.0]);
        assert!(decode_boxes(&raw, &scores, &anchors, 0.5, 192.0).is_empty());
    }

    #[test]
    fn region_pixel_mapping() {
        let region = OrientedRegion {
            x_center: 0.5,
            y_center: 0.25,
            size: 0.5,
            rotation: 0.0,
            score: 1.0,
        };
        let res = Resolution::new(100, 200);
        assert_eq!(region.pixel_center(res), (50.0, 50.0));
        // size is normalized to the longer dimension
        assert_eq!(region.rotated_rect(res).size(), 100.0);
    }
}
