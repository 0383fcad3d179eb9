//! Palm detection.
//!
//! Stage 1 of the pipeline. The palm detection network sees the full image letterboxed into a
//! 192×192 square and outputs one regressor row per anchor of a fixed 2016-anchor SSD grid. This
//! module turns those raw outputs into [`OrientedRegion`]s in the source image's normalized
//! coordinates, ready for cropping.

use std::f32::consts::FRAC_PI_2;

use crate::detection::ssd::{AnchorConfig, Anchors};
use crate::detection::{decode_boxes, OrientedRegion, RawDetection};
use crate::image::Resolution;
use crate::nn::Outputs;
use crate::num::normalize_radians;

/// Side length of the square detection network input, in pixels.
pub const INPUT_SIZE: u32 = 192;

/// Number of anchors (and output rows) of the detection network.
pub const NUM_ANCHORS: usize = 2016;

/// Ratio between the side of the extracted hand region and the detected palm box.
///
/// The palm box covers only the palm; the region handed to the landmark network must contain the
/// whole hand including extended fingers. The factor is part of the reference model's
/// postprocessing contract and must not be re-derived.
const REGION_EXPANSION: f32 = 2.9;

/// Returns the anchor grid configuration of the palm detection network.
///
/// The resulting grid has exactly [`NUM_ANCHORS`] anchors, matching the network's output rows.
pub fn anchor_config() -> AnchorConfig {
    AnchorConfig {
        strides: vec![8, 16, 16, 16],
        min_scale: 0.1484375,
        max_scale: 0.75,
        input_width: INPUT_SIZE,
        input_height: INPUT_SIZE,
        anchor_offset_x: 0.5,
        anchor_offset_y: 0.5,
        aspect_ratios: vec![1.0],
        reduce_boxes_in_lowest_layer: false,
        interpolated_scale_aspect_ratio: 1.0,
        fixed_anchor_size: true,
    }
}

/// Extracts all palm regions with confidence above `threshold` from the detection network's
/// outputs.
///
/// `image_res` is the resolution of the *original* image the letterboxed network input was
/// computed from; it is needed to undo the letterbox padding on the region centers.
pub fn extract_regions(
    outputs: &Outputs,
    anchors: &Anchors,
    threshold: f32,
    image_res: Resolution,
) -> Vec<OrientedRegion> {
    let boxes = &outputs[0];
    let scores = &outputs[1];
    assert_eq!(boxes.shape(), &[1, NUM_ANCHORS, 18]);
    assert_eq!(scores.shape(), &[1, NUM_ANCHORS, 1]);

    decode_boxes(boxes, scores, anchors, threshold, INPUT_SIZE as f32)
        .iter()
        .map(|det| region_from_detection(det, image_res))
        .collect()
}

/// Builds an oriented hand region from a decoded palm detection.
fn region_from_detection(det: &RawDetection, image_res: Resolution) -> OrientedRegion {
    let (kp0, kp2) = (det.keypoint0, det.keypoint2);
    let rotation = normalize_radians(FRAC_PI_2 - f32::atan2(-(kp2.y - kp0.y), kp2.x - kp0.x));

    // Shift the region center along the rotated hand axis by half the palm box, so the region
    // covers the fingers and not just the palm.
    let mut x_center = det.x_center + 0.5 * det.box_size * rotation.sin();
    let mut y_center = det.y_center - 0.5 * det.box_size * rotation.cos();

    // Detection ran on a letterboxed square; remove the padding from the shorter axis so the
    // center is normalized against the actual image dimension on both axes.
    let (w, h) = (image_res.width() as f32, image_res.height() as f32);
    let square = w.max(h);
    let pad_half = (h - w).abs() * 0.5;
    if h > w {
        x_center = (x_center * square - pad_half) / w;
    } else {
        y_center = (y_center * square - pad_half) / h;
    }

    OrientedRegion {
        x_center,
        y_center,
        size: det.box_size * REGION_EXPANSION,
        rotation,
        score: det.score,
    }
}
