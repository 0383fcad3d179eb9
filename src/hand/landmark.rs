//! Hand landmark extraction.
//!
//! Stage 2 of the pipeline. The landmark network sees a rotated hand crop resized into a 224×224
//! square and outputs 21 3D keypoints, a presence score and a handedness logit. This module maps
//! the raw outputs into the crop's pixel coordinate system; mapping onwards into the source image
//! is done by the caller via [`crate::rect::RotatedRect::map_crop_point`].

use crate::image::Letterbox;
use crate::iter::zip_exact;
use crate::nn::Outputs;
use crate::num::sigmoid;

/// Side length of the square landmark network input, in pixels.
pub const INPUT_SIZE: u32 = 224;

/// Number of landmarks output by the network.
pub const NUM_LANDMARKS: usize = 21;

/// Which hand a detection belongs to, from the perspective of the depicted person.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handedness {
    Left,
    Right,
}

/// A single hand keypoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    /// Relative depth. Not rescaled by any of the coordinate transforms.
    pub z: f32,
    /// Detection confidence of this landmark.
    ///
    /// The landmark network has no per-point confidence output, so every landmark carries the
    /// shared hand presence score.
    pub visibility: f32,
}

/// Names for the hand pose landmarks, usable as indices into a landmark list.
///
/// # Terminology
///
/// - **CMC**: Carpometacarpal joint, the lowest joint of the thumb, located near the wrist.
/// - **MCP**: Metacarpophalangeal joint, the lower joint forming the knuckles near the palm.
/// - **PIP**: Proximal Interphalangeal joint, the joint between the MCP and DIP.
/// - **DIP**: Distal Interphalangeal joint, the highest joint of a finger.
/// - **Tip**: placed on the tip of the finger, above the DIP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkIdx {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexFingerMcp,
    IndexFingerPip,
    IndexFingerDip,
    IndexFingerTip,
    MiddleFingerMcp,
    MiddleFingerPip,
    MiddleFingerDip,
    MiddleFingerTip,
    RingFingerMcp,
    RingFingerPip,
    RingFingerDip,
    RingFingerTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

/// Landmark results for one hand crop, in crop pixel coordinates.
#[derive(Debug, Clone)]
pub struct LandmarkResult {
    landmarks: Vec<Landmark>,
    score: f32,
    handedness: Handedness,
}

impl LandmarkResult {
    /// Returns the landmark positions in the crop's coordinate system.
    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }

    /// Returns the confidence that the crop contains a proper hand, between 0.0 and 1.0.
    pub fn score(&self) -> f32 {
        self.score
    }

    /// Returns the estimated handedness.
    ///
    /// Only meaningful when [`score`][Self::score] is above some threshold, and assumes the
    /// camera image was not mirrored.
    pub fn handedness(&self) -> Handedness {
        self.handedness
    }
}

/// Parses the landmark network's outputs for one crop.
///
/// `letterbox` describes how the crop was fitted into the network's square input, and is used to
/// map the raw coordinates back into crop pixels.
pub fn parse_outputs(outputs: &Outputs, letterbox: &Letterbox) -> LandmarkResult {
    let screen_landmarks = &outputs[0];
    let presence = &outputs[1];
    let handedness = &outputs[2];
    let world_landmarks = &outputs[3];

    assert_eq!(screen_landmarks.shape(), &[1, NUM_LANDMARKS * 3]);
    assert_eq!(presence.shape(), &[1, 1]);
    assert_eq!(handedness.shape(), &[1, 1]);
    assert_eq!(world_landmarks.shape(), &[1, NUM_LANDMARKS * 3]);

    let score = sigmoid(presence.as_slice()[0]);
    let handedness = if sigmoid(handedness.as_slice()[0]) > 0.5 {
        Handedness::Right
    } else {
        Handedness::Left
    };

    let input = INPUT_SIZE as f32;
    let mut landmarks = Vec::with_capacity(NUM_LANDMARKS);
    for (chunk, _) in zip_exact(screen_landmarks.as_slice().chunks(3), 0..NUM_LANDMARKS) {
        let [x, y, z] = [chunk[0], chunk[1], chunk[2]];
        // Normalize to the network input square, then undo the crop letterbox per axis. The
        // normalize/denormalize pair cancels algebraically, but the reference postprocessing
        // evaluates it in this order; keeping the same operation order keeps the floating point
        // results identical.
        let x = ((x / input) * input - letterbox.pad_x) / letterbox.scale_x;
        let y = ((y / input) * input - letterbox.pad_y) / letterbox.scale_y;
        landmarks.push(Landmark {
            x,
            y,
            z,
            visibility: score,
        });
    }

    LandmarkResult {
        landmarks,
        score,
        handedness,
    }
}
