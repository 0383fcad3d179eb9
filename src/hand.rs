//! Hand detection and landmark extraction.
//!
//! The [`pipeline`] module ties the two stages together: [`detection`] finds oriented palm
//! regions in the full image, [`landmark`] extracts 21 keypoints and a handedness label from a
//! rotated crop of each region.

pub mod detection;
pub mod landmark;
pub mod pipeline;

pub use landmark::{Handedness, Landmark, LandmarkIdx};
pub use pipeline::{DetectionMode, DetectorConfig, HandDetector, HandResult};
