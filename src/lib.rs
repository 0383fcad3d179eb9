//! Two-stage neural network hand detection.
//!
//! The pipeline runs a palm detection network over the full input image to find oriented hand
//! regions, then crops and rotates each region and runs a landmark network on it to extract 21
//! 3D keypoints and a handedness label per hand.
//!
//! The neural networks themselves are *not* part of this crate. They are consumed through the
//! [`nn::InferenceEngine`] seam as batched tensor-in/tensor-out functions, so any runtime that can
//! execute the reference palm detection and hand landmark models can be plugged in.
//!
//! # Coordinates
//!
//! Image coordinates have X pointing right and Y pointing *down*, with the origin in the top left
//! corner. Landmark Z values are relative depth as output by the landmark network and are not
//! rescaled.

use log::LevelFilter;

pub mod detection;
pub mod hand;
pub mod image;
pub mod iter;
pub mod nn;
pub mod num;
pub mod rect;
pub mod timer;
pub mod worker;

/// Errors reported by the detection pipeline.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The detector was used before [`initialize`][hand::pipeline::HandDetector::initialize] was
    /// called, or after it was disposed.
    #[error("detector is not initialized")]
    NotInitialized,

    /// A configuration value is outside its valid range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The SSD anchor configuration cannot produce a usable anchor set.
    #[error("invalid anchor configuration: {0}")]
    AnchorConfig(String),

    /// An inference engine handle could not be created or failed fatally.
    #[error(transparent)]
    Engine(#[from] nn::EngineError),

    /// A worker thread for the landmark handle pool could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = if cfg!(debug_assertions) {
        LevelFilter::Trace
    } else {
        LevelFilter::Debug
    };
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_PKG_NAME")), log_level)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// If `cfg!(debug_assertions)` is enabled, the calling crate and this library will log at *trace*
/// level. Otherwise, they will log at *debug* level.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
