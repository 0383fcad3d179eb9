//! The two-stage detection pipeline.
//!
//! [`HandDetector`] owns all per-instance state: the stage-1 engine handle, the anchor grid, and
//! a pool of worker threads each owning one stage-2 engine handle. Detection runs stage 1 on the
//! calling thread, then fans the per-hand crops out over the pool and collects the results.

use crate::detection::nms::NonMaxSuppression;
use crate::detection::ssd::Anchors;
use crate::detection::OrientedRegion;
use crate::hand::detection as palm;
use crate::hand::landmark::{self, Handedness, Landmark, LandmarkIdx, LandmarkResult};
use crate::image::{Image, Resolution};
use crate::nn::{EngineError, EngineFactory, InferenceEngine, ModelKind};
use crate::rect::{Rect, RotatedRect};
use crate::timer::Timer;
use crate::worker::{promise, Promise, PromiseHandle, Worker};
use crate::Error;

/// Whether to run the landmark stage at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionMode {
    /// Only run palm detection; results carry bounding boxes but no landmarks.
    BoxesOnly,
    /// Run the full two-stage pipeline.
    BoxesAndLandmarks,
}

/// Configuration of a [`HandDetector`].
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub mode: DetectionMode,
    /// Minimum palm detection confidence. Candidates at or below this are discarded.
    pub score_threshold: f32,
    /// Maximum number of hands returned per image. Lower-confidence extras are silently dropped.
    pub max_detections: usize,
    /// Minimum landmark stage confidence. Hands below this are excluded from the results.
    pub min_landmark_score: f32,
    /// Number of stage-2 engine handles to run concurrently. Valid range is 1 to 10.
    pub handle_pool_size: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            mode: DetectionMode::BoxesAndLandmarks,
            score_threshold: 0.6,
            max_detections: 10,
            min_landmark_score: 0.5,
            handle_pool_size: 1,
        }
    }
}

impl DetectorConfig {
    fn validate(&self) -> Result<(), Error> {
        if !(1..=10).contains(&self.handle_pool_size) {
            return Err(Error::InvalidConfig(format!(
                "handle pool size {} is outside the valid range 1..=10",
                self.handle_pool_size
            )));
        }
        for (name, value) in [
            ("score threshold", self.score_threshold),
            ("minimum landmark score", self.min_landmark_score),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::InvalidConfig(format!(
                    "{name} {value} is outside the valid range 0.0..=1.0"
                )));
            }
        }
        Ok(())
    }
}

/// A detected hand.
#[derive(Debug, Clone)]
pub struct HandResult {
    bounding_box: Rect,
    score: f32,
    landmarks: Vec<Landmark>,
    handedness: Option<Handedness>,
    rotated_rect: RotatedRect,
    image_size: Resolution,
}

impl HandResult {
    /// Returns the axis-aligned bounding box of the hand region, in image pixels.
    pub fn bounding_box(&self) -> Rect {
        self.bounding_box
    }

    /// Returns the detection confidence.
    ///
    /// In [`DetectionMode::BoxesOnly`] this is the palm detection score, otherwise the landmark
    /// stage's presence score.
    pub fn score(&self) -> f32 {
        self.score
    }

    /// Returns the hand's landmarks in image pixel coordinates.
    ///
    /// Empty in [`DetectionMode::BoxesOnly`].
    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }

    /// Returns a landmark by name, or `None` when landmarks were not computed.
    pub fn landmark(&self, idx: LandmarkIdx) -> Option<&Landmark> {
        self.landmarks.get(idx as usize)
    }

    /// Returns the estimated handedness, or `None` when landmarks were not computed.
    pub fn handedness(&self) -> Option<Handedness> {
        self.handedness
    }

    /// Returns the rotated square region the hand was extracted from.
    pub fn rotated_rect(&self) -> RotatedRect {
        self.rotated_rect
    }

    /// Returns the region's rotation in radians.
    pub fn rotation_radians(&self) -> f32 {
        self.rotated_rect.rotation_radians()
    }

    /// Returns the resolution of the image the hand was detected in.
    pub fn image_size(&self) -> Resolution {
        self.image_size
    }
}

type CropJob = (Image, Promise<Result<LandmarkResult, EngineError>>);

/// Everything that only exists between `initialize` and `dispose`.
struct Runtime<E: InferenceEngine> {
    stage1: E,
    anchors: Anchors,
    workers: Vec<Worker<CropJob>>,
    next_worker: usize,
}

enum State<E: InferenceEngine> {
    Uninitialized,
    Initialized(Runtime<E>),
    Disposed,
}

/// A two-stage hand detector.
///
/// The detector must be [`initialize`][Self::initialize]d before use and can be
/// [`dispose`][Self::dispose]d to release all engine handles early. Using it in any other state
/// is a usage error reported as [`Error::NotInitialized`].
pub struct HandDetector<F: EngineFactory> {
    factory: F,
    config: DetectorConfig,
    state: State<F::Engine>,
    nms: NonMaxSuppression,
    t_resize: Timer,
    t_infer: Timer,
    t_extract: Timer,
    t_nms: Timer,
}

impl<F: EngineFactory> HandDetector<F> {
    /// Creates a new detector using `factory` to obtain engine handles.
    ///
    /// No engines are created yet; that happens in [`initialize`][Self::initialize].
    pub fn new(factory: F, config: DetectorConfig) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            factory,
            config,
            state: State::Uninitialized,
            nms: NonMaxSuppression::new(),
            t_resize: Timer::new("resize"),
            t_infer: Timer::new("infer"),
            t_extract: Timer::new("extract"),
            t_nms: Timer::new("nms"),
        })
    }

    /// Creates the engine handles and the anchor grid.
    ///
    /// Calling this on an already initialized detector tears the previous runtime down first and
    /// builds a fresh one. Engine creation failures are fatal and leave the detector
    /// uninitialized.
    pub fn initialize(&mut self) -> Result<(), Error> {
        // Tear down any previous runtime (joins workers, drops engine handles).
        self.state = State::Uninitialized;

        let stage1 = self.factory.create_engine(ModelKind::PalmDetection)?;
        let anchors = Anchors::calculate(&palm::anchor_config())?;

        let mut workers = Vec::with_capacity(self.config.handle_pool_size);
        for i in 0..self.config.handle_pool_size {
            let mut engine = self.factory.create_engine(ModelKind::HandLandmark)?;
            let worker = Worker::spawn(
                format!("hand landmark {i}"),
                move |(crop, promise): CropJob| {
                    let result = run_landmark_stage(&mut engine, &crop);
                    // The crop buffer is released here, before the result is handed back, so a
                    // sustained stream of detect calls cannot accumulate crops.
                    drop(crop);
                    promise.fulfill(result);
                },
            )?;
            workers.push(worker);
        }

        log::debug!(
            "hand detector initialized ({} landmark handle{})",
            self.config.handle_pool_size,
            if self.config.handle_pool_size == 1 { "" } else { "s" },
        );
        self.state = State::Initialized(Runtime {
            stage1,
            anchors,
            workers,
            next_worker: 0,
        });
        Ok(())
    }

    /// Releases all engine handles and worker threads.
    ///
    /// Idempotent; any subsequent `detect` call fails with [`Error::NotInitialized`]. The
    /// detector can be re-initialized afterwards.
    pub fn dispose(&mut self) {
        if matches!(self.state, State::Initialized(_)) {
            log::debug!("disposing hand detector");
        }
        self.state = State::Disposed;
    }

    /// Decodes `bytes` as an image (JPEG, PNG or GIF) and detects hands in it.
    ///
    /// Undecodable bytes are an input error, not a usage error: they yield an empty result list.
    pub fn detect(&mut self, bytes: &[u8]) -> Result<Vec<HandResult>, Error> {
        if !matches!(self.state, State::Initialized(_)) {
            return Err(Error::NotInitialized);
        }
        let image = match Image::decode(bytes) {
            Ok(image) => image,
            Err(e) => {
                log::debug!("skipping undecodable input image: {e}");
                return Ok(Vec::new());
            }
        };
        self.detect_image(&image)
    }

    /// Detects hands in an already decoded image.
    pub fn detect_image(&mut self, image: &Image) -> Result<Vec<HandResult>, Error> {
        let runtime = match &mut self.state {
            State::Initialized(runtime) => runtime,
            _ => return Err(Error::NotInitialized),
        };
        let resolution = image.resolution();

        // Stage 1: palm detection over the letterboxed full image.
        let (square, _) = self.t_resize.time(|| image.letterbox(palm::INPUT_SIZE));
        let tensor = square.to_tensor();
        let outputs = self.t_infer.time(|| runtime.stage1.run(&tensor))?;
        log::trace!("palm detection outputs: {outputs:?}");

        let mut candidates = self.t_extract.time(|| {
            palm::extract_regions(
                &outputs,
                &runtime.anchors,
                self.config.score_threshold,
                resolution,
            )
        });
        let mut regions: Vec<OrientedRegion> = self
            .t_nms
            .time(|| self.nms.process(&mut candidates, resolution).collect());
        // `regions` is in descending score order; extras beyond the cap are dropped silently.
        regions.truncate(self.config.max_detections);

        if self.config.mode == DetectionMode::BoxesOnly {
            return Ok(regions
                .iter()
                .map(|region| {
                    let rect = region.rotated_rect(resolution);
                    HandResult {
                        bounding_box: rect.bounding_rect(),
                        score: region.score,
                        landmarks: Vec::new(),
                        handedness: None,
                        rotated_rect: rect,
                        image_size: resolution,
                    }
                })
                .collect());
        }

        // Stage 2: fan the crops out over the landmark handle pool, round-robin.
        let mut pending: Vec<(
            RotatedRect,
            f32,
            PromiseHandle<Result<LandmarkResult, EngineError>>,
        )> = Vec::with_capacity(regions.len());
        for region in &regions {
            let rect = region.rotated_rect(resolution);
            let Some(crop) = image.rotated_crop(&rect) else {
                log::trace!("skipping region with degenerate crop: {region:?}");
                continue;
            };
            let crop_side = crop.width() as f32;

            let (promise, handle) = promise();
            let index = runtime.next_worker;
            runtime.next_worker = (runtime.next_worker + 1) % runtime.workers.len();
            runtime.workers[index].send((crop, promise));
            pending.push((rect, crop_side, handle));
        }

        let mut results = Vec::with_capacity(pending.len());
        for (rect, crop_side, handle) in pending {
            let parsed = match handle.block() {
                Ok(Ok(parsed)) => parsed,
                Ok(Err(e)) => {
                    // An engine failure on one crop only loses that hand, not the whole batch.
                    log::warn!("landmark inference failed, skipping region: {e}");
                    continue;
                }
                Err(_) => {
                    return Err(Error::Engine(EngineError::new(
                        "landmark worker terminated unexpectedly",
                    )))
                }
            };
            if parsed.score() < self.config.min_landmark_score {
                log::trace!("dropping hand with landmark score {}", parsed.score());
                continue;
            }

            let (w, h) = (resolution.width() as f32, resolution.height() as f32);
            let landmarks = parsed
                .landmarks()
                .iter()
                .map(|lm| {
                    let p = rect.map_crop_point(lm.x, lm.y, crop_side, crop_side);
                    // Landmarks outside the visible image are clipped, not dropped.
                    Landmark {
                        x: p.x.clamp(0.0, w),
                        y: p.y.clamp(0.0, h),
                        z: lm.z,
                        visibility: lm.visibility,
                    }
                })
                .collect();

            results.push(HandResult {
                bounding_box: rect.bounding_rect(),
                score: parsed.score(),
                landmarks,
                handedness: Some(parsed.handedness()),
                rotated_rect: rect,
                image_size: resolution,
            });
        }
        Ok(results)
    }

    /// Returns profiling timers for the stage-1 steps.
    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        [&self.t_resize, &self.t_infer, &self.t_extract, &self.t_nms].into_iter()
    }
}

/// Runs the landmark network on one crop. Executed on a pool worker thread.
fn run_landmark_stage<E: InferenceEngine>(
    engine: &mut E,
    crop: &Image,
) -> Result<LandmarkResult, EngineError> {
    let (square, letterbox) = crop.letterbox(landmark::INPUT_SIZE);
    let outputs = engine.run(&square.to_tensor())?;
    log::trace!("landmark outputs: {outputs:?}");
    Ok(landmark::parse_outputs(&outputs, &letterbox))
}

#[cfg(test)]
mod tests {
    use crate::nn::{Outputs, Tensor};

    use super::*;

    struct NeverFactory;

    struct NeverEngine;

    impl InferenceEngine for NeverEngine {
        fn run(&mut self, _input: &Tensor) -> Result<Outputs, EngineError> {
            panic!("engine must not run in these tests");
        }
    }

    impl EngineFactory for NeverFactory {
        type Engine = NeverEngine;

        fn create_engine(&self, _model: ModelKind) -> Result<Self::Engine, EngineError> {
            Ok(NeverEngine)
        }
    }

    #[test]
    fn pool_size_is_validated() {
        for size in [0, 11, 100] {
            let config = DetectorConfig {
                handle_pool_size: size,
                ..Default::default()
            };
            assert!(matches!(
                HandDetector::new(NeverFactory, config),
                Err(Error::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn thresholds_are_validated() {
        let config = DetectorConfig {
            score_threshold: 1.5,
            ..Default::default()
        };
        assert!(HandDetector::new(NeverFactory, config).is_err());
        let config = DetectorConfig {
            min_landmark_score: -0.1,
            ..Default::default()
        };
        assert!(HandDetector::new(NeverFactory, config).is_err());
    }

    #[test]
    fn detect_requires_initialize() {
        let mut detector = HandDetector::new(NeverFactory, DetectorConfig::default()).unwrap();
        assert!(matches!(
            detector.detect(&[1, 2, 3]),
            Err(Error::NotInitialized)
        ));
    }

    #[test]
    fn detect_after_dispose_fails() {
        let mut detector = HandDetector::new(NeverFactory, DetectorConfig::default()).unwrap();
        detector.initialize().unwrap();
        detector.dispose();
        assert!(matches!(
            detector.detect(&[1, 2, 3]),
            Err(Error::NotInitialized)
        ));
    }

    #[test]
    fn dispose_is_idempotent() {
        let mut detector = HandDetector::new(NeverFactory, DetectorConfig::default()).unwrap();
        detector.initialize().unwrap();
        detector.dispose();
        detector.dispose();
    }

    #[test]
    fn initialization_failure_is_fatal() {
        struct FailingFactory;
        impl EngineFactory for FailingFactory {
            type Engine = NeverEngine;

            fn create_engine(&self, _model: ModelKind) -> Result<Self::Engine, EngineError> {
                Err(EngineError::new("model asset missing"))
            }
        }

        let mut detector = HandDetector::new(FailingFactory, DetectorConfig::default()).unwrap();
        assert!(matches!(detector.initialize(), Err(Error::Engine(_))));
        assert!(matches!(
            detector.detect(&[1, 2, 3]),
            Err(Error::NotInitialized)
        ));
    }
}
