//! Neural network inference seam.
//!
//! This crate does not ship a neural network runtime. It talks to one through the
//! [`InferenceEngine`] trait: a handle that turns one input tensor into a list of output tensors.
//! An [`EngineFactory`] creates fresh handles for the two models of the pipeline, which lets the
//! orchestrator build a pool of stage-2 handles for concurrent landmark extraction.
//!
//! Engine handles are *not* assumed to be reentrant. The pipeline guarantees at most one in-flight
//! [`InferenceEngine::run`] call per handle by giving each handle to exactly one worker thread.

use std::ops::Index;

use crate::image::Resolution;

/// The two models the hand pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    /// Stage 1: palm detection over the full image.
    ///
    /// Input `1×192×192×3`, outputs `1×2016×18` (box regressors) and `1×2016×1` (score logits).
    PalmDetection,

    /// Stage 2: hand landmark extraction over a rotated crop.
    ///
    /// Input `1×224×224×3`, outputs `1×63` (landmarks), `1×1` (score logit), `1×1` (handedness
    /// logit) and `1×63` (world landmarks, unused here).
    HandLandmark,
}

impl ModelKind {
    /// Returns the fixed input resolution of the model.
    pub fn input_resolution(&self) -> Resolution {
        match self {
            ModelKind::PalmDetection => Resolution::new(192, 192),
            ModelKind::HandLandmark => Resolution::new(224, 224),
        }
    }
}

/// A dense `f32` tensor with a fixed shape and a contiguous row-major buffer.
#[derive(Debug, Clone)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl Tensor {
    /// Creates a tensor from a shape and a flat row-major buffer.
    ///
    /// # Panics
    ///
    /// Panics if `data.len()` does not equal the product of `shape`.
    pub fn new(shape: impl Into<Vec<usize>>, data: Vec<f32>) -> Self {
        let shape = shape.into();
        let expected: usize = shape.iter().product();
        assert_eq!(
            data.len(),
            expected,
            "tensor data length does not match shape {shape:?}"
        );
        Self { shape, data }
    }

    /// Creates a zero-filled tensor.
    pub fn zeros(shape: impl Into<Vec<usize>>) -> Self {
        let shape = shape.into();
        let len = shape.iter().product();
        Self {
            shape,
            data: vec![0.0; len],
        }
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Returns the `index`-th row of a `[1, rows, row_len]` tensor as a flat slice.
    ///
    /// # Panics
    ///
    /// Panics if the tensor is not 3-dimensional or `index` is out of range.
    pub fn row(&self, index: usize) -> &[f32] {
        assert_eq!(self.shape.len(), 3, "row() requires a rank-3 tensor");
        let row_len = self.shape[2];
        &self.data[index * row_len..(index + 1) * row_len]
    }
}

/// The list of output tensors produced by one inference pass.
#[derive(Debug)]
pub struct Outputs {
    inner: Vec<Tensor>,
}

impl Outputs {
    pub fn new(tensors: Vec<Tensor>) -> Self {
        Self { inner: tensors }
    }

    /// Returns the number of tensors in this inference output.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tensor> {
        self.inner.iter()
    }
}

impl Index<usize> for Outputs {
    type Output = Tensor;

    fn index(&self, index: usize) -> &Tensor {
        &self.inner[index]
    }
}

/// An error produced by an inference engine.
///
/// During `initialize`, engine errors are fatal. During detection they are contained to the crop
/// whose inference failed.
#[derive(Debug, thiserror::Error)]
#[error("inference engine: {0}")]
pub struct EngineError(pub String);

impl EngineError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// A handle to a loaded model that can run batched inference.
///
/// `run` takes `&mut self`: a handle must not be invoked again while a call is in flight, and the
/// borrow checker enforces exactly that.
pub trait InferenceEngine: Send + 'static {
    /// Runs the model on `input` and returns all output tensors.
    fn run(&mut self, input: &Tensor) -> Result<Outputs, EngineError>;
}

/// Creates [`InferenceEngine`] handles for the pipeline's models.
///
/// `initialize` calls this once for the palm detection model and once per pool slot for the
/// landmark model. Failing to create a handle (missing model asset, runtime failure) aborts
/// initialization.
pub trait EngineFactory {
    type Engine: InferenceEngine;

    fn create_engine(&self, model: ModelKind) -> Result<Self::Engine, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tensor_rows() {
        let t = Tensor::new([1, 2, 3], vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(t.row(0), &[0.0, 1.0, 2.0]);
        assert_eq!(t.row(1), &[3.0, 4.0, 5.0]);
    }

    #[test]
    #[should_panic]
    fn tensor_shape_mismatch() {
        Tensor::new([2, 2], vec![0.0; 3]);
    }
}
