//! Inference backend abstraction and session ownership

use crate::{
    config::Precision,
    error::{Result, SegmentationError},
    models::ModelMetadata,
    utils::tensor::InputTensor,
};
use ndarray::{Array4, ArrayView4};

/// Raw network output, `[1, 2, H, W]` with background then foreground channel
pub type RawOutput = Array4<f32>;

/// Output tensor exactly as a backend produced it
///
/// Quantized models emit bytes, float models emit probabilities. The session
/// turns either into a [`RawOutput`].
#[derive(Debug, Clone, PartialEq)]
pub enum RawTensor {
    U8(Array4<u8>),
    F32(Array4<f32>),
}

impl RawTensor {
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::U8(t) => t.shape(),
            Self::F32(t) => t.shape(),
        }
    }

    /// Precision whose models produce this element type
    #[must_use]
    pub fn precision(&self) -> Precision {
        match self {
            Self::U8(_) => Precision::Quantized,
            Self::F32(_) => Precision::Float,
        }
    }
}

/// Trait for inference backends
///
/// A backend owns native inference handles for one loaded model bound to one
/// compute backend. `run` takes `&mut self`, so a backend cannot be entered
/// twice at the same time.
pub trait InferenceBackend: Send {
    /// Run the network over the encoded tensor
    ///
    /// Returns the output in its native element type; quantized models
    /// return [`RawTensor::U8`].
    ///
    /// # Errors
    /// - Native execution failure, surfaced with the original text
    /// - Output tensor is not 4-dimensional
    fn run(&mut self, input: &InputTensor) -> Result<RawTensor>;

    /// Numeric path of the loaded model
    fn precision(&self) -> Precision;

    /// Input description read at load time
    fn metadata(&self) -> &ModelMetadata;

    /// Name of the compute backend the model is bound to
    fn backend_name(&self) -> &str;

    /// Release native handles; must be safe to call more than once
    fn release(&mut self);
}

/// Exclusive owner of a loaded inference backend
///
/// Dropping the session releases its native handles. `close` may also be
/// called explicitly and is idempotent.
pub struct InferenceSession {
    backend: Option<Box<dyn InferenceBackend>>,
    precision: Precision,
    metadata: ModelMetadata,
    backend_name: String,
}

impl InferenceSession {
    /// Take ownership of a loaded backend
    #[must_use]
    pub fn new(backend: Box<dyn InferenceBackend>) -> Self {
        let precision = backend.precision();
        let metadata = backend.metadata().clone();
        let backend_name = backend.backend_name().to_string();
        Self {
            backend: Some(backend),
            precision,
            metadata,
            backend_name,
        }
    }

    /// Run one inference
    ///
    /// Quantized output is dequantized here (every element divided by 255).
    /// A failed run leaves the session usable for later calls.
    ///
    /// # Errors
    /// - Session already closed
    /// - Tensor precision differs from the loaded model
    /// - Backend execution failure
    /// - Backend output element type does not match the session precision
    pub fn run(&mut self, input: &InputTensor) -> Result<RawOutput> {
        let backend = self.backend.as_mut().ok_or_else(|| {
            SegmentationError::inference("Inference session has already been closed")
        })?;

        if input.precision() != self.precision {
            return Err(SegmentationError::invalid_argument(format!(
                "Tensor precision {} does not match session precision {}",
                input.precision(),
                self.precision
            )));
        }

        match (self.precision, backend.run(input)?) {
            (Precision::Quantized, RawTensor::U8(raw)) => Ok(dequantize(raw.view())),
            (Precision::Float, RawTensor::F32(raw)) => Ok(raw),
            (precision, raw) => Err(SegmentationError::inference(format!(
                "Backend '{}' returned {} output for a {precision} session",
                self.backend_name,
                raw.precision()
            ))),
        }
    }

    #[must_use]
    pub fn precision(&self) -> Precision {
        self.precision
    }

    #[must_use]
    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    #[must_use]
    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.backend.is_none()
    }

    /// Release native resources; later calls are no-ops
    pub fn close(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            tracing::debug!(backend = %self.backend_name, "Releasing inference session");
            backend.release();
        }
    }
}

impl Drop for InferenceSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for InferenceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceSession")
            .field("precision", &self.precision)
            .field("metadata", &self.metadata)
            .field("backend_name", &self.backend_name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Convert 8-bit network output to probabilities, preserving shape and order
#[must_use]
pub fn dequantize(raw: ArrayView4<'_, u8>) -> Array4<f32> {
    raw.mapv(|v| f32::from(v) / 255.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::MockBackend;
    use ndarray::Array4;

    #[test]
    fn test_dequantize_endpoints() {
        let raw = Array4::from_shape_vec((1, 2, 1, 2), vec![255u8, 0, 51, 128]).unwrap();
        let out = dequantize(raw.view());

        assert_eq!(out.shape(), &[1, 2, 1, 2]);
        assert!((out[[0, 0, 0, 0]] - 1.0).abs() < f32::EPSILON);
        assert!(out[[0, 0, 0, 1]].abs() < f32::EPSILON);
        assert!((out[[0, 1, 0, 0]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_session_runs_and_closes() {
        let mock = MockBackend::constant(Precision::Float, 4, 4, 0.8, 0.2);
        let released = mock.release_counter();
        let mut session = InferenceSession::new(Box::new(mock));

        let input = InputTensor::Float(Array4::zeros((1, 3, 4, 4)));
        let output = session.run(&input).unwrap();
        assert_eq!(output.shape(), &[1, 2, 4, 4]);

        session.close();
        session.close();
        assert!(session.is_closed());
        assert_eq!(released.load(std::sync::atomic::Ordering::SeqCst), 1);

        let err = session.run(&input).unwrap_err();
        assert!(matches!(err, SegmentationError::Inference(_)));
    }

    #[test]
    fn test_drop_releases_backend() {
        let mock = MockBackend::constant(Precision::Float, 2, 2, 0.5, 0.5);
        let released = mock.release_counter();
        {
            let _session = InferenceSession::new(Box::new(mock));
        }
        assert_eq!(released.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_run_keeps_session_usable() {
        let mock = MockBackend::constant(Precision::Float, 2, 2, 0.1, 0.9).fail_first_runs(1);
        let mut session = InferenceSession::new(Box::new(mock));
        let input = InputTensor::Float(Array4::zeros((1, 3, 2, 2)));

        assert!(session.run(&input).is_err());
        assert!(session.run(&input).is_ok());
    }

    #[test]
    fn test_quantized_session_dequantizes_byte_output() {
        let raw = Array4::from_shape_fn((1, 2, 2, 2), |(_, c, _, _)| if c == 0 { 0u8 } else { 255 });
        let mock = MockBackend::with_raw(Precision::Quantized, RawTensor::U8(raw));
        let mut session = InferenceSession::new(Box::new(mock));
        let input = InputTensor::Quantized(Array4::zeros((1, 3, 2, 2)));

        let output = session.run(&input).unwrap();
        assert!(output.index_axis(ndarray::Axis(1), 0).iter().all(|&v| v == 0.0));
        assert!(output.index_axis(ndarray::Axis(1), 1).iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_output_type_mismatch_is_inference_error() {
        let mock = MockBackend::with_raw(
            Precision::Quantized,
            RawTensor::F32(Array4::zeros((1, 2, 2, 2))),
        );
        let mut session = InferenceSession::new(Box::new(mock));
        let input = InputTensor::Quantized(Array4::zeros((1, 3, 2, 2)));

        assert!(matches!(
            session.run(&input),
            Err(SegmentationError::Inference(_))
        ));
        assert!(!session.is_closed());
    }

    #[test]
    fn test_precision_mismatch_rejected() {
        let mock = MockBackend::constant(Precision::Quantized, 2, 2, 0.1, 0.9);
        let mut session = InferenceSession::new(Box::new(mock));
        let input = InputTensor::Float(Array4::zeros((1, 3, 2, 2)));

        assert!(matches!(
            session.run(&input),
            Err(SegmentationError::InvalidArgument(_))
        ));
    }
}
