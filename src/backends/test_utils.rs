//! Test utilities and mock backends for testing inference functionality
//!
//! These mocks implement `InferenceBackend` and `BackendFactory` without
//! ONNX Runtime or model files, producing synthetic two-channel outputs.

use crate::{
    config::Precision,
    error::{Result, SegmentationError},
    inference::{InferenceBackend, RawTensor},
    models::{ModelArtifact, ModelMetadata},
    selector::BackendFactory,
    utils::tensor::InputTensor,
};
use ndarray::Array4;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Mock backend returning a fixed raw output
#[derive(Debug)]
pub struct MockBackend {
    precision: Precision,
    metadata: ModelMetadata,
    backend_name: String,
    output: RawTensor,
    failures_left: usize,
    runs: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl MockBackend {
    /// Backend whose output has constant background/foreground channels
    ///
    /// Quantized backends emit the values scaled to bytes, as an 8-bit
    /// model would.
    #[must_use]
    pub fn constant(
        precision: Precision,
        width: u32,
        height: u32,
        background: f32,
        foreground: f32,
    ) -> Self {
        let shape = (1, 2, height as usize, width as usize);
        let value = |c: usize| if c == 0 { background } else { foreground };
        let output = match precision {
            Precision::Float => RawTensor::F32(Array4::from_shape_fn(shape, |(_, c, _, _)| value(c))),
            Precision::Quantized => RawTensor::U8(Array4::from_shape_fn(shape, |(_, c, _, _)| {
                (value(c).clamp(0.0, 1.0) * 255.0).round() as u8
            })),
        };
        Self::with_raw(precision, output)
    }

    /// Backend returning `output`; metadata is derived from its shape
    #[must_use]
    pub fn with_raw(precision: Precision, output: RawTensor) -> Self {
        let (h, w) = match output.shape() {
            [_, _, h, w] => (*h, *w),
            _ => (0, 0),
        };
        Self {
            precision,
            metadata: ModelMetadata::new("input", w as u32, h as u32),
            backend_name: "mock".to_string(),
            output,
            failures_left: 0,
            runs: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fail the first `count` runs with an inference error
    #[must_use]
    pub fn fail_first_runs(mut self, count: usize) -> Self {
        self.failures_left = count;
        self
    }

    #[must_use]
    pub fn named(mut self, name: &str) -> Self {
        self.backend_name = name.to_string();
        self
    }

    /// Shared counter of successful runs
    #[must_use]
    pub fn run_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.runs)
    }

    /// Shared counter of release calls that freed resources
    #[must_use]
    pub fn release_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.released)
    }
}

impl InferenceBackend for MockBackend {
    fn run(&mut self, input: &InputTensor) -> Result<RawTensor> {
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(SegmentationError::inference_error_with_backend(
                &self.backend_name,
                "Model run",
                "simulated native failure",
            ));
        }

        let shape = input.shape();
        if shape.len() != 4 || shape.get(1) != Some(&3) {
            return Err(SegmentationError::inference(format!(
                "Mock backend expects [1, 3, H, W] input, got {shape:?}"
            )));
        }

        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(self.output.clone())
    }

    fn precision(&self) -> Precision {
        self.precision
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn backend_name(&self) -> &str {
        &self.backend_name
    }

    fn release(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Factory recording what the selector asked it to build
#[derive(Debug, Clone)]
pub struct MockBackendFactory {
    size: (u32, u32),
    background: f32,
    foreground: f32,
    fail_with: Option<String>,
    requests: Arc<Mutex<Vec<(Precision, String)>>>,
}

impl MockBackendFactory {
    #[must_use]
    pub fn new(width: u32, height: u32, background: f32, foreground: f32) -> Self {
        Self {
            size: (width, height),
            background,
            foreground,
            fail_with: None,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Fail every build with a configuration error
    #[must_use]
    pub fn failing(mut self, reason: &str) -> Self {
        self.fail_with = Some(reason.to_string());
        self
    }

    /// `(precision, backend)` pairs requested so far
    #[must_use]
    pub fn requests(&self) -> Vec<(Precision, String)> {
        self.requests.lock().unwrap().clone()
    }
}

impl BackendFactory for MockBackendFactory {
    fn create_backend(
        &self,
        artifact: &ModelArtifact,
        backend_name: &str,
        _intra_threads: usize,
    ) -> Result<Box<dyn InferenceBackend>> {
        self.requests
            .lock()
            .unwrap()
            .push((artifact.precision, backend_name.to_string()));

        if let Some(reason) = &self.fail_with {
            return Err(SegmentationError::configuration(reason.clone()));
        }

        let (w, h) = self.size;
        Ok(Box::new(
            MockBackend::constant(artifact.precision, w, h, self.background, self.foreground)
                .named(backend_name),
        ))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_backend_output_channels() {
        let mut backend = MockBackend::constant(Precision::Float, 3, 2, 0.8, 0.2);
        let input = InputTensor::Float(Array4::zeros((1, 3, 2, 3)));
        let RawTensor::F32(output) = backend.run(&input).unwrap() else {
            panic!("float mock must return f32 output");
        };

        assert_eq!(output.shape(), &[1, 2, 2, 3]);
        assert!((output[[0, 0, 1, 2]] - 0.8).abs() < f32::EPSILON);
        assert!((output[[0, 1, 0, 0]] - 0.2).abs() < f32::EPSILON);
        assert_eq!(backend.metadata().input_size(), (3, 2));
    }

    #[test]
    fn test_quantized_mock_returns_bytes() {
        let mut backend = MockBackend::constant(Precision::Quantized, 2, 2, 0.0, 1.0);
        let input = InputTensor::Quantized(Array4::zeros((1, 3, 2, 2)));
        let RawTensor::U8(output) = backend.run(&input).unwrap() else {
            panic!("quantized mock must return u8 output");
        };

        assert_eq!(output[[0, 0, 0, 0]], 0);
        assert_eq!(output[[0, 1, 1, 1]], 255);
    }

    #[test]
    fn test_mock_backend_rejects_bad_input() {
        let mut backend = MockBackend::constant(Precision::Float, 2, 2, 0.0, 1.0);
        let input = InputTensor::Float(Array4::zeros((1, 1, 2, 2)));
        assert!(backend.run(&input).is_err());
    }
}
