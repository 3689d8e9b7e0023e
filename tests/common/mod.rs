//! Shared test doubles for the integration tests
//!
//! A scripted inference backend lets the full pipeline run without model
//! files being loadable by a real runtime.

#![allow(dead_code)]

use fgmask::{
    config::{DEFAULT_FLOAT_MODEL_FILE, DEFAULT_QUANTIZED_MODEL_FILE},
    BackendFactory, InferenceBackend, InputTensor, ModelArtifact, ModelMetadata, Precision,
    RawTensor, Result, SegmentationError,
};
use ndarray::Array4;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Backend returning a raw output with constant background/foreground planes
pub struct ConstantBackend {
    metadata: ModelMetadata,
    precision: Precision,
    backend_name: String,
    background: f32,
    foreground: f32,
    failures_left: usize,
    runs: Arc<AtomicUsize>,
}

impl InferenceBackend for ConstantBackend {
    fn run(&mut self, input: &InputTensor) -> Result<RawTensor> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(SegmentationError::inference("scripted failure"));
        }
        let shape = input.shape();
        let dims = (1, 2, shape[2], shape[3]);
        let value = |c: usize| if c == 0 { self.background } else { self.foreground };
        Ok(match self.precision {
            Precision::Float => RawTensor::F32(Array4::from_shape_fn(dims, |(_, c, _, _)| value(c))),
            Precision::Quantized => RawTensor::U8(Array4::from_shape_fn(dims, |(_, c, _, _)| {
                (value(c) * 255.0).round() as u8
            })),
        })
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

    fn release(&mut self) {}
}

/// Factory recording every `(precision, backend)` it was asked for
pub struct ConstantBackendFactory {
    pub input_size: (u32, u32),
    pub background: f32,
    pub foreground: f32,
    pub failing_runs: usize,
    pub requests: Arc<Mutex<Vec<(Precision, String)>>>,
    pub runs: Arc<AtomicUsize>,
}

impl ConstantBackendFactory {
    pub fn new(width: u32, height: u32, background: f32, foreground: f32) -> Self {
        Self {
            input_size: (width, height),
            background,
            foreground,
            failing_runs: 0,
            requests: Arc::new(Mutex::new(Vec::new())),
            runs: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_failing_runs(mut self, count: usize) -> Self {
        self.failing_runs = count;
        self
    }
}

impl BackendFactory for ConstantBackendFactory {
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
        Ok(Box::new(ConstantBackend {
            metadata: ModelMetadata::new("input", self.input_size.0, self.input_size.1),
            precision: artifact.precision,
            backend_name: backend_name.to_string(),
            background: self.background,
            foreground: self.foreground,
            failures_left: self.failing_runs,
            runs: Arc::clone(&self.runs),
        }))
    }

    fn name(&self) -> &'static str {
        "constant"
    }
}

/// Model directory containing the requested placeholder artifacts
pub fn model_dir(quantized: bool, float: bool) -> TempDir {
    let dir = TempDir::new().unwrap();
    if quantized {
        std::fs::write(dir.path().join(DEFAULT_QUANTIZED_MODEL_FILE), b"quantized").unwrap();
    }
    if float {
        std::fs::write(dir.path().join(DEFAULT_FLOAT_MODEL_FILE), b"float").unwrap();
    }
    dir
}

/// Gradient test image
pub fn test_image(width: u32, height: u32) -> image::DynamicImage {
    let mut image = image::RgbaImage::new(width, height);
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let intensity = ((x + y) % 100) as u8;
        *pixel = image::Rgba([intensity, 128, 255 - intensity, 255]);
    }
    image::DynamicImage::ImageRgba8(image)
}
