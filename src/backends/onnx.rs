//! ONNX Runtime backend for segmentation models
//!
//! Loads one model artifact into an ONNX Runtime session bound to a single
//! execution provider: the accelerator's provider for the quantized model,
//! the default CPU provider for the float model.

use crate::backends::catalog::{BackendCatalog, OrtBackendCatalog, CPU_BACKEND};
use crate::config::Precision;
use crate::error::{Result, SegmentationError};
use crate::inference::{InferenceBackend, RawTensor};
use crate::models::{ModelArtifact, ModelMetadata};
use crate::selector::BackendFactory;
use crate::utils::tensor::InputTensor;
use log;
use ndarray::Ix4;
use ort::execution_providers::{CoreMLExecutionProvider, QNNExecutionProvider};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;

/// ONNX Runtime backend running one loaded segmentation model
#[derive(Debug)]
pub struct OnnxBackend {
    session: Option<Session>,
    precision: Precision,
    metadata: ModelMetadata,
    output_name: String,
    backend_name: String,
}

impl OnnxBackend {
    /// List the compute backends ONNX Runtime can use on this machine
    ///
    /// Returns `(name, available, description)` tuples.
    ///
    /// # Examples
    /// ```rust
    /// use fgmask::backends::OnnxBackend;
    ///
    /// for (name, available, description) in OnnxBackend::list_providers() {
    ///     println!("{}: {} - {}", name, if available { "✅" } else { "❌" }, description);
    /// }
    /// ```
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        log::debug!("🔍 System Hardware Analysis:");
        log::debug!("  - Platform: {os}", os = std::env::consts::OS);
        log::debug!("  - Architecture: {arch}", arch = std::env::consts::ARCH);
        log::debug!(
            "  - CPU cores: {cores}",
            cores = std::thread::available_parallelism()
                .map(std::num::NonZero::get)
                .unwrap_or(1)
        );

        OrtBackendCatalog::new()
            .backends()
            .into_iter()
            .map(|backend| {
                let available = backend.is_ready();
                if available {
                    log::debug!("✅ {} execution provider is available", backend.name);
                } else {
                    log::debug!("❌ {} execution provider is not available", backend.name);
                }
                (backend.name, available, backend.description)
            })
            .collect()
    }

    /// Load `artifact` into a session bound to `backend_name`
    ///
    /// # Errors
    /// - Unknown backend name
    /// - Session creation or model loading failures
    /// - Model inputs that do not describe an NCHW image
    pub fn load(artifact: &ModelArtifact, backend_name: &str, intra_threads: usize) -> Result<Self> {
        let load_start = std::time::Instant::now();

        // sidecar errors surface before any native allocation
        let sidecar = artifact.sidecar_metadata()?;
        if sidecar.is_some() {
            log::debug!("Model metadata read from {}", artifact.sidecar_path().display());
        }

        let mut builder = Session::builder()
            .map_err(|e| {
                SegmentationError::inference(format!("Failed to create session builder: {e}"))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                SegmentationError::inference(format!("Failed to set optimization level: {e}"))
            })?;

        builder = match backend_name {
            CPU_BACKEND => {
                log::info!("Using CPU execution provider");
                builder
            },
            "QNN" => {
                log::info!("🚀 Using QNN execution provider (NPU)");
                builder
                    .with_execution_providers([QNNExecutionProvider::default()
                        .build()
                        .error_on_failure()])
                    .map_err(|e| {
                        SegmentationError::inference_error_with_backend(
                            backend_name,
                            "Execution provider registration",
                            &e.to_string(),
                        )
                    })?
            },
            "CoreML" => {
                log::info!("🍎 Using CoreML execution provider");
                builder
                    .with_execution_providers([CoreMLExecutionProvider::default()
                        .with_subgraphs(true)
                        .build()
                        .error_on_failure()])
                    .map_err(|e| {
                        SegmentationError::inference_error_with_backend(
                            backend_name,
                            "Execution provider registration",
                            &e.to_string(),
                        )
                    })?
            },
            other => {
                return Err(SegmentationError::configuration(format!(
                    "ONNX Runtime has no execution provider named '{other}'"
                )));
            },
        };

        let intra_threads = if intra_threads > 0 {
            intra_threads
        } else {
            std::thread::available_parallelism()
                .map(std::num::NonZero::get)
                .unwrap_or(4)
        };

        let session = builder
            .with_intra_threads(intra_threads)
            .map_err(|e| SegmentationError::inference(format!("Failed to set intra threads: {e}")))?
            .commit_from_file(&artifact.path)
            .map_err(|e| {
                SegmentationError::inference(format!(
                    "Failed to load model '{}': {e}",
                    artifact.path.display()
                ))
            })?;

        let metadata = match sidecar {
            Some(metadata) => metadata,
            None => Self::metadata_from_session(&session)?,
        };
        metadata.validate()?;

        let output_name = match &metadata.output_name {
            Some(name) => name.clone(),
            None => session
                .outputs
                .first()
                .map(|output| output.name.clone())
                .ok_or_else(|| SegmentationError::configuration("Model declares no outputs"))?,
        };

        #[allow(clippy::cast_precision_loss)] // Precision loss acceptable for logging display
        let size_mb = artifact.size_bytes as f64 / (1024.0 * 1024.0);
        log::debug!("✅ ONNX Runtime session created successfully");
        log::debug!("  - Model: {} ({})", artifact.path.display(), artifact.precision);
        log::debug!("  - Model size: {size_mb:.2} MB");
        log::debug!(
            "  - Input '{}' {}x{}, output '{output_name}'",
            metadata.input_name,
            metadata.input_width,
            metadata.input_height
        );
        log::debug!("  - Threading: {intra_threads} intra-op threads");
        log::info!(
            "📊 Model loading complete: {:.0}ms",
            load_start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(Self {
            session: Some(session),
            precision: artifact.precision,
            metadata,
            output_name,
            backend_name: backend_name.to_string(),
        })
    }

    /// Read input name and size from the first declared input (`[N, C, H, W]`)
    fn metadata_from_session(session: &Session) -> Result<ModelMetadata> {
        let input = session
            .inputs
            .first()
            .ok_or_else(|| SegmentationError::configuration("Model declares no inputs"))?;

        let shape = input.input_type.tensor_shape().ok_or_else(|| {
            SegmentationError::configuration(format!("Model input '{}' is not a tensor", input.name))
        })?;

        let dimension = |index: usize| -> Result<u32> {
            shape
                .get(index)
                .copied()
                .and_then(|d| u32::try_from(d).ok())
                .filter(|&d| d > 0)
                .ok_or_else(|| {
                    SegmentationError::configuration(format!(
                        "Model input '{}' has no fixed dimension {index} (shape {shape:?}); \
                         provide a metadata sidecar",
                        input.name
                    ))
                })
        };

        Ok(ModelMetadata::new(input.name.clone(), dimension(3)?, dimension(2)?))
    }
}

impl InferenceBackend for OnnxBackend {
    fn run(&mut self, input: &InputTensor) -> Result<RawTensor> {
        let session = self.session.as_mut().ok_or_else(|| {
            SegmentationError::inference("ONNX session has already been released")
        })?;

        let inference_start = std::time::Instant::now();
        log::debug!("🚀 Starting inference with input shape: {:?}", input.shape());

        let input_value = match input {
            InputTensor::Float(tensor) => Value::from_array(tensor.clone()).map(Value::into_dyn),
            InputTensor::Quantized(tensor) => {
                Value::from_array(tensor.clone()).map(Value::into_dyn)
            },
        }
        .map_err(|e| SegmentationError::inference(format!("Failed to convert input tensor: {e}")))?;

        let outputs = session
            .run(ort::inputs![self.metadata.input_name.as_str() => input_value])
            .map_err(|e| {
                SegmentationError::inference_error_with_backend(
                    &self.backend_name,
                    "Model run",
                    &e.to_string(),
                )
            })?;

        let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            SegmentationError::inference(format!("Output tensor '{}' not found", self.output_name))
        })?;

        let result = match self.precision {
            Precision::Quantized => {
                let view = output.try_extract_array::<u8>().map_err(|e| {
                    SegmentationError::inference(format!("Failed to extract 8-bit output: {e}"))
                })?;
                let ndim = view.ndim();
                let view = view.into_dimensionality::<Ix4>().map_err(|_| {
                    SegmentationError::inference(format!("Expected 4D output tensor, got {ndim}D"))
                })?;
                RawTensor::U8(view.to_owned())
            },
            Precision::Float => {
                let view = output.try_extract_array::<f32>().map_err(|e| {
                    SegmentationError::inference(format!("Failed to extract output tensor: {e}"))
                })?;
                let ndim = view.ndim();
                let view = view.into_dimensionality::<Ix4>().map_err(|_| {
                    SegmentationError::inference(format!("Expected 4D output tensor, got {ndim}D"))
                })?;
                RawTensor::F32(view.to_owned())
            },
        };

        log::info!(
            "📊 Inference complete: {:.2}ms on {}",
            inference_start.elapsed().as_secs_f64() * 1000.0,
            self.backend_name
        );

        Ok(result)
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
        if self.session.take().is_some() {
            log::debug!("Released ONNX Runtime session on {}", self.backend_name);
        }
    }
}

/// Creates [`OnnxBackend`] instances for the session selector
#[derive(Debug, Default, Clone, Copy)]
pub struct OnnxBackendFactory;

impl OnnxBackendFactory {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl BackendFactory for OnnxBackendFactory {
    fn create_backend(
        &self,
        artifact: &ModelArtifact,
        backend_name: &str,
        intra_threads: usize,
    ) -> Result<Box<dyn InferenceBackend>> {
        Ok(Box::new(OnnxBackend::load(artifact, backend_name, intra_threads)?))
    }

    fn name(&self) -> &'static str {
        "onnx"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_providers_includes_cpu() {
        let providers = OnnxBackend::list_providers();
        let cpu = providers.iter().find(|(name, _, _)| name == CPU_BACKEND);
        assert!(matches!(cpu, Some((_, true, _))));
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.onnx");
        std::fs::write(&path, b"not a model").unwrap();
        let artifact = ModelArtifact::existing(path, Precision::Float).unwrap();

        let err = OnnxBackend::load(&artifact, "TPU", 1).unwrap_err();
        assert!(matches!(err, SegmentationError::Configuration(_)));
    }

    #[test]
    fn test_bad_sidecar_fails_before_model_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.onnx");
        std::fs::write(&path, b"not a model").unwrap();
        std::fs::write(
            dir.path().join("model.json"),
            r#"{"input_name": "input", "input_width": 0, "input_height": 320}"#,
        )
        .unwrap();
        let artifact = ModelArtifact::existing(path, Precision::Float).unwrap();

        let err = OnnxBackend::load(&artifact, CPU_BACKEND, 1).unwrap_err();
        assert!(matches!(err, SegmentationError::Configuration(_)));
        assert!(!err.to_string().contains("Failed to load model"));
    }

    #[test]
    fn test_invalid_model_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.onnx");
        std::fs::write(&path, b"not a model").unwrap();
        let artifact = ModelArtifact::existing(path, Precision::Float).unwrap();

        let err = OnnxBackendFactory::new()
            .create_backend(&artifact, CPU_BACKEND, 1)
            .err()
            .unwrap();
        assert!(err.to_string().contains("Failed to load model"));
    }
}
