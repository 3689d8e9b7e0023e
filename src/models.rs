//! Model artifact discovery and metadata
//!
//! A segmentation model ships as up to two interchangeable ONNX files, a
//! quantized (8-bit) variant and a float variant. Each may carry a JSON
//! sidecar next to it (`<stem>.json`) declaring the input tensor name and the
//! required input resolution, so the values can be read without loading the
//! network.

use crate::config::{Precision, SegmentationConfig};
use crate::error::{Result, SegmentationError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A model file found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelArtifact {
    pub path: PathBuf,
    pub precision: Precision,
    pub size_bytes: u64,
}

impl ModelArtifact {
    /// Check `path` and describe it as an artifact of the given precision
    ///
    /// Returns `None` when the path does not exist or is not a regular file.
    #[must_use]
    pub fn existing(path: PathBuf, precision: Precision) -> Option<Self> {
        let metadata = std::fs::metadata(&path).ok()?;
        if !metadata.is_file() {
            return None;
        }
        Some(Self {
            path,
            precision,
            size_bytes: metadata.len(),
        })
    }

    /// Path of the optional metadata sidecar
    #[must_use]
    pub fn sidecar_path(&self) -> PathBuf {
        self.path.with_extension("json")
    }

    /// Read the sidecar metadata when present
    ///
    /// # Errors
    /// - Sidecar exists but cannot be read or parsed
    pub fn sidecar_metadata(&self) -> Result<Option<ModelMetadata>> {
        let sidecar = self.sidecar_path();
        if !sidecar.is_file() {
            return Ok(None);
        }
        ModelMetadata::from_sidecar(&sidecar).map(Some)
    }
}

/// The artifacts available in a model directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelArtifacts {
    quantized: Option<ModelArtifact>,
    float: Option<ModelArtifact>,
}

impl ModelArtifacts {
    /// Check both configured artifact paths
    ///
    /// # Errors
    /// - `Configuration` when neither artifact exists
    pub fn locate(config: &SegmentationConfig) -> Result<Self> {
        let quantized_path = config.quantized_model_path();
        let float_path = config.float_model_path();

        let artifacts = Self {
            quantized: ModelArtifact::existing(quantized_path.clone(), Precision::Quantized),
            float: ModelArtifact::existing(float_path.clone(), Precision::Float),
        };

        if artifacts.is_empty() {
            return Err(SegmentationError::missing_artifacts(&[
                quantized_path,
                float_path,
            ]));
        }

        tracing::debug!(
            quantized = artifacts.quantized.is_some(),
            float = artifacts.float.is_some(),
            "Located model artifacts in {}",
            config.model_dir.display()
        );

        Ok(artifacts)
    }

    #[must_use]
    pub fn quantized(&self) -> Option<&ModelArtifact> {
        self.quantized.as_ref()
    }

    #[must_use]
    pub fn float(&self) -> Option<&ModelArtifact> {
        self.float.as_ref()
    }

    /// Artifact for the given precision, if present
    #[must_use]
    pub fn get(&self, precision: Precision) -> Option<&ModelArtifact> {
        match precision {
            Precision::Quantized => self.quantized(),
            Precision::Float => self.float(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.quantized.is_none() && self.float.is_none()
    }
}

/// Input/output description of a loaded model, fixed for a session's lifetime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Name of the input tensor the network expects
    pub input_name: String,
    /// Required input width in pixels
    pub input_width: u32,
    /// Required input height in pixels
    pub input_height: u32,
    /// Name of the output tensor; first output when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_name: Option<String>,
}

impl ModelMetadata {
    #[must_use]
    pub fn new<S: Into<String>>(input_name: S, input_width: u32, input_height: u32) -> Self {
        Self {
            input_name: input_name.into(),
            input_width,
            input_height,
            output_name: None,
        }
    }

    /// Load metadata from a JSON sidecar file
    ///
    /// # Errors
    /// - File cannot be read
    /// - JSON is malformed or fails validation
    pub fn from_sidecar<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SegmentationError::file_io_error("read model metadata", path, &e))?;
        let metadata: Self = serde_json::from_str(&contents).map_err(|e| {
            SegmentationError::configuration(format!(
                "Invalid model metadata in '{}': {e}",
                path.display()
            ))
        })?;
        metadata.validate()?;
        Ok(metadata)
    }

    /// Validate the declared input description
    ///
    /// # Errors
    /// - Empty input name
    /// - Zero input width or height
    pub fn validate(&self) -> Result<()> {
        if self.input_name.is_empty() {
            return Err(SegmentationError::configuration(
                "Model metadata has an empty input name",
            ));
        }
        if self.input_width == 0 || self.input_height == 0 {
            return Err(SegmentationError::configuration(format!(
                "Model metadata declares an invalid input size {}x{}",
                self.input_width, self.input_height
            )));
        }
        Ok(())
    }

    /// Input dimensions as `(width, height)`
    #[must_use]
    pub fn input_size(&self) -> (u32, u32) {
        (self.input_width, self.input_height)
    }
}
