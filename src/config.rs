//! Configuration types for segmentation sessions

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Numeric path of the selected model, fixed at session creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// 8-bit integer model; raw bytes in, bytes out (dequantized by /255)
    Quantized,
    /// 32-bit float model; inputs normalized to [0, 1]
    Float,
}

impl std::fmt::Display for Precision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Quantized => write!(f, "int8"),
            Self::Float => write!(f, "fp32"),
        }
    }
}

/// Which compute backends the selector may consider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AcceleratorPreference {
    /// Use a ready accelerator with the quantized model when possible (default)
    #[default]
    Auto,
    /// Never touch accelerator backends; float model on CPU only
    CpuOnly,
}

impl std::fmt::Display for AcceleratorPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::CpuOnly => write!(f, "cpu-only"),
        }
    }
}

/// Default file name of the quantized model artifact
pub const DEFAULT_QUANTIZED_MODEL_FILE: &str = "model_quantized.onnx";

/// Default file name of the float model artifact
pub const DEFAULT_FLOAT_MODEL_FILE: &str = "model.onnx";

/// Configuration for segmentation sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Directory holding the model artifacts
    pub model_dir: PathBuf,

    /// File name of the quantized (8-bit) artifact inside `model_dir`
    pub quantized_model_file: String,

    /// File name of the float artifact inside `model_dir`
    pub float_model_file: String,

    /// Accelerator selection policy
    pub accelerator: AcceleratorPreference,

    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,

    /// Reconstruct masks with row-level data parallelism
    pub parallel_reconstruction: bool,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            quantized_model_file: DEFAULT_QUANTIZED_MODEL_FILE.to_string(),
            float_model_file: DEFAULT_FLOAT_MODEL_FILE.to_string(),
            accelerator: AcceleratorPreference::Auto,
            intra_threads: 0,
            parallel_reconstruction: true,
        }
    }
}

impl SegmentationConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    ///
    /// ```rust
    /// use fgmask::{AcceleratorPreference, SegmentationConfig};
    ///
    /// let config = SegmentationConfig::builder()
    ///     .model_dir("assets/segmenter")
    ///     .accelerator(AcceleratorPreference::CpuOnly)
    ///     .intra_threads(4)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.intra_threads, 4);
    /// ```
    #[must_use]
    pub fn builder() -> SegmentationConfigBuilder {
        SegmentationConfigBuilder::default()
    }

    /// Load a configuration from a JSON file; missing fields take defaults
    ///
    /// # Errors
    /// - File cannot be read
    /// - JSON is malformed
    /// - Resulting configuration fails validation
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| crate::SegmentationError::file_io_error("read config", path, &e))?;
        let config: Self = serde_json::from_str(&contents).map_err(|e| {
            crate::SegmentationError::configuration(format!(
                "Failed to parse config '{}': {e}",
                path.display()
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Full path of the quantized artifact
    #[must_use]
    pub fn quantized_model_path(&self) -> PathBuf {
        self.model_dir.join(&self.quantized_model_file)
    }

    /// Full path of the float artifact
    #[must_use]
    pub fn float_model_path(&self) -> PathBuf {
        self.model_dir.join(&self.float_model_file)
    }

    /// Validate configuration parameters
    ///
    /// # Errors
    /// - Empty artifact file names
    /// - Quantized and float artifacts pointing at the same file
    pub fn validate(&self) -> crate::Result<()> {
        if self.quantized_model_file.trim().is_empty() {
            return Err(crate::SegmentationError::configuration(
                "Quantized model file name must not be empty",
            ));
        }

        if self.float_model_file.trim().is_empty() {
            return Err(crate::SegmentationError::configuration(
                "Float model file name must not be empty",
            ));
        }

        if self.quantized_model_file == self.float_model_file {
            return Err(crate::SegmentationError::configuration(format!(
                "Quantized and float artifacts must be different files (both are '{}')",
                self.float_model_file
            )));
        }

        Ok(())
    }
}

/// Builder for `SegmentationConfig`
#[derive(Debug, Default)]
pub struct SegmentationConfigBuilder {
    config: SegmentationConfig,
}

impl SegmentationConfigBuilder {
    /// Set the model directory
    #[must_use]
    pub fn model_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.model_dir = dir.into();
        self
    }

    /// Set the quantized artifact file name
    #[must_use]
    pub fn quantized_model_file<S: Into<String>>(mut self, file: S) -> Self {
        self.config.quantized_model_file = file.into();
        self
    }

    /// Set the float artifact file name
    #[must_use]
    pub fn float_model_file<S: Into<String>>(mut self, file: S) -> Self {
        self.config.float_model_file = file.into();
        self
    }

    /// Set the accelerator policy
    #[must_use]
    pub fn accelerator(mut self, preference: AcceleratorPreference) -> Self {
        self.config.accelerator = preference;
        self
    }

    /// Set intra-op threads (0 = auto)
    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    /// Enable or disable row-parallel reconstruction
    #[must_use]
    pub fn parallel_reconstruction(mut self, enabled: bool) -> Self {
        self.config.parallel_reconstruction = enabled;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - Any rule checked by [`SegmentationConfig::validate`]
    pub fn build(self) -> crate::Result<SegmentationConfig> {
        let config = self.config;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = SegmentationConfig::default();
        assert_eq!(config.quantized_model_file, "model_quantized.onnx");
        assert_eq!(config.float_model_file, "model.onnx");
        assert_eq!(config.accelerator, AcceleratorPreference::Auto);
        assert!(config.parallel_reconstruction);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = SegmentationConfig::builder()
            .model_dir("/opt/models")
            .float_model_file("seg_fp32.onnx")
            .quantized_model_file("seg_int8.onnx")
            .parallel_reconstruction(false)
            .build()
            .unwrap();

        assert_eq!(config.float_model_path(), Path::new("/opt/models/seg_fp32.onnx"));
        assert_eq!(
            config.quantized_model_path(),
            Path::new("/opt/models/seg_int8.onnx")
        );
        assert!(!config.parallel_reconstruction);
    }

    #[test]
    fn test_config_validation() {
        let mut config = SegmentationConfig::default();
        config.float_model_file = String::new();
        assert!(config.validate().is_err());

        let result = SegmentationConfig::builder()
            .quantized_model_file("same.onnx")
            .float_model_file("same.onnx")
            .build();
        let error = result.unwrap_err();
        assert!(error.to_string().contains("same.onnx"));
    }

    #[test]
    fn test_precision_display_and_serde() {
        assert_eq!(Precision::Quantized.to_string(), "int8");
        assert_eq!(Precision::Float.to_string(), "fp32");

        let json = serde_json::to_string(&Precision::Quantized).unwrap();
        assert_eq!(json, "\"quantized\"");
        let parsed: Precision = serde_json::from_str("\"float\"").unwrap();
        assert_eq!(parsed, Precision::Float);
    }

    #[test]
    fn test_accelerator_preference_serde() {
        let json = serde_json::to_string(&AcceleratorPreference::CpuOnly).unwrap();
        assert_eq!(json, "\"cpu-only\"");
        assert_eq!(AcceleratorPreference::default().to_string(), "auto");
    }

    #[test]
    fn test_from_json_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"model_dir": "/srv/seg", "accelerator": "cpu-only"}}"#
        )
        .unwrap();

        let config = SegmentationConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.model_dir, PathBuf::from("/srv/seg"));
        assert_eq!(config.accelerator, AcceleratorPreference::CpuOnly);
        assert_eq!(config.float_model_file, DEFAULT_FLOAT_MODEL_FILE);
    }

    #[test]
    fn test_json_config_serializes_only_live_fields() {
        let json = serde_json::to_value(SegmentationConfig::default()).unwrap();
        let keys: Vec<&str> = json
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();

        assert_eq!(
            keys.len(),
            6,
            "unexpected configuration keys: {keys:?}"
        );
        assert!(!keys.contains(&"debug"));
    }

    #[test]
    fn test_from_json_file_rejects_garbage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let err = SegmentationConfig::from_json_file(file.path()).unwrap_err();
        assert!(matches!(err, crate::SegmentationError::Configuration(_)));
    }
}
