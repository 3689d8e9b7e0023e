//! Error types for segmentation operations

use thiserror::Error;

/// Result type alias for segmentation operations
pub type Result<T> = std::result::Result<T, SegmentationError>;

/// Error taxonomy for the segmentation pipeline
#[derive(Error, Debug)]
pub enum SegmentationError {
    /// No usable model artifact or backend; fix artifact placement or hardware state
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Asynchronous backend readiness step failed
    #[error("Backend preparation failed for '{backend}': {reason}")]
    BackendPreparation { backend: String, reason: String },

    /// Native execution failure during a run
    #[error("Inference error: {0}")]
    Inference(String),

    /// Invalid image or malformed parameters, raised before any allocation
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Out-of-range pixel coordinate on a mask query
    #[error("Coordinate ({x}, {y}) is outside the {width}x{height} mask")]
    OutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),
}

impl SegmentationError {
    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a new backend preparation error
    pub fn backend_preparation<B: Into<String>, R: Into<String>>(backend: B, reason: R) -> Self {
        Self::BackendPreparation {
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new invalid argument error
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a new out-of-bounds error for a mask query
    #[must_use]
    pub fn out_of_bounds(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self::OutOfBounds {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether the caller may retry the failed operation unchanged
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendPreparation { .. })
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {operation} '{path_display}': {error}"),
        ))
    }

    /// Create inference error with backend context
    pub fn inference_error_with_backend(backend: &str, operation: &str, error: &str) -> Self {
        Self::Inference(format!("{operation} failed on '{backend}' backend: {error}"))
    }

    /// Create configuration error naming the artifacts that were checked
    pub fn missing_artifacts<P: AsRef<std::path::Path>>(checked: &[P]) -> Self {
        let list = checked
            .iter()
            .map(|p| p.as_ref().display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Self::Configuration(format!("No model artifact found (looked for: {list})"))
    }
}
