#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # fgmask
//!
//! Foreground/background segmentation masks from a dual-precision neural
//! network. At session creation the library picks either an 8-bit quantized
//! model on a neural accelerator (QNN, CoreML) or a float model on the CPU,
//! then turns any input image into a pixel-accurate mask at the image's own
//! resolution.
//!
//! ## Pipeline
//!
//! 1. **Selection**: [`SessionSelector`] inspects the injected
//!    [`BackendCatalog`] and the model directory and opens an
//!    [`InferenceSession`].
//! 2. **Letterbox**: the image is scaled into the model's input canvas,
//!    centred on opaque white.
//! 3. **Encode**: pixels become a `[1, 3, H, W]` tensor, normalized floats or
//!    raw bytes depending on [`Precision`].
//! 4. **Inference**: the network produces background/foreground channels;
//!    8-bit outputs are dequantized.
//! 5. **Reconstruction**: both channels are bilinearly resampled back to the
//!    original grid in parallel rows and compared per pixel.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fgmask::{segment_image, SegmentationConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = SegmentationConfig::builder()
//!     .model_dir("models/segmenter")
//!     .build()?;
//!
//! let image = image::open("portrait.jpg")?;
//! let result = segment_image(&image, &config).await?;
//!
//! println!(
//!     "{:.1}% foreground ({} on {})",
//!     result.mask().foreground_percentage() * 100.0,
//!     result.precision(),
//!     result.backend_name()
//! );
//! result.mask().save_png("portrait_mask.png")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Injecting a backend catalog
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fgmask::{
//!     OnnxBackendFactory, SegmentationConfig, SegmentationProcessor, StaticBackendCatalog,
//! };
//!
//! # async fn example() -> fgmask::Result<()> {
//! let config = SegmentationConfig::builder().model_dir("models").build()?;
//! let mut processor = SegmentationProcessor::new(
//!     config,
//!     Arc::new(StaticBackendCatalog::cpu_only()),
//!     Box::new(OnnxBackendFactory::new()),
//! )
//! .await?;
//!
//! let result = processor.segment_file("input.png")?;
//! assert_eq!(result.precision(), fgmask::Precision::Float);
//! processor.close();
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend and [`segment_image`]
//! - `qnn`: link the Qualcomm NPU execution provider
//! - `cli` (default): command-line interface
//! - `webp-support` (default): WebP input decoding

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod inference;
pub mod models;
pub mod postprocess;
pub mod processor;
pub mod selector;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

// Public API exports
pub use backends::*;
pub use config::{AcceleratorPreference, Precision, SegmentationConfig, SegmentationConfigBuilder};
pub use error::{Result, SegmentationError};
pub use inference::{dequantize, InferenceBackend, InferenceSession, RawOutput, RawTensor};
pub use models::{ModelArtifact, ModelArtifacts, ModelMetadata};
pub use postprocess::{reconstruct, reconstruct_sequential};
pub use processor::SegmentationProcessor;
pub use selector::{decide, BackendFactory, SelectionDecision, SessionSelector};
pub use types::{
    MaskStatistics, ProcessingTimings, SegmentationMask, SegmentationResult, DEFAULT_OVERLAY_TINT,
};
pub use utils::letterbox::{apply_forward, compute_parameters, LetterboxParameters};
pub use utils::tensor::{encode, InputTensor, PixelBuffer, PixelLayout};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat};

/// Segment a `DynamicImage` with the ONNX Runtime backends
///
/// Opens a session for this call only and releases it before returning. For
/// repeated calls keep a [`SegmentationProcessor`] instead.
///
/// # Examples
///
/// ```rust,no_run
/// use fgmask::{segment_image, AcceleratorPreference, SegmentationConfig};
///
/// # async fn example(img: image::DynamicImage) -> anyhow::Result<()> {
/// let config = SegmentationConfig::builder()
///     .model_dir("models")
///     .accelerator(AcceleratorPreference::CpuOnly)
///     .build()?;
/// let result = segment_image(&img, &config).await?;
/// assert_eq!(result.width(), img.width());
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "onnx")]
pub async fn segment_image(
    image: &image::DynamicImage,
    config: &SegmentationConfig,
) -> Result<SegmentationResult> {
    let mut processor = SegmentationProcessor::new(
        config.clone(),
        std::sync::Arc::new(OrtBackendCatalog::new()),
        Box::new(OnnxBackendFactory::new()),
    )
    .await?;
    let result = processor.segment(image);
    processor.close();
    result
}

/// Decode and segment an encoded image held in memory
///
/// # Errors
/// - Bytes are not a supported image format
/// - Any error from [`segment_image`]
#[cfg(feature = "onnx")]
pub async fn segment_bytes(image_bytes: &[u8], config: &SegmentationConfig) -> Result<SegmentationResult> {
    let image = image::load_from_memory(image_bytes)?;
    segment_image(&image, config).await
}
