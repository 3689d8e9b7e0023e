//! End-to-end segmentation pipeline
//!
//! Letterbox, encode, run, reconstruct. The processor owns one inference
//! session; all per-image state (letterbox parameters, tensors, masks) is
//! created fresh for every call.

use crate::{
    backends::catalog::BackendCatalog,
    config::{Precision, SegmentationConfig},
    error::{Result, SegmentationError},
    inference::InferenceSession,
    models::ModelMetadata,
    postprocess::reconstruct_output,
    selector::{BackendFactory, SessionSelector},
    types::{ProcessingTimings, SegmentationMask, SegmentationResult},
    utils::{
        letterbox::{apply_forward, compute_parameters},
        tensor::{encode, PixelBuffer},
    },
};
use image::DynamicImage;
use instant::Instant;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument, span, Level};

/// Segmentation processor bound to one inference session
#[derive(Debug)]
pub struct SegmentationProcessor {
    config: SegmentationConfig,
    session: InferenceSession,
}

impl SegmentationProcessor {
    /// Select hardware and precision, then open the session
    ///
    /// # Errors
    /// - Any error from [`SessionSelector::create_session`]
    pub async fn new(
        config: SegmentationConfig,
        catalog: Arc<dyn BackendCatalog>,
        factory: Box<dyn BackendFactory>,
    ) -> Result<Self> {
        info!("Initializing segmentation processor");
        let selector = SessionSelector::new(config.clone(), catalog, factory);
        let session = selector.create_session().await?;
        info!(
            precision = %session.precision(),
            backend = %session.backend_name(),
            "Segmentation processor initialized"
        );
        Ok(Self::with_session(config, session))
    }

    /// Wrap an already opened session
    #[must_use]
    pub fn with_session(config: SegmentationConfig, session: InferenceSession) -> Self {
        Self { config, session }
    }

    #[must_use]
    pub fn precision(&self) -> Precision {
        self.session.precision()
    }

    #[must_use]
    pub fn metadata(&self) -> &ModelMetadata {
        self.session.metadata()
    }

    #[must_use]
    pub fn backend_name(&self) -> &str {
        self.session.backend_name()
    }

    #[must_use]
    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    /// Segment one image
    ///
    /// # Errors
    /// - `InvalidArgument` for an empty image, raised before any work
    /// - `Inference` when the network run fails; the session stays usable
    #[instrument(
        skip(self, image),
        fields(
            backend = %self.session.backend_name(),
            precision = %self.session.precision(),
            dimensions = %format!("{}x{}", image.width(), image.height())
        )
    )]
    pub fn segment(&mut self, image: &DynamicImage) -> Result<SegmentationResult> {
        let (original_width, original_height) = (image.width(), image.height());
        if original_width == 0 || original_height == 0 {
            return Err(SegmentationError::invalid_argument(format!(
                "Cannot segment an empty {original_width}x{original_height} image"
            )));
        }

        let mut timings = ProcessingTimings::new();
        let total_start = Instant::now();
        let precision = self.session.precision();
        let (input_width, input_height) = self.session.metadata().input_size();

        let params = compute_parameters(original_width, original_height, input_width, input_height)?;

        let tensor = {
            let _span = span!(
                Level::DEBUG,
                "preprocessing",
                scale = %params.scale,
                offset_x = %params.offset_x,
                offset_y = %params.offset_y
            )
            .entered();
            let start = Instant::now();
            let canvas = apply_forward(image, &params);
            let tensor = encode(&PixelBuffer::from_rgba_image(&canvas), precision);
            timings.preprocessing_ms = start.elapsed().as_millis() as u64;
            tensor
        };

        let raw = {
            let _span = span!(Level::INFO, "inference", backend = %self.session.backend_name())
                .entered();
            let start = Instant::now();
            let raw = self.session.run(&tensor)?;
            timings.inference_ms = start.elapsed().as_millis() as u64;
            raw
        };

        let mask = {
            let _span = span!(
                Level::DEBUG,
                "reconstruction",
                parallel = self.config.parallel_reconstruction
            )
            .entered();
            let start = Instant::now();
            let bytes = reconstruct_output(
                &raw,
                &params,
                original_width,
                original_height,
                self.config.parallel_reconstruction,
            )?;
            timings.reconstruction_ms = start.elapsed().as_millis() as u64;
            SegmentationMask::from_reconstruction(original_width, original_height, bytes)
        };

        timings.total_ms = total_start.elapsed().as_millis() as u64;
        debug!(
            foreground = mask.foreground_percentage(),
            "Segmentation finished: {}",
            timings.timing_summary()
        );

        Ok(SegmentationResult::new(
            mask,
            precision,
            self.session.backend_name().to_string(),
            timings,
        ))
    }

    /// Segment a strided pixel buffer (for example a platform bitmap)
    ///
    /// # Errors
    /// - Same conditions as [`Self::segment`]
    pub fn segment_pixels(&mut self, pixels: &PixelBuffer<'_>) -> Result<SegmentationResult> {
        let image = DynamicImage::ImageRgba8(pixels.to_rgba_image());
        self.segment(&image)
    }

    /// Decode and segment an image file
    ///
    /// # Errors
    /// - File cannot be read or decoded
    /// - Same conditions as [`Self::segment`]
    pub fn segment_file<P: AsRef<Path>>(&mut self, path: P) -> Result<SegmentationResult> {
        let path = path.as_ref();
        let image = image::open(path).map_err(|e| match e {
            image::ImageError::IoError(io) => {
                SegmentationError::file_io_error("open image", path, &io)
            },
            other => SegmentationError::Image(other),
        })?;
        self.segment(&image)
    }

    /// Decode and segment an encoded image held in memory
    ///
    /// # Errors
    /// - Bytes are not a supported image format
    /// - Same conditions as [`Self::segment`]
    pub fn segment_bytes(&mut self, bytes: &[u8]) -> Result<SegmentationResult> {
        let image = image::load_from_memory(bytes)?;
        self.segment(&image)
    }

    /// Release the inference session; idempotent
    pub fn close(&mut self) {
        self.session.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::MockBackend;
    use image::{Rgba, RgbaImage};

    fn processor(background: f32, foreground: f32) -> SegmentationProcessor {
        let backend = MockBackend::constant(Precision::Float, 4, 4, background, foreground);
        SegmentationProcessor::with_session(
            SegmentationConfig::default(),
            InferenceSession::new(Box::new(backend)),
        )
    }

    fn image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([90, 120, 30, 255])))
    }

    #[test]
    fn test_all_background() {
        let mut processor = processor(0.8, 0.2);
        let result = processor.segment(&image(2, 2)).unwrap();

        assert_eq!((result.width(), result.height()), (2, 2));
        assert!(!result.has_foreground());
        assert!(result.mask().as_bytes().iter().all(|&b| b == 255));
        assert_eq!(result.mask().foreground_percentage(), 0.0);
        assert_eq!(result.backend_name(), "mock");
    }

    #[test]
    fn test_all_foreground() {
        let mut processor = processor(0.1, 0.9);
        let result = processor.segment(&image(7, 3)).unwrap();

        assert!(result.has_foreground());
        assert_eq!(result.mask().count_background_pixels(), 0);
        assert_eq!(result.mask().count_foreground_pixels(), 21);
    }

    #[test]
    fn test_sequential_reconstruction_matches() {
        let backend = MockBackend::constant(Precision::Float, 4, 4, 0.3, 0.6);
        let config = SegmentationConfig::builder()
            .parallel_reconstruction(false)
            .build()
            .unwrap();
        let mut sequential =
            SegmentationProcessor::with_session(config, InferenceSession::new(Box::new(backend)));

        let a = sequential.segment(&image(5, 9)).unwrap();
        let b = processor(0.3, 0.6).segment(&image(5, 9)).unwrap();
        assert_eq!(a.mask(), b.mask());
    }

    #[test]
    fn test_empty_image_rejected() {
        let mut processor = processor(0.1, 0.9);
        let empty = DynamicImage::ImageRgba8(RgbaImage::new(0, 0));
        assert!(matches!(
            processor.segment(&empty),
            Err(SegmentationError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_closed_processor_reports_inference_error() {
        let mut processor = processor(0.1, 0.9);
        processor.close();
        processor.close();
        assert!(matches!(
            processor.segment(&image(2, 2)),
            Err(SegmentationError::Inference(_))
        ));
    }

    #[test]
    fn test_segment_bytes_and_pixels() {
        let mut encoded = Vec::new();
        image(3, 2)
            .write_to(&mut std::io::Cursor::new(&mut encoded), image::ImageFormat::Png)
            .unwrap();

        let mut processor = processor(0.1, 0.9);
        let result = processor.segment_bytes(&encoded).unwrap();
        assert_eq!((result.width(), result.height()), (3, 2));

        let data = [0u8; 2 * 8];
        let pixels =
            PixelBuffer::new(&data, 2, 2, 8, crate::utils::tensor::PixelLayout::Bgra8).unwrap();
        let result = processor.segment_pixels(&pixels).unwrap();
        assert_eq!(result.mask().pixel_count(), 4);

        assert!(processor.segment_bytes(b"definitely not an image").is_err());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let mut processor = processor(0.1, 0.9);
        let err = processor.segment_file("/nonexistent/input.png").unwrap_err();
        assert!(matches!(err, SegmentationError::Io(_)));
    }
}
