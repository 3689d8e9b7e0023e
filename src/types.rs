//! Mask and result value types

use crate::config::Precision;
use crate::error::{Result, SegmentationError};
use crate::postprocess::{BACKGROUND_PIXEL, FOREGROUND_PIXEL};
use image::{GrayImage, Luma, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tint painted over background pixels by [`SegmentationMask::create_mask_overlay`]
pub const DEFAULT_OVERLAY_TINT: Rgba<u8> = Rgba([255, 0, 0, 128]);

/// Binary foreground/background mask in RGBA byte order
///
/// Background pixels are `255,255,255,255`, foreground pixels `0,0,0,0`. The
/// buffer is written once during reconstruction and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationMask {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl SegmentationMask {
    /// Wrap a buffer produced by the reconstructor
    pub(crate) fn from_reconstruction(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize * 4);
        Self {
            width,
            height,
            data,
        }
    }

    /// Rebuild a mask from persisted RGBA bytes
    ///
    /// # Errors
    /// - `InvalidArgument` for zero dimensions, a length other than
    ///   `width * height * 4`, or pixels that are neither background nor
    ///   foreground
    pub fn from_rgba_bytes(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(SegmentationError::invalid_argument(format!(
                "Mask dimensions must be non-zero, got {width}x{height}"
            )));
        }

        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(SegmentationError::invalid_argument(format!(
                "Mask buffer holds {} bytes, expected {expected} for {width}x{height}",
                data.len()
            )));
        }

        if let Some(index) = data
            .chunks_exact(4)
            .position(|p| p != BACKGROUND_PIXEL && p != FOREGROUND_PIXEL)
        {
            return Err(SegmentationError::invalid_argument(format!(
                "Mask pixel {index} is neither background nor foreground"
            )));
        }

        Ok(Self {
            width,
            height,
            data,
        })
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Raw RGBA bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    fn alphas(&self) -> impl Iterator<Item = u8> + '_ {
        self.data.chunks_exact(4).filter_map(|p| p.get(3).copied())
    }

    fn alpha_at(&self, x: u32, y: u32) -> Result<u8> {
        if x >= self.width || y >= self.height {
            return Err(SegmentationError::out_of_bounds(
                x,
                y,
                self.width,
                self.height,
            ));
        }
        let index = (y as usize * self.width as usize + x as usize) * 4 + 3;
        self.data
            .get(index)
            .copied()
            .ok_or_else(|| SegmentationError::out_of_bounds(x, y, self.width, self.height))
    }

    /// True if any pixel is foreground
    #[must_use]
    pub fn has_foreground(&self) -> bool {
        self.alphas().any(|a| a == 0)
    }

    /// Whether `(x, y)` is foreground
    ///
    /// # Errors
    /// - `OutOfBounds` when the coordinate is outside the mask
    pub fn is_foreground(&self, x: u32, y: u32) -> Result<bool> {
        Ok(self.alpha_at(x, y)? == 0)
    }

    /// Whether `(x, y)` is background
    ///
    /// # Errors
    /// - `OutOfBounds` when the coordinate is outside the mask
    pub fn is_background(&self, x: u32, y: u32) -> Result<bool> {
        Ok(self.alpha_at(x, y)? == 255)
    }

    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    #[must_use]
    pub fn count_foreground_pixels(&self) -> usize {
        self.alphas().filter(|&a| a == 0).count()
    }

    #[must_use]
    pub fn count_background_pixels(&self) -> usize {
        self.pixel_count() - self.count_foreground_pixels()
    }

    /// Foreground share in `[0, 1]`; 0 for an empty mask
    ///
    /// Derived from the background share, so it is always exactly
    /// `1 - background_percentage()` for a non-empty mask.
    #[must_use]
    pub fn foreground_percentage(&self) -> f64 {
        if self.pixel_count() == 0 {
            return 0.0;
        }
        1.0 - self.background_percentage()
    }

    /// Background share in `[0, 1]`; 0 for an empty mask
    #[must_use]
    pub fn background_percentage(&self) -> f64 {
        let total = self.pixel_count();
        if total == 0 {
            return 0.0;
        }
        self.count_background_pixels() as f64 / total as f64
    }

    /// Get mask statistics
    #[must_use]
    pub fn statistics(&self) -> MaskStatistics {
        let total_pixels = self.pixel_count();
        let foreground_pixels = self.count_foreground_pixels();
        MaskStatistics {
            total_pixels,
            foreground_pixels,
            background_pixels: total_pixels - foreground_pixels,
            foreground_ratio: self.foreground_percentage(),
            background_ratio: self.background_percentage(),
        }
    }

    fn check_dimensions(&self, image: &RgbaImage) -> Result<()> {
        if image.dimensions() != self.dimensions() {
            return Err(SegmentationError::invalid_argument(format!(
                "Image is {}x{} but mask is {}x{}",
                image.width(),
                image.height(),
                self.width,
                self.height
            )));
        }
        Ok(())
    }

    /// Copy of `image` with `tint` alpha-blended over background pixels
    ///
    /// # Errors
    /// - `InvalidArgument` when the image size differs from the mask
    pub fn create_mask_overlay(&self, image: &RgbaImage, tint: Rgba<u8>) -> Result<RgbaImage> {
        self.check_dimensions(image)?;

        let alpha = f32::from(tint[3]) / 255.0;
        let mut overlay = image.clone();
        for (pixel, mask) in overlay.pixels_mut().zip(self.data.chunks_exact(4)) {
            if mask != BACKGROUND_PIXEL {
                continue;
            }
            for channel in 0..3 {
                let blended =
                    f32::from(pixel[channel]) * (1.0 - alpha) + f32::from(tint[channel]) * alpha;
                pixel[channel] = blended.round().clamp(0.0, 255.0) as u8;
            }
        }
        Ok(overlay)
    }

    /// Source pixels where the mask is foreground, fully transparent elsewhere
    ///
    /// # Errors
    /// - `InvalidArgument` when the image size differs from the mask
    pub fn extract_foreground(&self, image: &RgbaImage) -> Result<RgbaImage> {
        self.check_dimensions(image)?;

        let mut extracted = image.clone();
        for (pixel, mask) in extracted.pixels_mut().zip(self.data.chunks_exact(4)) {
            if mask == BACKGROUND_PIXEL {
                *pixel = Rgba([0, 0, 0, 0]);
            }
        }
        Ok(extracted)
    }

    /// Single-channel matte, 255 for foreground and 0 for background
    #[must_use]
    pub fn to_alpha_matte(&self) -> GrayImage {
        let matte: Vec<u8> = self.alphas().map(|a| 255 - a).collect();
        GrayImage::from_raw(self.width, self.height, matte)
            .unwrap_or_else(|| GrayImage::from_pixel(self.width, self.height, Luma([0])))
    }

    /// Mask as an RGBA image
    #[must_use]
    pub fn to_image(&self) -> RgbaImage {
        RgbaImage::from_raw(self.width, self.height, self.data.clone())
            .unwrap_or_else(|| RgbaImage::from_pixel(self.width, self.height, Rgba(BACKGROUND_PIXEL)))
    }

    /// Save mask as PNG
    ///
    /// # Errors
    /// - Image encoding or file write failures
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.to_image()
            .save_with_format(path, image::ImageFormat::Png)?;
        Ok(())
    }
}

/// Statistics about a segmentation mask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskStatistics {
    pub total_pixels: usize,
    pub foreground_pixels: usize,
    pub background_pixels: usize,
    pub foreground_ratio: f64,
    pub background_ratio: f64,
}

/// Outcome of segmenting one image
#[derive(Debug, Clone)]
pub struct SegmentationResult {
    mask: SegmentationMask,
    has_foreground: bool,
    precision: Precision,
    backend_name: String,
    timings: ProcessingTimings,
}

impl SegmentationResult {
    #[must_use]
    pub fn new(
        mask: SegmentationMask,
        precision: Precision,
        backend_name: String,
        timings: ProcessingTimings,
    ) -> Self {
        let has_foreground = mask.has_foreground();
        Self {
            mask,
            has_foreground,
            precision,
            backend_name,
            timings,
        }
    }

    #[must_use]
    pub fn mask(&self) -> &SegmentationMask {
        &self.mask
    }

    #[must_use]
    pub fn into_mask(self) -> SegmentationMask {
        self.mask
    }

    /// Original image width
    #[must_use]
    pub fn width(&self) -> u32 {
        self.mask.width()
    }

    /// Original image height
    #[must_use]
    pub fn height(&self) -> u32 {
        self.mask.height()
    }

    #[must_use]
    pub fn has_foreground(&self) -> bool {
        self.has_foreground
    }

    #[must_use]
    pub fn precision(&self) -> Precision {
        self.precision
    }

    #[must_use]
    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }

    #[must_use]
    pub fn timings(&self) -> &ProcessingTimings {
        &self.timings
    }
}

/// Timing breakdown for one segmentation call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Letterboxing and tensor encoding
    pub preprocessing_ms: u64,

    /// Network execution, including dequantization
    pub inference_ms: u64,

    /// Mask reconstruction
    pub reconstruction_ms: u64,

    /// Total end-to-end processing time
    pub total_ms: u64,
}

impl ProcessingTimings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Share of the total spent in inference
    #[must_use]
    pub fn inference_ratio(&self) -> f64 {
        if self.total_ms == 0 {
            0.0
        } else {
            self.inference_ms as f64 / self.total_ms as f64
        }
    }

    /// Get the "other" overhead time (unaccounted time)
    #[must_use]
    pub fn other_overhead_ms(&self) -> u64 {
        let measured = self.preprocessing_ms + self.inference_ms + self.reconstruction_ms;
        self.total_ms.saturating_sub(measured)
    }

    #[must_use]
    pub fn timing_summary(&self) -> String {
        format!(
            "preprocess {}ms, inference {}ms, reconstruct {}ms, total {}ms",
            self.preprocessing_ms, self.inference_ms, self.reconstruction_ms, self.total_ms
        )
    }
}
