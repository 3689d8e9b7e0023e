//! Aspect-preserving letterbox transform
//!
//! Maps an arbitrary-size image onto the fixed canvas the network expects:
//! the image is scaled by a single factor, drawn centred, and the remainder is
//! filled with opaque white. The same parameters drive the inverse mapping
//! used by mask reconstruction.

use crate::error::{Result, SegmentationError};
use image::{imageops, DynamicImage, Rgba, RgbaImage};

/// Fill colour of the letterbox padding
pub const PADDING_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Geometry of one letterboxed image
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxParameters {
    /// Uniform scale factor applied to the original image
    pub scale: f32,
    /// Left padding in canvas pixels
    pub offset_x: u32,
    /// Top padding in canvas pixels
    pub offset_y: u32,
    /// Width of the scaled image inside the canvas
    pub scaled_width: u32,
    /// Height of the scaled image inside the canvas
    pub scaled_height: u32,
    /// Canvas width (the model input width)
    pub padded_width: u32,
    /// Canvas height (the model input height)
    pub padded_height: u32,
}

impl LetterboxParameters {
    /// Map a destination pixel of the original grid into canvas coordinates
    ///
    /// This is a linear resample across the whole destination dimension,
    /// `x / original_width * scaled_width + offset_x`, not `x * scale`. The two
    /// differ whenever the scaled size was truncated, and masks must match the
    /// former bit for bit. The result is clamped to the canvas.
    #[inline]
    #[must_use]
    pub fn to_padded(&self, x: u32, y: u32, original_width: u32, original_height: u32) -> (f32, f32) {
        let sx = x as f32 / original_width as f32 * self.scaled_width as f32 + self.offset_x as f32;
        let sy =
            y as f32 / original_height as f32 * self.scaled_height as f32 + self.offset_y as f32;

        (
            sx.clamp(0.0, (self.padded_width - 1) as f32),
            sy.clamp(0.0, (self.padded_height - 1) as f32),
        )
    }

    /// Number of pixels in the padded canvas
    #[must_use]
    pub fn padded_area(&self) -> usize {
        self.padded_width as usize * self.padded_height as usize
    }
}

/// Compute letterbox geometry for an `original` image on a `target` canvas
///
/// Scaled dimensions are truncated toward zero, then clamped into
/// `1..=target` so a valid image never collapses or overflows the canvas.
///
/// # Errors
/// - `InvalidArgument` when any dimension is zero
pub fn compute_parameters(
    original_width: u32,
    original_height: u32,
    target_width: u32,
    target_height: u32,
) -> Result<LetterboxParameters> {
    if original_width == 0 || original_height == 0 {
        return Err(SegmentationError::invalid_argument(format!(
            "Image dimensions must be non-zero, got {original_width}x{original_height}"
        )));
    }
    if target_width == 0 || target_height == 0 {
        return Err(SegmentationError::invalid_argument(format!(
            "Target dimensions must be non-zero, got {target_width}x{target_height}"
        )));
    }

    let scale = (target_width as f32 / original_width as f32)
        .min(target_height as f32 / original_height as f32);

    let scaled_width = ((original_width as f32 * scale) as u32).clamp(1, target_width);
    let scaled_height = ((original_height as f32 * scale) as u32).clamp(1, target_height);

    Ok(LetterboxParameters {
        scale,
        offset_x: (target_width - scaled_width) / 2,
        offset_y: (target_height - scaled_height) / 2,
        scaled_width,
        scaled_height,
        padded_width: target_width,
        padded_height: target_height,
    })
}

/// Resize `image` and draw it centred on an opaque white canvas
///
/// Uses Catmull-Rom (bicubic) resampling; only the geometry is contractual.
#[must_use]
pub fn apply_forward(image: &DynamicImage, params: &LetterboxParameters) -> RgbaImage {
    let rgba = image.to_rgba8();

    let resized = if rgba.dimensions() == (params.scaled_width, params.scaled_height) {
        rgba
    } else {
        imageops::resize(
            &rgba,
            params.scaled_width,
            params.scaled_height,
            imageops::FilterType::CatmullRom,
        )
    };

    let mut canvas = RgbaImage::from_pixel(params.padded_width, params.padded_height, PADDING_COLOR);
    imageops::overlay(
        &mut canvas,
        &resized,
        i64::from(params.offset_x),
        i64::from(params.offset_y),
    );
    canvas
}
