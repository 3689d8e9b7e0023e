//! Mask reconstruction from raw network output
//!
//! Every destination pixel of the original image is mapped back through the
//! letterbox into canvas space, both output channels are sampled bilinearly,
//! and the pixel becomes background when the foreground sample is strictly
//! smaller. Rows are independent, so the parallel path hands each worker a
//! disjoint mutable row slice.

use crate::error::{Result, SegmentationError};
use crate::inference::RawOutput;
use crate::utils::letterbox::LetterboxParameters;
use ndarray::ArrayView4;
use rayon::prelude::*;

/// RGBA bytes written for a background pixel
pub const BACKGROUND_PIXEL: [u8; 4] = [255, 255, 255, 255];

/// RGBA bytes written for a foreground pixel
pub const FOREGROUND_PIXEL: [u8; 4] = [0, 0, 0, 0];

/// Reconstruct an `original_width x original_height` RGBA mask, row-parallel
///
/// # Errors
/// - `InvalidArgument` when the original size is zero or the raw output is
///   not `[1, 2, padded_height, padded_width]`
pub fn reconstruct(
    raw: ArrayView4<'_, f32>,
    params: &LetterboxParameters,
    original_width: u32,
    original_height: u32,
) -> Result<Vec<u8>> {
    let contiguous = raw.as_standard_layout();
    let planes = Planes::new(contiguous.as_slice(), params, raw.shape())?;
    let row_bytes = row_bytes(original_width, original_height)?;

    let mut mask = vec![0u8; row_bytes * original_height as usize];
    mask.par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(y, row)| {
            planes.fill_row(row, y as u32, params, original_width, original_height);
        });

    Ok(mask)
}

/// Single-threaded reconstruction; byte-identical to [`reconstruct`]
///
/// # Errors
/// - Same conditions as [`reconstruct`]
pub fn reconstruct_sequential(
    raw: ArrayView4<'_, f32>,
    params: &LetterboxParameters,
    original_width: u32,
    original_height: u32,
) -> Result<Vec<u8>> {
    let contiguous = raw.as_standard_layout();
    let planes = Planes::new(contiguous.as_slice(), params, raw.shape())?;
    let row_bytes = row_bytes(original_width, original_height)?;

    let mut mask = vec![0u8; row_bytes * original_height as usize];
    for (y, row) in mask.chunks_mut(row_bytes).enumerate() {
        planes.fill_row(row, y as u32, params, original_width, original_height);
    }

    Ok(mask)
}

/// Dispatch on the configured reconstruction mode
///
/// # Errors
/// - Same conditions as [`reconstruct`]
pub fn reconstruct_output(
    raw: &RawOutput,
    params: &LetterboxParameters,
    original_width: u32,
    original_height: u32,
    parallel: bool,
) -> Result<Vec<u8>> {
    if parallel {
        reconstruct(raw.view(), params, original_width, original_height)
    } else {
        reconstruct_sequential(raw.view(), params, original_width, original_height)
    }
}

fn row_bytes(original_width: u32, original_height: u32) -> Result<usize> {
    if original_width == 0 || original_height == 0 {
        return Err(SegmentationError::invalid_argument(format!(
            "Cannot reconstruct a {original_width}x{original_height} mask"
        )));
    }
    Ok(original_width as usize * 4)
}

/// Background and foreground planes of a validated raw output
struct Planes<'a> {
    background: &'a [f32],
    foreground: &'a [f32],
    width: usize,
    height: usize,
}

impl<'a> Planes<'a> {
    fn new(
        data: Option<&'a [f32]>,
        params: &LetterboxParameters,
        shape: &[usize],
    ) -> Result<Self> {
        let width = params.padded_width as usize;
        let height = params.padded_height as usize;

        if width == 0 || height == 0 {
            return Err(SegmentationError::invalid_argument(format!(
                "Padded canvas must be non-empty, got {width}x{height}"
            )));
        }

        if shape != [1, 2, height, width] {
            return Err(SegmentationError::invalid_argument(format!(
                "Raw output shape {shape:?} does not match expected [1, 2, {height}, {width}]"
            )));
        }

        let data = data.ok_or_else(|| {
            SegmentationError::invalid_argument("Raw output is not contiguous in memory")
        })?;
        let area = params.padded_area();
        let (background, foreground) = data.split_at(area);

        Ok(Self {
            background,
            foreground,
            width,
            height,
        })
    }

    #[inline]
    #[allow(clippy::indexing_slicing)]
    // Safe: neighbour indices are clamped into the validated plane bounds
    fn sample(plane: &[f32], i00: usize, i10: usize, i01: usize, i11: usize, fx: f32, fy: f32) -> f32 {
        plane[i00] * (1.0 - fx) * (1.0 - fy)
            + plane[i10] * fx * (1.0 - fy)
            + plane[i01] * (1.0 - fx) * fy
            + plane[i11] * fx * fy
    }

    fn fill_row(
        &self,
        row: &mut [u8],
        y: u32,
        params: &LetterboxParameters,
        original_width: u32,
        original_height: u32,
    ) {
        for (x, pixel) in row.chunks_exact_mut(4).enumerate() {
            let (sx, sy) = params.to_padded(x as u32, y, original_width, original_height);

            let x0 = (sx.floor() as usize).min(self.width - 1);
            let y0 = (sy.floor() as usize).min(self.height - 1);
            let x1 = (x0 + 1).min(self.width - 1);
            let y1 = (y0 + 1).min(self.height - 1);
            let fx = sx - x0 as f32;
            let fy = sy - y0 as f32;

            let i00 = y0 * self.width + x0;
            let i10 = y0 * self.width + x1;
            let i01 = y1 * self.width + x0;
            let i11 = y1 * self.width + x1;

            let bg = Self::sample(self.background, i00, i10, i01, i11, fx, fy);
            let fg = Self::sample(self.foreground, i00, i10, i01, i11, fx, fy);

            let value = if fg < bg {
                BACKGROUND_PIXEL
            } else {
                FOREGROUND_PIXEL
            };
            pixel.copy_from_slice(&value);
        }
    }
}
