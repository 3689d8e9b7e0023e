//! Tensor encoding for both numeric paths
//!
//! Pixels are read through an explicit row stride so padded rows (common in
//! platform bitmaps) are handled without copying.

use crate::config::Precision;
use crate::error::{Result, SegmentationError};
use image::RgbaImage;
use ndarray::Array4;

/// Byte layout of one pixel in a [`PixelBuffer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    Rgba8,
    Bgra8,
    Rgb8,
}

impl PixelLayout {
    #[must_use]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgba8 | Self::Bgra8 => 4,
            Self::Rgb8 => 3,
        }
    }

    /// Byte offsets of the red, green and blue samples within a pixel
    #[must_use]
    fn rgb_offsets(self) -> [usize; 3] {
        match self {
            Self::Rgba8 | Self::Rgb8 => [0, 1, 2],
            Self::Bgra8 => [2, 1, 0],
        }
    }
}

/// Borrowed view of packed pixel rows
#[derive(Debug, Clone, Copy)]
pub struct PixelBuffer<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
    stride: usize,
    layout: PixelLayout,
}

impl<'a> PixelBuffer<'a> {
    /// Wrap a raw buffer with a declared per-row byte stride
    ///
    /// # Errors
    /// - `InvalidArgument` for zero dimensions, a stride shorter than one row,
    ///   or a buffer too small for `height` rows
    pub fn new(
        data: &'a [u8],
        width: u32,
        height: u32,
        stride: usize,
        layout: PixelLayout,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(SegmentationError::invalid_argument(format!(
                "Pixel buffer dimensions must be non-zero, got {width}x{height}"
            )));
        }

        let row_bytes = width as usize * layout.bytes_per_pixel();
        if stride < row_bytes {
            return Err(SegmentationError::invalid_argument(format!(
                "Stride {stride} is shorter than a row of {row_bytes} bytes"
            )));
        }

        // the last row only needs its pixel bytes, not the trailing padding
        let required = stride * (height as usize - 1) + row_bytes;
        if data.len() < required {
            return Err(SegmentationError::invalid_argument(format!(
                "Pixel buffer holds {} bytes, {required} required for {width}x{height}",
                data.len()
            )));
        }

        Ok(Self {
            data,
            width,
            height,
            stride,
            layout,
        })
    }

    /// View a tightly packed RGBA image
    #[must_use]
    pub fn from_rgba_image(image: &'a RgbaImage) -> Self {
        Self {
            data: image.as_raw(),
            width: image.width(),
            height: image.height(),
            stride: image.width() as usize * 4,
            layout: PixelLayout::Rgba8,
        }
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
    pub fn stride(&self) -> usize {
        self.stride
    }

    #[must_use]
    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    /// Copy into a packed RGBA image, dropping stride padding
    #[must_use]
    pub fn to_rgba_image(&self) -> RgbaImage {
        let bpp = self.layout.bytes_per_pixel();
        let [r, g, b] = self.layout.rgb_offsets();
        let mut packed = Vec::with_capacity(self.width as usize * self.height as usize * 4);

        for y in 0..self.height as usize {
            for pixel in self.row(y).chunks_exact(bpp) {
                let alpha = match self.layout {
                    PixelLayout::Rgba8 | PixelLayout::Bgra8 => pixel.get(3).copied(),
                    PixelLayout::Rgb8 => Some(255),
                };
                packed.extend(
                    [pixel.get(r), pixel.get(g), pixel.get(b)]
                        .into_iter()
                        .map(|v| v.copied().unwrap_or_default())
                        .chain(alpha),
                );
            }
        }

        RgbaImage::from_raw(self.width, self.height, packed)
            .unwrap_or_else(|| RgbaImage::new(self.width, self.height))
    }

    /// Pixel bytes of row `y`, excluding stride padding
    fn row(&self, y: usize) -> &'a [u8] {
        let start = y * self.stride;
        let len = self.width as usize * self.layout.bytes_per_pixel();
        self.data.get(start..start + len).unwrap_or_default()
    }
}

/// Encoded network input, `[1, 3, H, W]` with channels in R, G, B order
#[derive(Debug, Clone, PartialEq)]
pub enum InputTensor {
    /// Samples normalized to `[0, 1]`
    Float(Array4<f32>),
    /// Raw 0-255 samples
    Quantized(Array4<u8>),
}

impl InputTensor {
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Float(t) => t.shape(),
            Self::Quantized(t) => t.shape(),
        }
    }

    #[must_use]
    pub fn precision(&self) -> Precision {
        match self {
            Self::Float(_) => Precision::Float,
            Self::Quantized(_) => Precision::Quantized,
        }
    }
}

/// Encode pixels into the channel-major tensor the selected model expects
#[must_use]
pub fn encode(pixels: &PixelBuffer<'_>, precision: Precision) -> InputTensor {
    match precision {
        Precision::Float => InputTensor::Float(fill_planes(pixels, |v| f32::from(v) / 255.0)),
        Precision::Quantized => InputTensor::Quantized(fill_planes(pixels, |v| v)),
    }
}

fn fill_planes<T, F>(pixels: &PixelBuffer<'_>, convert: F) -> Array4<T>
where
    T: Clone + Default,
    F: Fn(u8) -> T,
{
    let width = pixels.width as usize;
    let height = pixels.height as usize;
    let bpp = pixels.layout.bytes_per_pixel();
    let offsets = pixels.layout.rgb_offsets();

    let mut tensor = Array4::<T>::from_elem((1, 3, height, width), T::default());

    #[allow(clippy::indexing_slicing)]
    // Safe: tensor dimensions match the validated buffer geometry
    for y in 0..height {
        let row = pixels.row(y);
        for (x, pixel) in row.chunks_exact(bpp).enumerate() {
            for (channel, &offset) in offsets.iter().enumerate() {
                tensor[[0, channel, y, x]] = convert(pixel[offset]);
            }
        }
    }

    tensor
}
