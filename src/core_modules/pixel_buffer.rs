// THEORY:
// `PixelBuffer` owns one contiguous, row-major `Vec<Pixel>` together with the grid
// shape. Like the old `Chunk`, it is a data container, but unlike `Chunk` it
// enforces its shape: `pixels.len() == width * height` holds for every value that
// exists. The dimensions are private and never change after construction.
//
// Buffers normally come out of `codec::decode`. `from_pixels` is the checked
// constructor for everything else (interop, tests, the parallel pipeline stitching
// bands back together).

use crate::core_modules::error::FormatError;
use crate::core_modules::pixel::Pixel;

/// A width×height grid of RGB pixels, stored row-major.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PixelBuffer {
    width: usize,
    height: usize,
    pixels: Vec<Pixel>,
}

impl PixelBuffer {
    /// Wraps `pixels` as a `width`×`height` grid.
    ///
    /// Fails with [`FormatError::PixelCountMismatch`] if the length does not match
    /// the shape, or [`FormatError::DimensionsTooLarge`] if the shape overflows.
    pub fn from_pixels(width: usize, height: usize, pixels: Vec<Pixel>) -> Result<Self, FormatError> {
        let expected = width
            .checked_mul(height)
            .ok_or(FormatError::DimensionsTooLarge { width, height })?;
        if pixels.len() != expected {
            return Err(FormatError::PixelCountMismatch {
                width,
                height,
                expected,
                found: pixels.len(),
            });
        }
        Ok(Self { width, height, pixels })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    /// True when the buffer holds no pixels (either dimension is zero).
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn pixels(&self) -> &[Pixel] {
        &self.pixels
    }

    /// Row-major index of (row, col).
    #[inline]
    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.width + col
    }

    pub fn pixel(&self, row: usize, col: usize) -> Option<&Pixel> {
        if row >= self.height || col >= self.width {
            return None;
        }
        self.pixels.get(self.index(row, col))
    }

    /// The pixels of one row, or `None` past the last row.
    pub fn row(&self, row: usize) -> Option<&[Pixel]> {
        if row >= self.height {
            return None;
        }
        let start = row * self.width;
        Some(&self.pixels[start..start + self.width])
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Pixel]> {
        // `chunks_exact(0)` panics, and a zero-width buffer has no pixels anyway.
        self.pixels.chunks_exact(self.width.max(1))
    }

    /// Mutable rows. Only the blur stage touches pixels in place, and it cannot
    /// change the shape through this.
    pub(crate) fn rows_mut(&mut self) -> impl Iterator<Item = &mut [Pixel]> {
        self.pixels.chunks_exact_mut(self.width.max(1))
    }

    pub fn into_pixels(self) -> Vec<Pixel> {
        self.pixels
    }
}
