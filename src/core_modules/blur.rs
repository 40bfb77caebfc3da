// THEORY:
// The blur is a one-directional, per-row weighted average. Every output channel
// keeps half of its original weight, and the other half is spread evenly over the
// next `reach` pixels to its right in the same row:
//
//     out = orig * 0.5 + Σ_{j=1..reach} row[col + j] * (0.5 / reach)
//     reach = min(amount, width - col - 1)
//
// Key properties:
// 1.  **Row locality**: a row's output depends only on that row's original values,
//     so rows can be computed in any order or in parallel.
// 2.  **Shrinking window at the edge**: near the right edge `reach` shrinks so the
//     window never leaves the row. At the last column `reach == 0` and the pixel is
//     copied unchanged.
// 3.  **Exact truncation**: the formula is evaluated as the integer quotient
//     `(orig * reach + Σ neighbors) / (2 * reach)`, which is the truncated real value
//     with no float error. The result always lies between the window's min and max.
// 4.  **Never read what was written**: the kernel reads a source row and writes a
//     separate destination row. `blur_in_place` snapshots each row first.

use crate::core_modules::error::BlurError;
use crate::core_modules::pixel::{CHANNELS, Channel, Pixel};
use crate::core_modules::pixel_buffer::PixelBuffer;
use log::debug;
use std::ops::Range;

pub const DEFAULT_BLUR_AMOUNT: usize = 50;

/// Number of right neighbors that take part in the average for `col`.
#[inline]
pub fn effective_reach(amount: usize, width: usize, col: usize) -> usize {
    amount.min(width.saturating_sub(col + 1))
}

#[inline]
fn weighted_channel(original: Channel, neighbor_sum: u64, reach: usize) -> Channel {
    let reach = reach as u64;
    // neighbor_sum <= 255 * reach, so the quotient never exceeds 255.
    ((original as u64 * reach + neighbor_sum) / (2 * reach)) as Channel
}

/// Blurs one row from `source` into `out`. Both slices must have the same length.
///
/// Neighbor sums come from a running prefix sum, so the cost per row is linear in
/// its width regardless of `amount`.
pub fn blur_row(source: &[Pixel], amount: usize, out: &mut [Pixel]) {
    debug_assert_eq!(source.len(), out.len());
    let width = source.len();

    let mut prefix: Vec<[u64; CHANNELS]> = Vec::with_capacity(width + 1);
    let mut running = [0u64; CHANNELS];
    prefix.push(running);
    for pixel in source {
        for (sum, value) in running.iter_mut().zip(pixel.channels()) {
            *sum += value as u64;
        }
        prefix.push(running);
    }

    for (col, (original, target)) in source.iter().zip(out.iter_mut()).enumerate() {
        let reach = effective_reach(amount, width, col);
        if reach == 0 {
            *target = *original;
            continue;
        }
        let (start, end) = (&prefix[col + 1], &prefix[col + reach + 1]);
        *target = original.map_channels(|channel, value| weighted_channel(value, end[channel] - start[channel], reach));
    }
}

/// Blurs the rows in `rows` of `source` and returns them as a flat row-major vector.
///
/// This is the unit of work for the parallel pipeline. `rows` is clamped to the
/// buffer's height.
pub fn blur_band(source: &PixelBuffer, rows: Range<usize>, amount: usize) -> Vec<Pixel> {
    let width = source.width();
    let rows = rows.start.min(source.height())..rows.end.min(source.height());
    let mut band = vec![Pixel::default(); rows.len() * width];
    for (row, out) in rows.zip(band.chunks_exact_mut(width.max(1))) {
        if let Some(src) = source.row(row) {
            blur_row(src, amount, out);
        }
    }
    band
}

fn ensure_not_empty(buffer: &PixelBuffer) -> Result<(), BlurError> {
    if buffer.is_empty() {
        return Err(BlurError::EmptyBuffer {
            width: buffer.width(),
            height: buffer.height(),
        });
    }
    Ok(())
}

/// The horizontal blur, configured with its reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlurFilter {
    amount: usize,
}

impl Default for BlurFilter {
    fn default() -> Self {
        Self::new(DEFAULT_BLUR_AMOUNT)
    }
}

impl BlurFilter {
    pub fn new(amount: usize) -> Self {
        Self { amount }
    }

    pub fn amount(&self) -> usize {
        self.amount
    }

    /// Returns a blurred copy of `buffer`. The source is never modified.
    pub fn apply(&self, buffer: &PixelBuffer) -> Result<PixelBuffer, BlurError> {
        ensure_not_empty(buffer)?;
        let mut output = buffer.clone();
        for (source, target) in buffer.rows().zip(output.rows_mut()) {
            blur_row(source, self.amount, target);
        }
        debug!(
            "blurred {}x{} buffer with amount {}",
            buffer.width(),
            buffer.height(),
            self.amount
        );
        Ok(output)
    }

    /// Blurs `buffer` in place, one row snapshot at a time.
    pub fn apply_in_place(&self, buffer: &mut PixelBuffer) -> Result<(), BlurError> {
        ensure_not_empty(buffer)?;
        let mut snapshot = Vec::with_capacity(buffer.width());
        for row in buffer.rows_mut() {
            snapshot.clear();
            snapshot.extend_from_slice(row);
            blur_row(&snapshot, self.amount, row);
        }
        Ok(())
    }
}

/// Returns `buffer` blurred with the given reach.
pub fn blur(buffer: &PixelBuffer, amount: usize) -> Result<PixelBuffer, BlurError> {
    BlurFilter::new(amount).apply(buffer)
}

pub fn blur_in_place(buffer: &mut PixelBuffer, amount: usize) -> Result<(), BlurError> {
    BlurFilter::new(amount).apply_in_place(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reds(values: &[u8]) -> PixelBuffer {
        let pixels = values.iter().map(|&r| Pixel::new(r, 0, 0)).collect();
        PixelBuffer::from_pixels(values.len(), 1, pixels).unwrap()
    }

    fn red_channel(buffer: &PixelBuffer) -> Vec<u8> {
        buffer.pixels().iter().map(|p| p.red).collect()
    }

    fn noisy(width: usize, height: usize) -> PixelBuffer {
        let mut state = 0x2545_f491_u32;
        let pixels = (0..width * height)
            .map(|_| {
                let mut next = || {
                    state ^= state << 13;
                    state ^= state >> 17;
                    state ^= state << 5;
                    (state >> 24) as u8
                };
                Pixel::new(next(), next(), next())
            })
            .collect();
        PixelBuffer::from_pixels(width, height, pixels).unwrap()
    }

    #[test]
    fn three_pixel_row_matches_worked_example() {
        let blurred = blur(&reds(&[200, 100, 0]), DEFAULT_BLUR_AMOUNT).unwrap();
        assert_eq!(red_channel(&blurred), vec![125, 50, 0]);
    }

    #[test]
    fn single_pixel_is_unchanged() {
        let buffer = PixelBuffer::from_pixels(1, 1, vec![Pixel::new(9, 99, 199)]).unwrap();
        assert_eq!(blur(&buffer, DEFAULT_BLUR_AMOUNT).unwrap(), buffer);
    }

    #[test]
    fn window_shrinks_at_the_right_edge() {
        let blurred = blur(&reds(&[100, 0, 0, 255, 255]), 2).unwrap();
        // col 0: (100*2 + 0 + 0) / 4, col 1: (0*2 + 0 + 255) / 4, col 2: (0*2 + 255 + 255) / 4,
        // col 3: reach 1, (255 + 255) / 2, col 4: unchanged.
        assert_eq!(red_channel(&blurred), vec![50, 63, 127, 255, 255]);
    }

    #[test]
    fn averages_truncate_toward_zero() {
        let blurred = blur(&reds(&[1, 0]), 1).unwrap();
        assert_eq!(red_channel(&blurred), vec![0, 0]);
        let blurred = blur(&reds(&[254, 255, 255]), 2).unwrap();
        assert_eq!(red_channel(&blurred), vec![254, 255, 255]);
    }

    #[test]
    fn zero_amount_is_identity() {
        let buffer = noisy(8, 3);
        assert_eq!(blur(&buffer, 0).unwrap(), buffer);
    }

    #[test]
    fn preserves_dimensions_and_last_column() {
        let buffer = noisy(13, 7);
        let blurred = blur(&buffer, 4).unwrap();
        assert_eq!(blurred.width(), buffer.width());
        assert_eq!(blurred.height(), buffer.height());
        for row in 0..buffer.height() {
            assert_eq!(blurred.pixel(row, 12), buffer.pixel(row, 12));
        }
    }

    #[test]
    fn output_stays_within_window_bounds() {
        let buffer = noisy(40, 5);
        let amount = 6;
        let blurred = blur(&buffer, amount).unwrap();
        for row in 0..buffer.height() {
            let source = buffer.row(row).unwrap();
            for col in 0..buffer.width() {
                let reach = effective_reach(amount, buffer.width(), col);
                let window = &source[col..=col + reach];
                let out = blurred.pixel(row, col).unwrap().channels();
                for channel in 0..CHANNELS {
                    let lo = window.iter().map(|p| p.channels()[channel]).min().unwrap();
                    let hi = window.iter().map(|p| p.channels()[channel]).max().unwrap();
                    assert!(lo <= out[channel] && out[channel] <= hi, "({}, {}) channel {}", row, col, channel);
                }
            }
        }
    }

    #[test]
    fn rows_do_not_leak_into_each_other() {
        let top = [Pixel::new(10, 20, 30); 4];
        let buffer_a = PixelBuffer::from_pixels(4, 2, [top, [Pixel::new(0, 0, 0); 4]].concat()).unwrap();
        let buffer_b = PixelBuffer::from_pixels(4, 2, [top, [Pixel::new(255, 255, 255); 4]].concat()).unwrap();
        let a = blur(&buffer_a, 3).unwrap();
        let b = blur(&buffer_b, 3).unwrap();
        assert_eq!(a.row(0), b.row(0));
        assert_eq!(a.row(0).unwrap(), &top);
    }

    #[test]
    fn in_place_matches_copying_blur() {
        let buffer = noisy(31, 4);
        let expected = blur(&buffer, 9).unwrap();
        let mut in_place = buffer.clone();
        blur_in_place(&mut in_place, 9).unwrap();
        assert_eq!(in_place, expected);
    }

    #[test]
    fn band_matches_rows_of_full_blur() {
        let buffer = noisy(9, 6);
        let full = blur(&buffer, 3).unwrap();
        let band = blur_band(&buffer, 2..5, 3);
        assert_eq!(band.as_slice(), &full.pixels()[2 * 9..5 * 9]);
        assert!(blur_band(&buffer, 6..8, 3).is_empty());
    }

    #[test]
    fn empty_buffer_is_rejected() {
        let empty = PixelBuffer::from_pixels(0, 5, Vec::new()).unwrap();
        assert_eq!(blur(&empty, 3), Err(BlurError::EmptyBuffer { width: 0, height: 5 }));
        let mut empty = PixelBuffer::default();
        assert_eq!(
            blur_in_place(&mut empty, 3),
            Err(BlurError::EmptyBuffer { width: 0, height: 0 })
        );
    }
}
