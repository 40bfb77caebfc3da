// Conversions between `PixelBuffer` and the `image` crate's `RgbImage`, so callers
// that already work with `image` can feed the blur without going through text.

use crate::core_modules::error::FormatError;
use crate::core_modules::pixel::Pixel;
use crate::core_modules::pixel_buffer::PixelBuffer;
use image::{Rgb, RgbImage};

impl TryFrom<&PixelBuffer> for RgbImage {
    type Error = FormatError;

    fn try_from(buffer: &PixelBuffer) -> Result<Self, Self::Error> {
        let too_large = || FormatError::DimensionsTooLarge {
            width: buffer.width(),
            height: buffer.height(),
        };
        let width = u32::try_from(buffer.width()).map_err(|_| too_large())?;
        let height = u32::try_from(buffer.height()).map_err(|_| too_large())?;
        let raw: Vec<u8> = buffer.pixels().iter().flat_map(|p| p.channels()).collect();
        RgbImage::from_raw(width, height, raw).ok_or_else(too_large)
    }
}

impl TryFrom<&RgbImage> for PixelBuffer {
    type Error = FormatError;

    fn try_from(image: &RgbImage) -> Result<Self, Self::Error> {
        if image.width() == 0 {
            return Err(FormatError::NonPositiveDimension { field: "width", value: 0 });
        }
        if image.height() == 0 {
            return Err(FormatError::NonPositiveDimension { field: "height", value: 0 });
        }
        let pixels = image.pixels().map(|&Rgb(channels)| Pixel::from(channels)).collect();
        PixelBuffer::from_pixels(image.width() as usize, image.height() as usize, pixels)
    }
}
