// THEORY:
// The codec is the only place that knows about the P3 wire format. The format
// is a flat stream of ASCII-whitespace separated tokens:
//
//     P3  <width>  <height>  <max>  (<r> <g> <b>) * width*height
//
// Line structure carries no meaning, so decoding is a tokenizer plus a small
// state machine: header fields are read and validated one at a time, then
// exactly width*height triples are pulled. Any failure aborts the whole decode,
// so a caller can never observe a half-filled buffer.
//
// Encoding is the mirror image: a three-line header followed by the channel
// values, wrapped after a configurable number of pixels for readability.

use crate::core_modules::error::{CodecError, FormatError};
use crate::core_modules::pixel::{Channel, Pixel};
use crate::core_modules::pixel_buffer::PixelBuffer;
use log::{debug, trace};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

pub const IDENTIFIER: &str = "P3";
pub const MAX_CHANNEL_VALUE: i64 = 255;
pub const DEFAULT_PIXELS_PER_LINE: usize = 5;

// Upper bound on the up-front allocation; a lying header should fail on
// truncation, not on a giant reservation.
const MAX_PREALLOCATED_PIXELS: usize = 1 << 20;

/// Formatting knobs for [`encode`]. None of them affect what [`decode`] reads back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Insert a newline after this many pixels. 0 writes all pixels on one line.
    pub pixels_per_line: usize,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            pixels_per_line: DEFAULT_PIXELS_PER_LINE,
        }
    }
}

/// Pulls whitespace-delimited tokens out of a buffered reader without loading
/// the whole stream.
struct Tokens<R> {
    reader: R,
    scratch: Vec<u8>,
    position: usize,
}

impl<R: BufRead> Tokens<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            scratch: Vec::with_capacity(16),
            position: 0,
        }
    }

    /// The next token, or `None` at end of stream.
    fn next_token(&mut self) -> io::Result<Option<&[u8]>> {
        self.scratch.clear();
        loop {
            let available = match self.reader.fill_buf() {
                Ok(bytes) => bytes,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            };
            if available.is_empty() {
                break;
            }

            let mut consumed = 0;
            let mut complete = false;
            for &byte in available {
                consumed += 1;
                if byte.is_ascii_whitespace() {
                    if !self.scratch.is_empty() {
                        complete = true;
                        break;
                    }
                } else {
                    self.scratch.push(byte);
                }
            }
            self.reader.consume(consumed);
            if complete {
                break;
            }
        }

        if self.scratch.is_empty() {
            return Ok(None);
        }
        self.position += 1;
        Ok(Some(self.scratch.as_slice()))
    }

    fn malformed(&self, token: &[u8]) -> FormatError {
        FormatError::MalformedToken {
            position: self.position,
            token: String::from_utf8_lossy(token).into_owned(),
        }
    }

    fn header_field(&mut self, field: &'static str) -> Result<i64, CodecError> {
        let position = self.position + 1;
        let token = self
            .next_token()?
            .ok_or(FormatError::MissingHeaderField { field })?;
        parse_ascii::<i64>(token).ok_or_else(|| {
            FormatError::MalformedToken {
                position,
                token: String::from_utf8_lossy(token).into_owned(),
            }
            .into()
        })
    }

    /// One channel value, or `Ok(None)` if the stream ended.
    fn channel(&mut self) -> Result<Option<Channel>, CodecError> {
        let Some(token) = self.next_token()? else {
            return Ok(None);
        };
        let Some(value) = parse_ascii::<u64>(token) else {
            let token = token.to_vec();
            return Err(self.malformed(&token).into());
        };
        let channel = Channel::try_from(value).map_err(|_| FormatError::ChannelOutOfRange {
            position: self.position,
            value,
        })?;
        Ok(Some(channel))
    }
}

fn parse_ascii<T: std::str::FromStr>(token: &[u8]) -> Option<T> {
    std::str::from_utf8(token).ok()?.parse().ok()
}

fn dimension(field: &'static str, value: i64) -> Result<usize, FormatError> {
    if value <= 0 {
        return Err(FormatError::NonPositiveDimension { field, value });
    }
    usize::try_from(value).map_err(|_| FormatError::NonPositiveDimension { field, value })
}

/// Parses a P3 stream into a [`PixelBuffer`].
///
/// The header is validated in order (identifier, width, height, max value) and
/// then exactly `width * height` pixels are read. Trailing tokens are ignored.
pub fn decode<R: Read>(input: R) -> Result<PixelBuffer, CodecError> {
    let mut tokens = Tokens::new(BufReader::new(input));

    let identifier = tokens
        .next_token()?
        .ok_or(FormatError::MissingHeaderField {
            field: "format identifier",
        })?;
    if identifier != IDENTIFIER.as_bytes() {
        return Err(FormatError::IdentifierMismatch {
            found: String::from_utf8_lossy(identifier).into_owned(),
        }
        .into());
    }

    let width = dimension("width", tokens.header_field("width")?)?;
    let height = dimension("height", tokens.header_field("height")?)?;
    let max_value = tokens.header_field("max channel value")?;
    if max_value != MAX_CHANNEL_VALUE {
        return Err(FormatError::UnsupportedMaxValue { found: max_value }.into());
    }

    let expected = width
        .checked_mul(height)
        .ok_or(FormatError::DimensionsTooLarge { width, height })?;
    debug!("decoding P3 header: {}x{} ({} pixels)", width, height, expected);

    let mut pixels = Vec::with_capacity(expected.min(MAX_PREALLOCATED_PIXELS));
    for found in 0..expected {
        let truncated = FormatError::TruncatedPixelData { expected, found };
        let red = tokens.channel()?.ok_or_else(|| truncated.clone())?;
        let green = tokens.channel()?.ok_or_else(|| truncated.clone())?;
        let blue = tokens.channel()?.ok_or(truncated)?;
        pixels.push(Pixel::new(red, green, blue));
    }
    trace!("decoded {} pixels from {} tokens", pixels.len(), tokens.position);

    Ok(PixelBuffer::from_pixels(width, height, pixels)?)
}

/// Opens `path` and decodes it. An unopenable file is a [`CodecError::Io`].
pub fn decode_file(path: impl AsRef<Path>) -> Result<PixelBuffer, CodecError> {
    let file = File::open(path)?;
    decode(file)
}

/// Serializes `buffer` as P3 text into `output`.
///
/// The only possible failure is the destination refusing a write.
pub fn encode<W: Write>(buffer: &PixelBuffer, mut output: W, options: &EncodeOptions) -> Result<(), CodecError> {
    writeln!(output, "{}", IDENTIFIER)?;
    writeln!(output, "{} {}", buffer.width(), buffer.height())?;
    writeln!(output, "{}", MAX_CHANNEL_VALUE)?;

    let mut on_line = 0;
    for pixel in buffer.pixels() {
        let [red, green, blue] = pixel.channels();
        write!(output, "{} {} {} ", red, green, blue)?;
        on_line += 1;
        if options.pixels_per_line != 0 && on_line == options.pixels_per_line {
            writeln!(output)?;
            on_line = 0;
        }
    }
    if on_line != 0 {
        writeln!(output)?;
    }
    output.flush()?;
    debug!(
        "encoded {}x{} buffer, {} pixels per line",
        buffer.width(),
        buffer.height(),
        options.pixels_per_line
    );
    Ok(())
}

/// Creates (or truncates) `path` and encodes `buffer` into it.
pub fn encode_file(buffer: &PixelBuffer, path: impl AsRef<Path>, options: &EncodeOptions) -> Result<(), CodecError> {
    let file = File::create(path)?;
    encode(buffer, BufWriter::new(file), options)
}

/// Encodes into an in-memory byte vector.
pub fn encode_to_vec(buffer: &PixelBuffer, options: &EncodeOptions) -> Vec<u8> {
    let mut bytes = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = encode(buffer, &mut bytes, options);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_str(text: &str) -> Result<PixelBuffer, CodecError> {
        decode(text.as_bytes())
    }

    fn format_err(text: &str) -> FormatError {
        match decode_str(text) {
            Err(CodecError::Format(err)) => err,
            other => panic!("expected a format error, got {:?}", other),
        }
    }

    fn sample(width: usize, height: usize) -> PixelBuffer {
        let pixels = (0..width * height)
            .map(|i| Pixel::new((i * 7 % 256) as u8, (i * 13 % 256) as u8, (255 - i % 256) as u8))
            .collect();
        PixelBuffer::from_pixels(width, height, pixels).unwrap()
    }

    #[test]
    fn decodes_minimal_image() {
        let buffer = decode_str("P3\n2 1\n255\n1 2 3  4 5 6\n").unwrap();
        assert_eq!(buffer.width(), 2);
        assert_eq!(buffer.height(), 1);
        assert_eq!(buffer.pixels(), &[Pixel::new(1, 2, 3), Pixel::new(4, 5, 6)]);
    }

    #[test]
    fn decode_ignores_line_structure() {
        let buffer = decode_str("P3 2\n\t1 255 1\n2\n3 4 5 6").unwrap();
        assert_eq!(buffer.pixels(), &[Pixel::new(1, 2, 3), Pixel::new(4, 5, 6)]);
    }

    #[test]
    fn decode_ignores_trailing_tokens() {
        let buffer = decode_str("P3 1 1 255 9 9 9 extra 1 2").unwrap();
        assert_eq!(buffer.pixels(), &[Pixel::new(9, 9, 9)]);
    }

    #[test]
    fn rejects_wrong_identifier() {
        assert_eq!(
            format_err("P6 1 1 255 0 0 0"),
            FormatError::IdentifierMismatch { found: "P6".into() }
        );
    }

    #[test]
    fn rejects_non_positive_dimensions() {
        assert_eq!(
            format_err("P3 0 1 255"),
            FormatError::NonPositiveDimension { field: "width", value: 0 }
        );
        assert_eq!(
            format_err("P3 2 -3 255"),
            FormatError::NonPositiveDimension { field: "height", value: -3 }
        );
    }

    #[test]
    fn rejects_unsupported_max_value() {
        assert_eq!(
            format_err("P3 1 1 65535 0 0 0"),
            FormatError::UnsupportedMaxValue { found: 65535 }
        );
        assert_eq!(format_err("P3 1 1 15 0 0 0"), FormatError::UnsupportedMaxValue { found: 15 });
    }

    #[test]
    fn rejects_missing_and_malformed_header_fields() {
        assert_eq!(
            format_err(""),
            FormatError::MissingHeaderField { field: "format identifier" }
        );
        assert_eq!(format_err("P3 4"), FormatError::MissingHeaderField { field: "height" });
        assert_eq!(
            format_err("P3 four 1 255"),
            FormatError::MalformedToken { position: 2, token: "four".into() }
        );
    }

    #[test]
    fn rejects_truncated_pixel_data() {
        assert_eq!(
            format_err("P3 2 2 255 1 2 3 4 5 6 7 8 9 10 11"),
            FormatError::TruncatedPixelData { expected: 4, found: 3 }
        );
        assert_eq!(
            format_err("P3 1 1 255"),
            FormatError::TruncatedPixelData { expected: 1, found: 0 }
        );
    }

    #[test]
    fn rejects_malformed_and_out_of_range_channels() {
        assert_eq!(
            format_err("P3 1 1 255 1 x 3"),
            FormatError::MalformedToken { position: 6, token: "x".into() }
        );
        assert_eq!(
            format_err("P3 1 1 255 1 -2 3"),
            FormatError::MalformedToken { position: 6, token: "-2".into() }
        );
        assert_eq!(
            format_err("P3 1 1 255 1 2 256"),
            FormatError::ChannelOutOfRange { position: 7, value: 256 }
        );
    }

    #[test]
    fn rejects_overflowing_dimensions() {
        let text = format!("P3 {} {} 255", i64::MAX, i64::MAX);
        assert!(matches!(format_err(&text), FormatError::DimensionsTooLarge { .. }));
    }

    #[test]
    fn unreadable_stream_is_io_error() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("disk on fire"))
            }
        }
        assert!(matches!(decode(Broken), Err(CodecError::Io(_))));
    }

    #[test]
    fn missing_file_is_io_error() {
        let path = std::env::temp_dir().join("ppm_blur_codec_missing_file.ppm");
        let _ = std::fs::remove_file(&path);
        assert!(matches!(decode_file(&path), Err(CodecError::Io(_))));
    }

    #[test]
    fn encode_writes_header_and_wraps_lines() {
        let buffer = sample(3, 1);
        let text = String::from_utf8(encode_to_vec(&buffer, &EncodeOptions { pixels_per_line: 2 })).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "P3");
        assert_eq!(lines[1], "3 1");
        assert_eq!(lines[2], "255");
        assert_eq!(lines[3], "0 0 255 7 13 254 ");
        assert_eq!(lines[4], "14 26 253 ");
        assert_eq!(lines.len(), 5);
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn encode_without_wrapping_uses_one_pixel_line() {
        let buffer = sample(4, 2);
        let text = String::from_utf8(encode_to_vec(&buffer, &EncodeOptions { pixels_per_line: 0 })).unwrap();
        assert_eq!(text.lines().count(), 4);
    }

    #[test]
    fn round_trips_across_wrap_settings() {
        let buffer = sample(17, 9);
        for pixels_per_line in [0, 1, 5, 16, 17, 1000] {
            let bytes = encode_to_vec(&buffer, &EncodeOptions { pixels_per_line });
            let decoded = decode(bytes.as_slice()).unwrap();
            assert_eq!(decoded, buffer, "pixels_per_line = {}", pixels_per_line);
        }
    }

    #[test]
    fn round_trips_extreme_channel_values() {
        let pixels = vec![Pixel::new(0, 255, 0), Pixel::new(255, 0, 255)];
        let buffer = PixelBuffer::from_pixels(1, 2, pixels).unwrap();
        let decoded = decode(encode_to_vec(&buffer, &EncodeOptions::default()).as_slice()).unwrap();
        assert_eq!(decoded, buffer);
    }

    #[test]
    fn unwritable_destination_is_io_error() {
        struct Full;
        impl Write for Full {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::StorageFull, "no space"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
        let result = encode(&sample(1, 1), Full, &EncodeOptions::default());
        assert!(matches!(result, Err(CodecError::Io(_))));
    }
}
