// THEORY:
// Every failure the core can produce is a typed value, never a process exit.
// The taxonomy has three roots that mirror the three stages of the tool:
//   • `FormatError`: the text stream was readable but its content is wrong.
//   • `CodecError`: the decode/encode boundary: either a `FormatError` or an I/O failure.
//   • `BlurError`: the filter was asked to operate on a buffer with no pixels.
// The pipeline layers wrap these with path context (see `pipeline::PipelineError`).

use thiserror::Error;

/// Malformed content in a P3 stream, or a pixel grid whose shape is inconsistent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("unsupported format identifier {found:?}, expected \"P3\"")]
    IdentifierMismatch { found: String },
    #[error("{field} must be positive, got {value}")]
    NonPositiveDimension { field: &'static str, value: i64 },
    #[error("unsupported max channel value {found}, only 255 is supported")]
    UnsupportedMaxValue { found: i64 },
    #[error("header ended before the {field} field")]
    MissingHeaderField { field: &'static str },
    #[error("malformed token {token:?} at token #{position}")]
    MalformedToken { position: usize, token: String },
    #[error("channel value {value} at token #{position} exceeds 255")]
    ChannelOutOfRange { position: usize, value: u64 },
    #[error("pixel data truncated: expected {expected} pixels, found {found}")]
    TruncatedPixelData { expected: usize, found: usize },
    #[error("image dimensions {width}x{height} are too large")]
    DimensionsTooLarge { width: usize, height: usize },
    #[error("{width}x{height} image needs {expected} pixels, got {found}")]
    PixelCountMismatch {
        width: usize,
        height: usize,
        expected: usize,
        found: usize,
    },
}

/// Failure at the codec boundary.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("format error: {0}")]
    Format(#[from] FormatError),
}

impl CodecError {
    pub fn is_format(&self) -> bool {
        matches!(self, CodecError::Format(_))
    }

    pub fn format_error(&self) -> Option<&FormatError> {
        match self {
            CodecError::Format(err) => Some(err),
            CodecError::Io(_) => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlurError {
    #[error("cannot blur an empty {width}x{height} buffer")]
    EmptyBuffer { width: usize, height: usize },
}
