// THEORY:
// The `pipeline` module is the top-level API: read a P3 file, blur it, write it
// back. It owns no image logic of its own; it wires the codec and the filter
// together, attaches file paths to failures, and measures each stage so a runner
// can report timings.
//
// Configuration is an explicit `PipelineConfig` value. Nothing in the crate reads
// global flags; `from_env` is only a convenience for runners.

use crate::core_modules::blur::{BlurFilter, DEFAULT_BLUR_AMOUNT};
use crate::core_modules::codec::{self, DEFAULT_PIXELS_PER_LINE, EncodeOptions};
use crate::core_modules::error::{BlurError, CodecError};
use crate::core_modules::pixel_buffer::PixelBuffer;
use log::{debug, info, warn};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

// Re-export key data structures for the public API.
pub use crate::core_modules::error::FormatError;

pub const ENV_BLUR_AMOUNT: &str = "BLUR_AMOUNT";
pub const ENV_WORKERS: &str = "BLUR_WORKERS";
pub const ENV_PIXELS_PER_LINE: &str = "BLUR_PIXELS_PER_LINE";

/// Configuration for the blur pipelines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// How many right-hand neighbors each pixel is averaged with.
    pub blur_amount: usize,
    /// Pixels per output line when encoding. 0 disables wrapping.
    pub pixels_per_line: usize,
    /// Worker count hint for `ParallelPipeline`. `None` means one per CPU.
    pub worker_count: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            blur_amount: DEFAULT_BLUR_AMOUNT,
            pixels_per_line: DEFAULT_PIXELS_PER_LINE,
            worker_count: None,
        }
    }
}

impl PipelineConfig {
    /// Defaults overlaid with `BLUR_AMOUNT`, `BLUR_WORKERS` and `BLUR_PIXELS_PER_LINE`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    /// Unparsable values are ignored with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| -> Option<usize> {
            let raw = lookup(key)?;
            match raw.trim().parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("ignoring {}={:?}: not a non-negative integer", key, raw);
                    None
                }
            }
        };

        let mut config = Self::default();
        if let Some(amount) = read(ENV_BLUR_AMOUNT) {
            config.blur_amount = amount;
        }
        if let Some(per_line) = read(ENV_PIXELS_PER_LINE) {
            config.pixels_per_line = per_line;
        }
        config.worker_count = match read(ENV_WORKERS) {
            Some(0) => {
                warn!("ignoring {}=0: at least one worker is required", ENV_WORKERS);
                None
            }
            other => other,
        };
        config
    }

    pub fn encode_options(&self) -> EncodeOptions {
        EncodeOptions {
            pixels_per_line: self.pixels_per_line,
        }
    }

    /// Worker count to use for an image with `rows` rows: the hint (or the CPU
    /// count) clamped to `1..=rows`.
    pub fn resolved_worker_count(&self, rows: usize) -> usize {
        let hint = self.worker_count.unwrap_or_else(num_cpus::get);
        hint.clamp(1, rows.max(1))
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to read {}: {source}", .path.display())]
    Read { path: PathBuf, source: CodecError },
    #[error("failed to write {}: {source}", .path.display())]
    Write { path: PathBuf, source: CodecError },
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Blur(#[from] BlurError),
    #[error("blur worker pool is unavailable")]
    WorkerUnavailable,
}

impl PipelineError {
    /// Process exit code for runners: 1 format, 2 i/o, 3 empty buffer, 4 worker.
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::Read { source, .. } | PipelineError::Write { source, .. } | PipelineError::Codec(source) => {
                match source {
                    CodecError::Format(_) => 1,
                    CodecError::Io(_) => 2,
                }
            }
            PipelineError::Blur(_) => 3,
            PipelineError::WorkerUnavailable => 4,
        }
    }
}

/// What a finished run did, and how long each stage took.
#[derive(Debug, Clone, PartialEq)]
pub struct BlurReport {
    pub width: usize,
    pub height: usize,
    pub blur_amount: usize,
    pub workers: usize,
    pub decode_time: Duration,
    pub blur_time: Duration,
    pub encode_time: Duration,
}

impl BlurReport {
    pub fn total_time(&self) -> Duration {
        self.decode_time + self.blur_time + self.encode_time
    }
}

/// The sequential read → blur → write pipeline.
pub struct BlurPipeline {
    config: PipelineConfig,
    filter: BlurFilter,
}

impl BlurPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let filter = BlurFilter::new(config.blur_amount);
        Self { config, filter }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Blurs an already decoded buffer.
    pub fn process(&self, buffer: &PixelBuffer) -> Result<PixelBuffer, PipelineError> {
        Ok(self.filter.apply(buffer)?)
    }

    /// Decodes from `input`, blurs, and encodes into `output`.
    pub fn run_streams<R: Read, W: Write>(&self, input: R, output: W) -> Result<BlurReport, PipelineError> {
        let started = Instant::now();
        let buffer = codec::decode(input)?;
        let decode_time = started.elapsed();

        self.finish(buffer, decode_time, |blurred, options| codec::encode(blurred, output, options).map_err(PipelineError::from))
    }

    /// Reads `input`, blurs it, and writes the result to `output`.
    pub fn run(&self, input: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<BlurReport, PipelineError> {
        let (input, output) = (input.as_ref(), output.as_ref());
        info!("blurring {} -> {}", input.display(), output.display());

        let started = Instant::now();
        let buffer = codec::decode_file(input).map_err(|source| PipelineError::Read {
            path: input.to_path_buf(),
            source,
        })?;
        let decode_time = started.elapsed();

        self.finish(buffer, decode_time, |blurred, options| {
            codec::encode_file(blurred, output, options).map_err(|source| PipelineError::Write {
                path: output.to_path_buf(),
                source,
            })
        })
    }

    fn finish(
        &self,
        buffer: PixelBuffer,
        decode_time: Duration,
        write: impl FnOnce(&PixelBuffer, &EncodeOptions) -> Result<(), PipelineError>,
    ) -> Result<BlurReport, PipelineError> {
        debug!("decoded {}x{} in {:?}", buffer.width(), buffer.height(), decode_time);

        let started = Instant::now();
        let blurred = self.process(&buffer)?;
        let blur_time = started.elapsed();

        let started = Instant::now();
        write(&blurred, &self.config.encode_options())?;
        let encode_time = started.elapsed();

        Ok(BlurReport {
            width: blurred.width(),
            height: blurred.height(),
            blur_amount: self.config.blur_amount,
            workers: 1,
            decode_time,
            blur_time,
            encode_time,
        })
    }
}
