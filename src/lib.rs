// THEORY:
// This file is the entry point for the `ppm_blur` library crate. It exposes the
// two pipelines as the high-level API, and re-exports the three core entry points
// (`decode`, `encode`, `blur`) for callers that want to drive the stages
// themselves. The data model, the codec and the filter live in `core_modules`.

pub mod core_modules;
pub mod parallel_pipeline;
pub mod pipeline;

pub use core_modules::blur::{BlurFilter, DEFAULT_BLUR_AMOUNT, blur, blur_in_place};
pub use core_modules::codec::{EncodeOptions, decode, decode_file, encode, encode_file};
pub use core_modules::error::{BlurError, CodecError, FormatError};
pub use core_modules::pixel::Pixel;
pub use core_modules::pixel_buffer::PixelBuffer;
pub use parallel_pipeline::ParallelPipeline;
pub use pipeline::{BlurPipeline, BlurReport, PipelineConfig, PipelineError};
