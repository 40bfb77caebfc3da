pub mod blur;
pub mod codec;
pub mod error;
pub mod pixel;
pub mod pixel_buffer;
pub mod utils;
