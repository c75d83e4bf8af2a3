//! Media assembly: slideshow encoding, audio splicing and muxing.
//!
//! Everything here shells out to ffmpeg/ffprobe. The [`Encoder`] trait is
//! the seam the pipeline depends on, so tests can swap in a mock.

pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod traits;
pub mod types;

pub use config::EncoderConfig;
pub use error::EncoderError;
pub use ffmpeg::FfmpegEncoder;
pub use traits::Encoder;
pub use types::{EncodedTrack, MediaInfo, SlideFrame};
