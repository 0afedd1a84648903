//! Media decoding boundary.
//!
//! The analysis pipeline only needs two things from media files: a stream of
//! RGB frames with a known native frame rate, and still images for the known
//! persons' reference photos.

mod decoder;
mod ffmpeg;
mod photo;

pub use decoder::{DecodeError, Frame, StreamInfo, VideoDecoder, VideoStream};
pub use ffmpeg::{FfmpegDecoder, parse_frame_rate};
pub use photo::load_photo;
