//! Decoder traits and types.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A decoded RGB24 frame.
pub type Frame = image::RgbImage;

/// Errors raised while opening or reading a video.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("failed to probe {path}: {reason}")]
    Probe { path: String, reason: String },

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("frame {frame_index} is corrupt: {reason}")]
    Corrupt { frame_index: u64, reason: String },

    #[error("frame {frame_index} truncated: expected {expected} bytes, got {received}")]
    Truncated {
        frame_index: u64,
        expected: usize,
        received: usize,
    },
}

/// Properties of an opened video stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    /// Native frames per second as reported by the container. May be zero or
    /// non-finite for broken files.
    pub fps: f64,
    /// Total frames, when the container reports it.
    pub frame_count: Option<u64>,
    pub width: u32,
    pub height: u32,
}

impl StreamInfo {
    pub fn duration_secs(&self) -> Option<f64> {
        match self.frame_count {
            Some(count) if self.fps.is_finite() && self.fps > 0.0 => Some(count as f64 / self.fps),
            _ => None,
        }
    }
}

/// A forward-only sequence of decoded frames.
pub trait VideoStream: Send {
    fn info(&self) -> &StreamInfo;

    /// The next native frame, `Some(Err(_))` for a frame that could not be
    /// decoded, or `None` once the stream is exhausted.
    fn next_frame(&mut self) -> Option<Result<Frame, DecodeError>>;
}

/// Opens video files for decoding.
pub trait VideoDecoder: Send + Sync {
    fn open(&self, path: &Path) -> crate::Result<Box<dyn VideoStream>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration() {
        let info = StreamInfo {
            fps: 25.0,
            frame_count: Some(250),
            width: 4,
            height: 4,
        };
        assert_eq!(info.duration_secs(), Some(10.0));

        let broken = StreamInfo { fps: 0.0, ..info };
        assert_eq!(broken.duration_secs(), None);
    }
}
