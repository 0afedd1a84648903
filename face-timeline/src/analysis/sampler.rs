//! Fixed-rate frame sampling over a decoded video stream.

use serde::Serialize;
use tracing::{debug, warn};

use crate::media::{Frame, StreamInfo, VideoStream};

/// Default number of frames analysed per second of video.
pub const DEFAULT_SAMPLE_RATE: f64 = 5.0;

/// Frame rate assumed when the container reports none.
pub const FALLBACK_FPS: f64 = 30.0;

/// Consecutive undecodable frames after which the stream is considered ended.
pub const MAX_CONSECUTIVE_DECODE_ERRORS: u32 = 30;

/// `native_fps` when usable, [`FALLBACK_FPS`] otherwise.
pub fn effective_fps(native_fps: f64) -> f64 {
    if native_fps.is_finite() && native_fps > 0.0 {
        native_fps
    } else {
        FALLBACK_FPS
    }
}

/// Number of native frames between two samples: `max(1, round(fps / rate))`.
pub fn sample_interval(native_fps: f64, target_rate: f64) -> u64 {
    if !(target_rate.is_finite() && target_rate > 0.0) {
        return 1;
    }
    let interval = (effective_fps(native_fps) / target_rate).round();
    if interval.is_finite() && interval >= 1.0 {
        interval as u64
    } else {
        1
    }
}

/// One frame selected for analysis.
pub struct SampledFrame {
    /// Native frame index within the video.
    pub index: u64,
    /// `index / fps`.
    pub timestamp_secs: f64,
    pub frame: Frame,
}

/// Sampling counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SamplerStats {
    pub frames_read: u64,
    pub frames_sampled: u64,
    pub decode_errors: u64,
}

/// Lazy iterator yielding every `interval`-th decodable frame.
///
/// Owns the stream, so it cannot be restarted. Undecodable frames still
/// advance the frame index and are skipped.
pub struct FrameSampler {
    stream: Box<dyn VideoStream>,
    fps: f64,
    interval: u64,
    next_index: u64,
    consecutive_errors: u32,
    exhausted: bool,
    stats: SamplerStats,
}

impl FrameSampler {
    pub fn new(stream: Box<dyn VideoStream>, target_rate: f64) -> Self {
        let native_fps = stream.info().fps;
        let fps = effective_fps(native_fps);
        if fps != native_fps {
            warn!(
                native_fps,
                fallback = FALLBACK_FPS,
                "Video reports no usable frame rate, assuming fallback"
            );
        }
        let interval = sample_interval(fps, target_rate);
        debug!(fps, target_rate, interval, "Frame sampler ready");

        Self {
            stream,
            fps,
            interval,
            next_index: 0,
            consecutive_errors: 0,
            exhausted: false,
            stats: SamplerStats::default(),
        }
    }

    pub fn info(&self) -> &StreamInfo {
        self.stream.info()
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    pub fn stats(&self) -> SamplerStats {
        self.stats
    }
}

impl Iterator for FrameSampler {
    type Item = SampledFrame;

    fn next(&mut self) -> Option<SampledFrame> {
        while !self.exhausted {
            let Some(decoded) = self.stream.next_frame() else {
                self.exhausted = true;
                break;
            };

            let index = self.next_index;
            self.next_index += 1;

            let frame = match decoded {
                Ok(frame) => frame,
                Err(e) => {
                    self.stats.decode_errors += 1;
                    self.consecutive_errors += 1;
                    debug!(index, error = %e, "Skipping undecodable frame");
                    if self.consecutive_errors >= MAX_CONSECUTIVE_DECODE_ERRORS {
                        warn!(
                            index,
                            errors = self.consecutive_errors,
                            "Too many consecutive decode errors, ending stream"
                        );
                        self.exhausted = true;
                    }
                    continue;
                }
            };

            self.consecutive_errors = 0;
            self.stats.frames_read += 1;

            if index % self.interval == 0 {
                self.stats.frames_sampled += 1;
                return Some(SampledFrame {
                    index,
                    timestamp_secs: index as f64 / self.fps,
                    frame,
                });
            }
        }
        None
    }
}
