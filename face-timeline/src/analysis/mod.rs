//! Video analysis: frame sampling, face detection and appearance aggregation.

pub mod detector;
pub mod job;
pub mod sampler;

pub use detector::{DetectionHit, DetectionReport, DetectionStats, Detector};
pub use job::{AnalysisConfig, PersonAppearances, VideoAnalysis, VideoProcessor};
pub use sampler::{FrameSampler, SampledFrame, SamplerStats, sample_interval};
