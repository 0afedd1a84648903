//! Per-frame face detection and matching.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, trace};

use super::sampler::{FrameSampler, SampledFrame, SamplerStats};
use crate::Result;
use crate::recognition::{FaceRecognizer, KnownFaceGallery};

/// A known person seen at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DetectionHit {
    pub person_id: i64,
    pub timestamp_secs: f64,
}

/// Detection counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DetectionStats {
    pub sampler: SamplerStats,
    pub faces_detected: u64,
    pub faces_matched: u64,
    /// Sampled frames dropped because recognition failed on them.
    pub frames_skipped: u64,
}

/// Output of one detection pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectionReport {
    pub hits: Vec<DetectionHit>,
    pub stats: DetectionStats,
}

/// Runs the recognizer over sampled frames.
#[derive(Clone)]
pub struct Detector {
    recognizer: Arc<dyn FaceRecognizer>,
    tolerance: f32,
}

impl Detector {
    pub fn new(recognizer: Arc<dyn FaceRecognizer>, tolerance: f32) -> Self {
        Self {
            recognizer,
            tolerance,
        }
    }

    /// Consume the sampler and collect every match. Blocking.
    pub fn detect(&self, mut sampler: FrameSampler, gallery: &KnownFaceGallery) -> DetectionReport {
        let mut report = DetectionReport::default();

        for sampled in sampler.by_ref() {
            match self.detect_frame(&sampled, gallery, &mut report.stats) {
                Ok(hits) => report.hits.extend(hits),
                Err(e) => {
                    report.stats.frames_skipped += 1;
                    debug!(index = sampled.index, error = %e, "Recognition failed, skipping frame");
                }
            }
        }

        report.stats.sampler = sampler.stats();
        debug!(
            hits = report.hits.len(),
            sampled = report.stats.sampler.frames_sampled,
            skipped = report.stats.frames_skipped,
            "Detection pass finished"
        );
        report
    }

    fn detect_frame(
        &self,
        sampled: &SampledFrame,
        gallery: &KnownFaceGallery,
        stats: &mut DetectionStats,
    ) -> Result<Vec<DetectionHit>> {
        let regions = self.recognizer.detect_faces(&sampled.frame)?;
        stats.faces_detected += regions.len() as u64;

        let mut hits = Vec::new();
        for region in &regions {
            let embedding = self.recognizer.encode(&sampled.frame, region)?;
            if let Some(person_id) = self
                .recognizer
                .match_face(gallery, &embedding, self.tolerance)
            {
                trace!(person_id, at = sampled.timestamp_secs, "Face matched");
                stats.faces_matched += 1;
                hits.push(DetectionHit {
                    person_id,
                    timestamp_secs: sampled.timestamp_secs,
                });
            }
        }
        Ok(hits)
    }
}
