//! The per-video processing job.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use appearance_smoothing::{DEFAULT_SMOOTHING_THRESHOLD_SECS, Smoother, Span};
use serde::{Deserialize, Serialize, Serializer};
use tracing::{info, warn};

use super::detector::{DetectionReport, Detector};
use super::sampler::{DEFAULT_SAMPLE_RATE, FrameSampler};
use crate::database::models::AppearanceSegment;
use crate::database::repositories::CatalogRepository;
use crate::media::VideoDecoder;
use crate::recognition::{DEFAULT_TOLERANCE, FaceRecognizer, KnownFaceGallery};
use crate::{Error, Result};

/// Analysis tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Frames analysed per second of video.
    pub sample_rate: f64,
    /// Maximum embedding distance accepted as a match.
    pub tolerance: f32,
    /// Maximum gap, in seconds, bridged inside one appearance.
    pub smoothing_threshold_secs: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            tolerance: DEFAULT_TOLERANCE,
            smoothing_threshold_secs: DEFAULT_SMOOTHING_THRESHOLD_SECS,
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(Error::config(format!(
                "sample rate must be positive, got {}",
                self.sample_rate
            )));
        }
        if !(self.tolerance.is_finite() && self.tolerance >= 0.0) {
            return Err(Error::config(format!(
                "tolerance must not be negative, got {}",
                self.tolerance
            )));
        }
        if !(self.smoothing_threshold_secs.is_finite() && self.smoothing_threshold_secs > 0.0) {
            return Err(Error::config(format!(
                "smoothing threshold must be positive, got {}",
                self.smoothing_threshold_secs
            )));
        }
        Ok(())
    }
}

/// One person's appearances in a video.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonAppearances {
    pub name: String,
    #[serde(serialize_with = "serialize_rounded_spans")]
    pub segments: Vec<Span>,
}

/// Stored analysis result, keyed by person id with the name inside each
/// entry, so namesakes stay distinct. Persons that were never seen
/// are absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct VideoAnalysis {
    persons: BTreeMap<i64, PersonAppearances>,
}

impl VideoAnalysis {
    pub fn is_empty(&self) -> bool {
        self.persons.is_empty()
    }

    pub fn get(&self, person_id: i64) -> Option<&PersonAppearances> {
        self.persons.get(&person_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, &PersonAppearances)> {
        self.persons.iter().map(|(id, p)| (*id, p))
    }

    /// Total number of segments across all persons.
    pub fn appearance_count(&self) -> usize {
        self.persons.values().map(|p| p.segments.len()).sum()
    }

    /// Rows to persist, ordered by person then start time.
    pub fn segments(&self) -> Vec<AppearanceSegment> {
        self.iter()
            .flat_map(|(person_id, person)| {
                person.segments.iter().map(move |span| AppearanceSegment {
                    person_id,
                    start_time: span.start,
                    end_time: span.end,
                })
            })
            .collect()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Serialize)]
struct RoundedSpan {
    start: f64,
    end: f64,
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn serialize_rounded_spans<S: Serializer>(
    spans: &[Span],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_seq(spans.iter().map(|s| RoundedSpan {
        start: round2(s.start),
        end: round2(s.end),
    }))
}

/// Detects known persons in a video and replace-writes their appearances.
#[derive(Clone)]
pub struct VideoProcessor {
    catalog: Arc<dyn CatalogRepository>,
    decoder: Arc<dyn VideoDecoder>,
    recognizer: Arc<dyn FaceRecognizer>,
    config: AnalysisConfig,
}

impl VideoProcessor {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        decoder: Arc<dyn VideoDecoder>,
        recognizer: Arc<dyn FaceRecognizer>,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            catalog,
            decoder,
            recognizer,
            config,
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Analyse one video against `gallery` and persist the result.
    ///
    /// The previous appearances are replaced and the video is marked processed
    /// in one transaction, including when the gallery is empty or nobody is
    /// recognized.
    pub async fn process(&self, video_id: i64, gallery: &KnownFaceGallery) -> Result<VideoAnalysis> {
        let video = self.catalog.get_video(video_id).await?;
        info!(video_id, file = %video.file_path, "Processing video");

        let analysis = if gallery.is_empty() {
            warn!(video_id, "No known faces to match against, skipping detection");
            VideoAnalysis::default()
        } else {
            let report = self.run_detection(&video.file_path, gallery).await?;
            self.aggregate(&report, gallery)
        };

        let segments = analysis.segments();
        self.catalog
            .replace_appearances(video_id, &segments, &analysis.to_json()?)
            .await?;

        info!(
            video_id,
            persons = analysis.persons.len(),
            appearances = segments.len(),
            "Video processed"
        );
        Ok(analysis)
    }

    async fn run_detection(&self, path: &str, gallery: &KnownFaceGallery) -> Result<DetectionReport> {
        let decoder = self.decoder.clone();
        let detector = Detector::new(self.recognizer.clone(), self.config.tolerance);
        let sample_rate = self.config.sample_rate;
        let path = Path::new(path).to_path_buf();
        let gallery = gallery.clone();

        tokio::task::spawn_blocking(move || -> Result<DetectionReport> {
            let stream = decoder.open(&path)?;
            let sampler = FrameSampler::new(stream, sample_rate);
            Ok(detector.detect(sampler, &gallery))
        })
        .await
        .map_err(|e| Error::Task(format!("detection task failed: {e}")))?
    }

    fn aggregate(&self, report: &DetectionReport, gallery: &KnownFaceGallery) -> VideoAnalysis {
        let smoother = Smoother::new(self.config.smoothing_threshold_secs);
        let spans = smoother.aggregate(report.hits.iter().map(|h| (h.person_id, h.timestamp_secs)));

        let persons = spans
            .into_iter()
            .map(|(person_id, segments)| {
                let name = gallery.name_of(person_id).unwrap_or("Unknown").to_string();
                (person_id, PersonAppearances { name, segments })
            })
            .collect();
        VideoAnalysis { persons }
    }
}
