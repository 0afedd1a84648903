//! The recognition capability and the built-in histogram recognizer.

use super::gallery::KnownFaceGallery;
use super::types::{Embedding, FaceRegion};
use crate::media::Frame;
use crate::{Error, Result};

/// Default maximum embedding distance accepted as a match.
pub const DEFAULT_TOLERANCE: f32 = 0.6;

/// Face detection, encoding and matching.
///
/// Calls are synchronous and CPU-bound; callers run them on the blocking pool.
pub trait FaceRecognizer: Send + Sync {
    /// Locate faces in a frame.
    fn detect_faces(&self, frame: &Frame) -> Result<Vec<FaceRegion>>;

    /// Compute the embedding of one detected face.
    fn encode(&self, frame: &Frame, region: &FaceRegion) -> Result<Embedding>;

    /// Resolve an embedding to a known person.
    ///
    /// The default returns the first gallery entry, in gallery order, whose
    /// distance is within `tolerance`.
    fn match_face(
        &self,
        gallery: &KnownFaceGallery,
        embedding: &Embedding,
        tolerance: f32,
    ) -> Option<i64> {
        gallery
            .iter()
            .find(|known| known.embedding.distance(embedding) <= tolerance)
            .map(|known| known.person_id)
    }
}

const BINS_PER_CHANNEL: usize = 4;

/// Coarse colour-histogram recognizer.
///
/// Treats the whole frame as a single face region and encodes it as an
/// L2-normalised 4x4x4 RGB histogram. It tells apart scenes with different
/// dominant colours and nothing more; a model-backed recognizer replaces it
/// through [`FaceRecognizer`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HistogramRecognizer;

impl HistogramRecognizer {
    pub fn new() -> Self {
        Self
    }
}

impl FaceRecognizer for HistogramRecognizer {
    fn detect_faces(&self, frame: &Frame) -> Result<Vec<FaceRegion>> {
        if frame.width() == 0 || frame.height() == 0 {
            return Ok(Vec::new());
        }
        Ok(vec![FaceRegion::whole(frame)])
    }

    fn encode(&self, frame: &Frame, region: &FaceRegion) -> Result<Embedding> {
        let region = region
            .clamp_to(frame)
            .ok_or_else(|| Error::recognition(format!("region {region:?} outside frame")))?;

        let shift = 8 - BINS_PER_CHANNEL.trailing_zeros();
        let mut histogram = vec![0f32; BINS_PER_CHANNEL.pow(3)];
        for y in region.y..region.y + region.height {
            for x in region.x..region.x + region.width {
                let [r, g, b] = frame.get_pixel(x, y).0;
                let bin = ((r >> shift) as usize * BINS_PER_CHANNEL + (g >> shift) as usize)
                    * BINS_PER_CHANNEL
                    + (b >> shift) as usize;
                histogram[bin] += 1.0;
            }
        }

        let norm = histogram.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            histogram.iter_mut().for_each(|v| *v /= norm);
        }
        Ok(Embedding::new(histogram))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::KnownFace;

    fn solid(rgb: [u8; 3]) -> Frame {
        Frame::from_pixel(8, 8, image::Rgb(rgb))
    }

    fn embed(rgb: [u8; 3]) -> Embedding {
        let recognizer = HistogramRecognizer;
        let frame = solid(rgb);
        let region = recognizer.detect_faces(&frame).unwrap()[0];
        recognizer.encode(&frame, &region).unwrap()
    }

    #[test]
    fn test_same_colour_matches() {
        assert_eq!(embed([200, 10, 10]).distance(&embed([210, 20, 5])), 0.0);
    }

    #[test]
    fn test_different_colours_are_far_apart() {
        let d = embed([200, 10, 10]).distance(&embed([10, 10, 200]));
        assert!(d > DEFAULT_TOLERANCE, "distance {d}");
    }

    #[test]
    fn test_empty_frame_has_no_faces() {
        let faces = HistogramRecognizer.detect_faces(&Frame::new(0, 0)).unwrap();
        assert!(faces.is_empty());
    }

    #[test]
    fn test_match_face_returns_first_within_tolerance() {
        let gallery = KnownFaceGallery::new(vec![
            KnownFace::new(1, "Ada", embed([200, 10, 10])),
            KnownFace::new(2, "Bob", embed([10, 10, 200])),
            KnownFace::new(3, "Ada twin", embed([200, 10, 10])),
        ]);
        let recognizer = HistogramRecognizer;

        assert_eq!(
            recognizer.match_face(&gallery, &embed([200, 0, 0]), DEFAULT_TOLERANCE),
            Some(1)
        );
        assert_eq!(
            recognizer.match_face(&gallery, &embed([0, 200, 0]), DEFAULT_TOLERANCE),
            None
        );
    }
}
