//! Recognition value types.

use serde::{Deserialize, Serialize};

use crate::media::Frame;

/// Axis-aligned face bounding box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Region covering the whole frame.
    pub fn whole(frame: &Frame) -> Self {
        Self::new(0, 0, frame.width(), frame.height())
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Clip the region to the frame bounds. Returns `None` when nothing is left.
    pub fn clamp_to(&self, frame: &Frame) -> Option<Self> {
        let (fw, fh) = frame.dimensions();
        if self.x >= fw || self.y >= fh {
            return None;
        }
        let width = self.width.min(fw - self.x);
        let height = self.height.min(fh - self.y);
        (width > 0 && height > 0).then(|| Self::new(self.x, self.y, width, height))
    }
}

/// Fixed-length face feature vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Euclidean distance. Embeddings of different lengths never match.
    pub fn distance(&self, other: &Embedding) -> f32 {
        if self.0.len() != other.0.len() {
            return f32::INFINITY;
        }
        self.0
            .iter()
            .zip(&other.0)
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt()
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![3.0, 4.0]);
        assert_eq!(a.distance(&b), 5.0);
        assert_eq!(b.distance(&b), 0.0);
    }

    #[test]
    fn test_length_mismatch_never_matches() {
        let a = Embedding::new(vec![0.0]);
        let b = Embedding::new(vec![0.0, 0.0]);
        assert!(a.distance(&b).is_infinite());
    }

    #[test]
    fn test_clamp_region() {
        let frame = Frame::new(10, 8);
        let region = FaceRegion::new(6, 4, 10, 10).clamp_to(&frame).unwrap();
        assert_eq!(region, FaceRegion::new(6, 4, 4, 4));
        assert!(FaceRegion::new(10, 0, 1, 1).clamp_to(&frame).is_none());
        assert_eq!(FaceRegion::whole(&frame).area(), 80);
    }
}
