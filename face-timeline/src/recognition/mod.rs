//! Face recognition boundary.
//!
//! The pipeline only depends on [`FaceRecognizer`]; the embedding model
//! behind it is pluggable. [`HistogramRecognizer`] is the built-in stand-in.

mod gallery;
mod recognizer;
mod types;

pub use gallery::{GalleryBuilder, KnownFace, KnownFaceGallery};
pub use recognizer::{DEFAULT_TOLERANCE, FaceRecognizer, HistogramRecognizer};
pub use types::{Embedding, FaceRegion};
