//! Known-face gallery construction.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::recognizer::FaceRecognizer;
use super::types::Embedding;
use crate::database::models::PersonDbModel;
use crate::media::load_photo;

/// One reference embedding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KnownFace {
    pub person_id: i64,
    pub name: String,
    pub embedding: Embedding,
}

impl KnownFace {
    pub fn new(person_id: i64, name: impl Into<String>, embedding: Embedding) -> Self {
        Self {
            person_id,
            name: name.into(),
            embedding,
        }
    }
}

/// Reference embeddings matched against during one processing job.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KnownFaceGallery {
    entries: Vec<KnownFace>,
}

impl KnownFaceGallery {
    pub fn new(entries: Vec<KnownFace>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &KnownFace> {
        self.entries.iter()
    }

    pub fn name_of(&self, person_id: i64) -> Option<&str> {
        self.entries
            .iter()
            .find(|known| known.person_id == person_id)
            .map(|known| known.name.as_str())
    }
}

/// Builds a gallery from catalogued persons and their reference photos.
#[derive(Clone)]
pub struct GalleryBuilder {
    faces_dir: PathBuf,
    recognizer: Arc<dyn FaceRecognizer>,
}

impl GalleryBuilder {
    pub fn new(faces_dir: impl Into<PathBuf>, recognizer: Arc<dyn FaceRecognizer>) -> Self {
        Self {
            faces_dir: faces_dir.into(),
            recognizer,
        }
    }

    pub fn faces_dir(&self) -> &Path {
        &self.faces_dir
    }

    /// Encode the first face found in each person's photo.
    ///
    /// Persons whose photo is missing, unreadable or shows no face are skipped
    /// with a warning. Blocking: loads images and runs the recognizer.
    pub fn build(&self, persons: &[PersonDbModel]) -> KnownFaceGallery {
        let entries: Vec<KnownFace> = persons
            .iter()
            .filter_map(|person| self.encode_person(person))
            .collect();

        info!(
            persons = persons.len(),
            encoded = entries.len(),
            "Built known-face gallery"
        );
        KnownFaceGallery::new(entries)
    }

    fn encode_person(&self, person: &PersonDbModel) -> Option<KnownFace> {
        let path = self.faces_dir.join(&person.photo_path);
        let photo = match load_photo(&path) {
            Ok(photo) => photo,
            Err(e) => {
                warn!(person_id = person.id, path = %path.display(), error = %e, "Skipping person: photo unavailable");
                return None;
            }
        };

        let region = match self.recognizer.detect_faces(&photo) {
            Ok(faces) => faces.into_iter().next(),
            Err(e) => {
                warn!(person_id = person.id, error = %e, "Skipping person: face detection failed");
                return None;
            }
        };
        let Some(region) = region else {
            warn!(person_id = person.id, path = %path.display(), "Skipping person: no face in photo");
            return None;
        };

        match self.recognizer.encode(&photo, &region) {
            Ok(embedding) => {
                debug!(person_id = person.id, name = %person.name, "Encoded reference face");
                Some(KnownFace::new(person.id, person.name.clone(), embedding))
            }
            Err(e) => {
                warn!(person_id = person.id, error = %e, "Skipping person: encoding failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::HistogramRecognizer;

    fn person(id: i64, name: &str, photo: &str) -> PersonDbModel {
        PersonDbModel {
            id,
            name: name.to_string(),
            photo_path: photo.to_string(),
            created_at: 0,
        }
    }

    #[test]
    fn test_build_skips_missing_photos() {
        let dir = tempfile::tempdir().unwrap();
        image::RgbImage::from_pixel(4, 4, image::Rgb([200, 0, 0]))
            .save(dir.path().join("ada.png"))
            .unwrap();

        let builder = GalleryBuilder::new(dir.path(), Arc::new(HistogramRecognizer));
        let gallery = builder.build(&[person(1, "Ada", "ada.png"), person(2, "Bob", "bob.png")]);

        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery.name_of(1), Some("Ada"));
        assert_eq!(gallery.name_of(2), None);
    }

    #[test]
    fn test_build_without_persons_is_empty() {
        let builder = GalleryBuilder::new("/nonexistent", Arc::new(HistogramRecognizer));
        assert!(builder.build(&[]).is_empty());
    }
}
