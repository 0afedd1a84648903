//! Reference photo loading.

use std::path::Path;

use super::Frame;

/// Load a still image from disk as an RGB frame.
pub fn load_photo(path: &Path) -> crate::Result<Frame> {
    Ok(image::open(path)?.to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_photo_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("face.png");
        image::RgbImage::from_pixel(3, 2, image::Rgb([10, 20, 30]))
            .save(&path)
            .unwrap();

        let frame = load_photo(&path).unwrap();
        assert_eq!(frame.dimensions(), (3, 2));
        assert_eq!(frame.get_pixel(1, 1).0, [10, 20, 30]);
    }

    #[test]
    fn test_missing_photo_is_an_error() {
        assert!(load_photo(Path::new("/nonexistent/face.png")).is_err());
    }
}
