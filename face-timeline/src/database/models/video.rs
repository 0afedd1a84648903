//! Video database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A catalogued video file.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct VideoDbModel {
    pub id: i64,
    /// Stored filename on disk.
    pub filename: String,
    /// Filename as uploaded, used in user-facing messages.
    pub original_filename: String,
    pub file_path: String,
    /// Duration in seconds, when known at upload time.
    pub duration: Option<f64>,
    pub processed: bool,
    /// JSON blob of the last analysis, see `analysis::VideoAnalysis`.
    pub analysis_result: Option<String>,
    /// Unix epoch milliseconds of the last successful analysis.
    pub processed_at: Option<i64>,
    /// Unix epoch milliseconds.
    pub uploaded_at: i64,
}

/// Fields needed to register a new video.
#[derive(Debug, Clone)]
pub struct NewVideo {
    pub filename: String,
    pub original_filename: String,
    pub file_path: String,
    pub duration: Option<f64>,
}

impl NewVideo {
    /// Register a file under its own name.
    pub fn from_path(file_path: impl Into<String>) -> Self {
        let file_path = file_path.into();
        let filename = std::path::Path::new(&file_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_path.clone());
        Self {
            original_filename: filename.clone(),
            filename,
            file_path,
            duration: None,
        }
    }
}
