//! Appearance segment database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One persisted appearance interval, joined with the person's name.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct AppearanceDbModel {
    pub id: i64,
    pub video_id: i64,
    pub person_id: i64,
    pub person_name: String,
    pub start_time: f64,
    pub end_time: f64,
}

/// A segment to insert; the video id is supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AppearanceSegment {
    pub person_id: i64,
    pub start_time: f64,
    pub end_time: f64,
}

impl AppearanceSegment {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}
