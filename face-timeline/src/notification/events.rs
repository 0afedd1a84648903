//! Notification events.
//!
//! Every event the pipeline emits is built here so titles, icons and levels
//! stay consistent between single-video, batch and failure paths.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a notification, stored as the `type` column.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl NotificationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// A human-readable status event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub level: NotificationLevel,
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl NotificationEvent {
    pub fn new(
        level: NotificationLevel,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            level,
            title: title.into(),
            message: message.into(),
            icon: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn processing_started(video_id: i64) -> Self {
        Self::new(
            NotificationLevel::Info,
            "Processing started",
            format!("Starting analysis of video {video_id}"),
        )
        .with_icon("⏳")
    }

    pub fn video_processed(filename: &str, appearance_count: usize) -> Self {
        Self::new(
            NotificationLevel::Success,
            "Video processed",
            format!(
                "Video \"{filename}\" processed successfully. Found {appearance_count} appearances."
            ),
        )
        .with_icon("✅")
    }

    pub fn nobody_recognized(filename: &str) -> Self {
        Self::new(
            NotificationLevel::Warning,
            "No known faces found",
            format!("Video \"{filename}\" was processed but no known person was recognized"),
        )
        .with_icon("⚠️")
    }

    pub fn batch_started(video_count: usize) -> Self {
        Self::new(
            NotificationLevel::Info,
            "Batch processing started",
            format!("Processing {video_count} videos in batch"),
        )
        .with_icon("📦")
    }

    pub fn batch_completed(successful: usize, failed: usize) -> Self {
        let (level, icon) = if failed == 0 {
            (NotificationLevel::Success, "📦✅")
        } else {
            (NotificationLevel::Warning, "📦⚠️")
        };
        Self::new(
            level,
            "Batch processing completed",
            format!("Processed {successful} videos successfully, {failed} failed"),
        )
        .with_icon(icon)
    }

    pub fn task_failed(task_id: &str, error: &str) -> Self {
        Self::new(
            NotificationLevel::Error,
            "Processing error",
            format!("Error processing task {task_id}: {error}"),
        )
        .with_icon("❌")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_level_round_trip() {
        for level in [
            NotificationLevel::Info,
            NotificationLevel::Success,
            NotificationLevel::Warning,
            NotificationLevel::Error,
        ] {
            assert_eq!(level.to_string(), level.as_str());
            assert_eq!(NotificationLevel::from_str(level.as_str()).unwrap(), level);
        }
    }

    #[test]
    fn test_batch_completed_level() {
        assert_eq!(
            NotificationEvent::batch_completed(3, 0).level,
            NotificationLevel::Success
        );
        let partial = NotificationEvent::batch_completed(2, 1);
        assert_eq!(partial.level, NotificationLevel::Warning);
        assert_eq!(partial.message, "Processed 2 videos successfully, 1 failed");
    }

    #[test]
    fn test_task_failed_carries_task_id() {
        let event = NotificationEvent::task_failed("process_video_1_0", "boom");
        assert_eq!(event.level, NotificationLevel::Error);
        assert!(event.message.contains("process_video_1_0"));
        assert!(event.message.contains("boom"));
    }
}
