//! Application configuration loaded from the environment.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::analysis::AnalysisConfig;
use crate::pipeline::{CleanupConfig, PipelineConfig};
use crate::{Error, Result};

/// Default SQLite database URL.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:instance/database.db?mode=rwc";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_url: String,
    pub log_dir: PathBuf,
    /// Directory holding reference photos; person `photo_path`s are relative to it.
    pub faces_dir: PathBuf,
    /// Scratch directory scanned by temp-file cleanup.
    pub instance_dir: PathBuf,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub notification_retention_days: u32,
    pub pipeline: PipelineConfig,
    pub analysis: AnalysisConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            log_dir: PathBuf::from("logs"),
            faces_dir: PathBuf::from("instance/faces"),
            instance_dir: PathBuf::from("instance"),
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            notification_retention_days: 30,
            pipeline: PipelineConfig::default(),
            analysis: AnalysisConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load `.env` if present, then read the environment over the defaults.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(dir) = get("FACE_TIMELINE_LOG_DIR") {
            config.log_dir = dir.into();
        }
        if let Some(dir) = get("FACE_TIMELINE_FACES_DIR") {
            config.faces_dir = dir.into();
        }
        if let Some(dir) = get("FACE_TIMELINE_INSTANCE_DIR") {
            config.instance_dir = dir.into();
        }
        if let Some(path) = get("FFMPEG_PATH") {
            config.ffmpeg_path = path;
        }
        if let Some(path) = get("FFPROBE_PATH") {
            config.ffprobe_path = path;
        }
        if let Some(v) = get("FACE_TIMELINE_WORKERS") {
            config.pipeline.worker.worker_count = parse_var("FACE_TIMELINE_WORKERS", &v)?;
        }
        if let Some(v) = get("FACE_TIMELINE_SAMPLE_RATE") {
            config.analysis.sample_rate = parse_var("FACE_TIMELINE_SAMPLE_RATE", &v)?;
        }
        if let Some(v) = get("FACE_TIMELINE_TOLERANCE") {
            config.analysis.tolerance = parse_var("FACE_TIMELINE_TOLERANCE", &v)?;
        }
        if let Some(v) = get("FACE_TIMELINE_SMOOTHING_SECS") {
            config.analysis.smoothing_threshold_secs =
                parse_var("FACE_TIMELINE_SMOOTHING_SECS", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pipeline.worker.worker_count == 0 {
            return Err(Error::config("worker count must be at least 1"));
        }
        let queue = &self.pipeline.queue;
        if queue.warning_threshold > queue.critical_threshold {
            warn!(
                warning = queue.warning_threshold,
                critical = queue.critical_threshold,
                "Queue warning threshold above critical threshold"
            );
        }
        self.analysis.validate()
    }

    pub fn cleanup_config(&self) -> CleanupConfig {
        CleanupConfig {
            notification_retention_days: self.notification_retention_days,
            instance_dir: self.instance_dir.clone(),
        }
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::config(format!("{key}={value:?} is invalid: {e}")))
}
