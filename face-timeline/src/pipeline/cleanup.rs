//! Housekeeping tasks: notification retention and temp file removal.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::task::CleanupKind;
use crate::Result;
use crate::database::repositories::NotificationRepository;
use crate::database::time::days_ago_ms;

const TEMP_EXTENSIONS: [&str; 2] = ["tmp", "temp"];

/// Configuration for cleanup tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Notifications older than this many days are deleted.
    #[serde(default = "default_retention_days")]
    pub notification_retention_days: u32,

    /// Directory scanned (non-recursively) for temp files.
    pub instance_dir: PathBuf,
}

fn default_retention_days() -> u32 {
    30
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            notification_retention_days: default_retention_days(),
            instance_dir: PathBuf::from("instance"),
        }
    }
}

/// What a cleanup run removed. Counts are `None` for parts that did not run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub kind: CleanupKind,
    pub notifications_removed: Option<u64>,
    pub temp_files_removed: Option<u64>,
}

impl CleanupReport {
    pub fn new(kind: CleanupKind) -> Self {
        Self {
            kind,
            notifications_removed: None,
            temp_files_removed: None,
        }
    }
}

/// Runs cleanup tasks.
pub struct CleanupService {
    notifications: Arc<dyn NotificationRepository>,
    config: CleanupConfig,
}

impl CleanupService {
    pub fn new(notifications: Arc<dyn NotificationRepository>, config: CleanupConfig) -> Self {
        Self {
            notifications,
            config,
        }
    }

    pub async fn run(&self, kind: CleanupKind) -> Result<CleanupReport> {
        let mut report = CleanupReport::new(kind);
        match kind {
            CleanupKind::Notifications => {
                report.notifications_removed = Some(self.purge_notifications().await?);
            }
            CleanupKind::TempFiles => {
                report.temp_files_removed = Some(self.remove_temp_files().await?);
            }
            CleanupKind::General => {
                report.notifications_removed = Some(self.purge_notifications().await?);
                report.temp_files_removed = Some(self.remove_temp_files().await?);
            }
        }
        info!(
            %kind,
            notifications = ?report.notifications_removed,
            temp_files = ?report.temp_files_removed,
            "Cleanup finished"
        );
        Ok(report)
    }

    async fn purge_notifications(&self) -> Result<u64> {
        let cutoff = days_ago_ms(self.config.notification_retention_days);
        let removed = self.notifications.delete_older_than(cutoff).await?;
        debug!(
            removed,
            retention_days = self.config.notification_retention_days,
            "Purged old notifications"
        );
        Ok(removed)
    }

    async fn remove_temp_files(&self) -> Result<u64> {
        let dir = &self.config.instance_dir;
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(dir = %dir.display(), "Instance directory does not exist, nothing to clean");
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !is_temp_file(&path) {
                continue;
            }
            match entry.file_type().await {
                Ok(ft) if ft.is_file() => {}
                _ => continue,
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    debug!(path = %path.display(), "Removed temp file");
                    removed += 1;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove temp file"),
            }
        }
        Ok(removed)
    }
}

fn is_temp_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| TEMP_EXTENSIONS.contains(&ext))
}
