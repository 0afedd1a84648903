//! Sequential multi-video processing.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::executor::TaskExecutor;
use crate::notification::NotificationEvent;

/// Outcome for one video of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    pub video_id: i64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub appearance_count: usize,
}

/// Aggregate outcome of a batch task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub items: Vec<BatchItem>,
}

impl BatchSummary {
    fn record(&mut self, item: BatchItem) {
        self.total += 1;
        if item.success {
            self.successful += 1;
        } else {
            self.failed += 1;
        }
        self.items.push(item);
    }
}

impl TaskExecutor {
    /// Process each video in order. A failing video is recorded and the
    /// batch moves on. Each video emits its own start and completion events
    /// between the batch-level pair.
    pub(super) async fn process_batch(&self, video_ids: &[i64]) -> BatchSummary {
        self.notifier
            .notify(NotificationEvent::batch_started(video_ids.len()));

        let mut summary = BatchSummary::default();
        for &video_id in video_ids {
            let item = match self.process_video(video_id).await {
                Ok(output) => BatchItem {
                    video_id,
                    success: true,
                    error: None,
                    appearance_count: output.appearance_count,
                },
                Err(e) => {
                    warn!(video_id, error = %e, "Batch item failed");
                    BatchItem {
                        video_id,
                        success: false,
                        error: Some(e.to_string()),
                        appearance_count: 0,
                    }
                }
            };
            summary.record(item);
        }

        info!(
            total = summary.total,
            successful = summary.successful,
            failed = summary.failed,
            "Batch finished"
        );
        self.notifier.notify(NotificationEvent::batch_completed(
            summary.successful,
            summary.failed,
        ));
        summary
    }
}
