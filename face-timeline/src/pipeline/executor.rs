//! Task dispatch.

use std::sync::Arc;

use async_trait::async_trait;

use super::cleanup::CleanupService;
use super::task::{Task, TaskOutput, TaskPayload, VideoTaskOutput};
use crate::analysis::VideoProcessor;
use crate::database::repositories::CatalogRepository;
use crate::notification::{NotificationEvent, Notifier};
use crate::recognition::{GalleryBuilder, KnownFaceGallery};
use crate::{Error, Result};

/// Executes one dequeued task.
///
/// An `Err` (or a panic) is reported by the worker and the task is dropped.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn execute(&self, task: &Task) -> Result<TaskOutput>;
}

/// Default handler wiring tasks to the analysis and cleanup services.
pub struct TaskExecutor {
    catalog: Arc<dyn CatalogRepository>,
    processor: VideoProcessor,
    gallery_builder: GalleryBuilder,
    pub(super) notifier: Arc<dyn Notifier>,
    cleanup: CleanupService,
}

impl TaskExecutor {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        processor: VideoProcessor,
        gallery_builder: GalleryBuilder,
        notifier: Arc<dyn Notifier>,
        cleanup: CleanupService,
    ) -> Self {
        Self {
            catalog,
            processor,
            gallery_builder,
            notifier,
            cleanup,
        }
    }

    /// Build a fresh gallery from the catalogued persons.
    pub(super) async fn build_gallery(&self) -> Result<KnownFaceGallery> {
        let persons = self.catalog.list_persons().await?;
        let builder = self.gallery_builder.clone();
        tokio::task::spawn_blocking(move || builder.build(&persons))
            .await
            .map_err(|e| Error::Task(format!("gallery build failed: {e}")))
    }

    async fn analyse_video(&self, video_id: i64) -> Result<VideoTaskOutput> {
        let video = self.catalog.get_video(video_id).await?;
        let gallery = self.build_gallery().await?;
        let analysis = self.processor.process(video_id, &gallery).await?;
        Ok(VideoTaskOutput {
            video_id,
            filename: video.original_filename,
            appearance_count: analysis.appearance_count(),
            analysis,
        })
    }

    /// Analyse one video, wrapped in start and completion notifications.
    pub(super) async fn process_video(&self, video_id: i64) -> Result<VideoTaskOutput> {
        self.notifier
            .notify(NotificationEvent::processing_started(video_id));

        let output = self.analyse_video(video_id).await?;

        let event = if output.analysis.is_empty() {
            NotificationEvent::nobody_recognized(&output.filename)
        } else {
            NotificationEvent::video_processed(&output.filename, output.appearance_count)
        };
        self.notifier.notify(event);
        Ok(output)
    }
}

#[async_trait]
impl TaskHandler for TaskExecutor {
    async fn execute(&self, task: &Task) -> Result<TaskOutput> {
        match &task.payload {
            TaskPayload::ProcessVideo { video_id } => {
                self.process_video(*video_id).await.map(TaskOutput::Video)
            }
            TaskPayload::BatchProcess { video_ids } => {
                Ok(TaskOutput::Batch(self.process_batch(video_ids).await))
            }
            TaskPayload::Cleanup { kind } => self.cleanup.run(*kind).await.map(TaskOutput::Cleanup),
            TaskPayload::Shutdown => Err(Error::Task(
                "shutdown sentinel cannot be executed".to_string(),
            )),
        }
    }
}
