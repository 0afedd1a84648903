//! Asynchronous task pipeline.
//!
//! A [`Pipeline`] owns an in-memory [`TaskQueue`] and a [`WorkerPool`].
//! Callers submit [`TaskPayload`]s, workers execute them through a
//! [`TaskHandler`], and finished tasks are collected as [`TaskResult`]s until
//! drained. Failed tasks produce an error notification instead of a result.

pub mod batch;
pub mod cleanup;
pub mod executor;
pub mod task;
pub mod task_queue;
pub mod worker_pool;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::notification::Notifier;

pub use batch::{BatchItem, BatchSummary};
pub use cleanup::{CleanupConfig, CleanupReport, CleanupService};
pub use executor::{TaskExecutor, TaskHandler};
pub use task::{CleanupKind, Task, TaskKind, TaskOutput, TaskPayload, TaskResult, VideoTaskOutput};
pub use task_queue::{QueueDepthStatus, TaskQueue, TaskQueueConfig};
pub use worker_pool::{PoolState, WorkerPool, WorkerPoolConfig};

/// Pipeline configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub worker: WorkerPoolConfig,
    pub queue: TaskQueueConfig,
}

/// Point-in-time view of the pipeline. Fields are read independently and
/// may be mutually inconsistent under load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PipelineStatus {
    pub running: bool,
    pub worker_count: usize,
    pub busy_workers: usize,
    pub pending_count: usize,
    pub result_count: usize,
}

/// The task pipeline facade.
pub struct Pipeline {
    queue: Arc<TaskQueue>,
    pool: WorkerPool,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        handler: Arc<dyn TaskHandler>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let queue = Arc::new(TaskQueue::with_config(config.queue));
        let pool = WorkerPool::new(config.worker, queue.clone(), handler, notifier);
        Self { queue, pool }
    }

    /// Start with `worker_count` workers. No-op when already running, an
    /// error while a stop is in progress.
    pub fn start(&self, worker_count: usize) -> Result<()> {
        self.pool.start(worker_count)
    }

    /// Start with the configured worker count.
    pub fn start_default(&self) -> Result<()> {
        self.pool.start(self.pool.config().worker_count)
    }

    /// Stop the workers; pending tasks are kept.
    pub async fn stop(&self) {
        self.pool.stop().await
    }

    /// Queue a task. Never blocks; accepted even while stopped.
    pub fn submit(&self, payload: TaskPayload) -> String {
        self.queue.submit(payload)
    }

    pub fn status(&self) -> PipelineStatus {
        PipelineStatus {
            running: self.pool.is_running(),
            worker_count: self.pool.worker_count(),
            busy_workers: self.pool.busy_count(),
            pending_count: self.queue.pending_count(),
            result_count: self.queue.result_count(),
        }
    }

    pub fn depth_status(&self) -> QueueDepthStatus {
        self.queue.depth_status()
    }

    /// Pop up to `limit` finished results.
    pub fn drain_results(&self, limit: usize) -> Vec<TaskResult> {
        self.queue.drain_results(limit)
    }

    /// Wait until every submitted task has been executed. Only returns while
    /// the pool is running or the queue is already empty.
    pub async fn wait_idle(&self) {
        self.queue.wait_idle().await
    }
}
