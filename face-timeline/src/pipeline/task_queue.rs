//! In-memory task inbox and result outbox.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::task::{Task, TaskPayload, TaskResult};

/// Configuration for the task queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskQueueConfig {
    /// Warning threshold for queue depth.
    pub warning_threshold: usize,
    /// Critical threshold for queue depth.
    pub critical_threshold: usize,
    /// Maximum undrained results; the oldest is dropped beyond it.
    /// `None` keeps everything.
    pub result_capacity: Option<usize>,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self {
            warning_threshold: 100,
            critical_threshold: 500,
            result_capacity: None,
        }
    }
}

/// Status of queue depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueDepthStatus {
    /// Queue depth is normal.
    Normal,
    /// Queue depth is at warning level.
    Warning,
    /// Queue depth is at critical level.
    Critical,
}

impl QueueDepthStatus {
    fn as_u8(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::Warning => 1,
            Self::Critical => 2,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Normal,
            1 => Self::Warning,
            _ => Self::Critical,
        }
    }
}

/// FIFO of pending tasks plus the outbox of finished ones.
///
/// Producers never block. Sentinels are not counted as pending work.
pub struct TaskQueue {
    config: TaskQueueConfig,
    inbox: Mutex<VecDeque<Task>>,
    outbox: Mutex<VecDeque<TaskResult>>,
    /// Wakes idle workers.
    task_notify: Notify,
    /// Signalled when the last unfinished task is done.
    idle_notify: Notify,
    pending: AtomicUsize,
    /// Submitted but not yet finished (pending or executing).
    unfinished: AtomicUsize,
    results: AtomicUsize,
    dropped_results: AtomicU64,
    depth_status: AtomicU8,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::with_config(TaskQueueConfig::default())
    }

    pub fn with_config(config: TaskQueueConfig) -> Self {
        Self {
            config,
            inbox: Mutex::new(VecDeque::new()),
            outbox: Mutex::new(VecDeque::new()),
            task_notify: Notify::new(),
            idle_notify: Notify::new(),
            pending: AtomicUsize::new(0),
            unfinished: AtomicUsize::new(0),
            results: AtomicUsize::new(0),
            dropped_results: AtomicU64::new(0),
            depth_status: AtomicU8::new(QueueDepthStatus::Normal.as_u8()),
        }
    }

    /// Append a task and wake one idle worker. Returns the task id.
    pub fn submit(&self, payload: TaskPayload) -> String {
        let task = Task::new(payload);
        let id = task.id.clone();
        let kind = task.kind();

        self.unfinished.fetch_add(1, Ordering::SeqCst);
        let depth = {
            let mut inbox = self.inbox.lock();
            inbox.push_back(task);
            self.pending.fetch_add(1, Ordering::SeqCst) + 1
        };
        self.task_notify.notify_one();

        debug!(task_id = %id, %kind, depth, "Task submitted");
        self.update_depth_status(depth);
        id
    }

    /// Put `count` shutdown sentinels ahead of all pending work.
    pub(crate) fn push_shutdown_front(&self, count: usize) {
        {
            let mut inbox = self.inbox.lock();
            for _ in 0..count {
                inbox.push_front(Task::shutdown());
            }
        }
        self.task_notify.notify_waiters();
        self.task_notify.notify_one();
    }

    /// Remove sentinels no worker consumed. Returns how many were removed.
    pub(crate) fn purge_shutdown(&self) -> usize {
        let mut inbox = self.inbox.lock();
        let before = inbox.len();
        inbox.retain(|task| !task.is_shutdown());
        before - inbox.len()
    }

    /// Pop the oldest task without waiting.
    pub fn try_dequeue(&self) -> Option<Task> {
        let task = self.inbox.lock().pop_front()?;
        if !task.is_shutdown() {
            let depth = self.pending.fetch_sub(1, Ordering::SeqCst) - 1;
            self.update_depth_status(depth);
        }
        Some(task)
    }

    /// Resolves when a task may have become available.
    pub async fn notified(&self) {
        self.task_notify.notified().await
    }

    /// Mark a dequeued task as finished, whatever its outcome.
    pub(crate) fn task_done(&self) {
        if self.unfinished.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle_notify.notify_waiters();
        }
    }

    /// True when nothing is pending or executing.
    pub fn is_idle(&self) -> bool {
        self.unfinished.load(Ordering::SeqCst) == 0
    }

    /// Wait until every submitted task has finished.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle_notify.notified();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Append a result, evicting the oldest when over capacity.
    pub fn push_result(&self, result: TaskResult) {
        let mut outbox = self.outbox.lock();
        if let Some(capacity) = self.config.result_capacity {
            while outbox.len() >= capacity.max(1) {
                if let Some(evicted) = outbox.pop_front() {
                    self.dropped_results.fetch_add(1, Ordering::Relaxed);
                    warn!(task_id = %evicted.task_id, capacity, "Result outbox full, dropping oldest result");
                }
            }
        }
        outbox.push_back(result);
        self.results.store(outbox.len(), Ordering::SeqCst);
    }

    /// Pop up to `limit` results in completion order.
    pub fn drain_results(&self, limit: usize) -> Vec<TaskResult> {
        let mut outbox = self.outbox.lock();
        let n = limit.min(outbox.len());
        let drained: Vec<TaskResult> = outbox.drain(..n).collect();
        self.results.store(outbox.len(), Ordering::SeqCst);
        drained
    }

    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn result_count(&self) -> usize {
        self.results.load(Ordering::SeqCst)
    }

    pub fn dropped_results(&self) -> u64 {
        self.dropped_results.load(Ordering::Relaxed)
    }

    /// Get the queue depth status.
    pub fn depth_status(&self) -> QueueDepthStatus {
        self.classify(self.pending_count())
    }

    fn classify(&self, depth: usize) -> QueueDepthStatus {
        if depth >= self.config.critical_threshold {
            QueueDepthStatus::Critical
        } else if depth >= self.config.warning_threshold {
            QueueDepthStatus::Warning
        } else {
            QueueDepthStatus::Normal
        }
    }

    fn update_depth_status(&self, depth: usize) {
        let status = self.classify(depth);
        let previous =
            QueueDepthStatus::from_u8(self.depth_status.swap(status.as_u8(), Ordering::Relaxed));
        if previous == status {
            return;
        }
        match status {
            QueueDepthStatus::Critical => warn!(
                depth,
                threshold = self.config.critical_threshold,
                "Task queue depth critical"
            ),
            QueueDepthStatus::Warning if previous == QueueDepthStatus::Normal => warn!(
                depth,
                threshold = self.config.warning_threshold,
                "Task queue depth high"
            ),
            _ => info!(depth, ?status, "Task queue depth recovered"),
        }
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
