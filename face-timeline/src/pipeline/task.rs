//! Task and result types.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::batch::BatchSummary;
use super::cleanup::CleanupReport;
use crate::analysis::VideoAnalysis;

/// Which cleanup a `Cleanup` task performs.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CleanupKind {
    /// Old rows of the notification feed.
    Notifications,
    /// `*.tmp` / `*.temp` files in the instance directory.
    TempFiles,
    /// Both of the above.
    General,
}

/// What a task asks a worker to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskPayload {
    ProcessVideo { video_id: i64 },
    BatchProcess { video_ids: Vec<i64> },
    Cleanup { kind: CleanupKind },
    /// Sentinel that terminates the worker dequeuing it.
    Shutdown,
}

/// Discriminant of [`TaskPayload`], used in task ids and logs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    ProcessVideo,
    BatchProcess,
    Cleanup,
    Shutdown,
}

impl TaskPayload {
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::ProcessVideo { .. } => TaskKind::ProcessVideo,
            Self::BatchProcess { .. } => TaskKind::BatchProcess,
            Self::Cleanup { .. } => TaskKind::Cleanup,
            Self::Shutdown => TaskKind::Shutdown,
        }
    }
}

static TASK_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// `<kind>_<unix-millis>_<sequence>`, unique within the process.
fn next_task_id(kind: TaskKind) -> String {
    let seq = TASK_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{}_{}_{}", kind, Utc::now().timestamp_millis(), seq)
}

/// A queued unit of work. Consumed by exactly one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub payload: TaskPayload,
    pub submitted_at: DateTime<Utc>,
    /// Set only on sentinels queued by the pool itself. A `Shutdown` payload
    /// submitted from outside is executed (and fails) like any other task.
    #[serde(skip)]
    sentinel: bool,
}

impl Task {
    pub fn new(payload: TaskPayload) -> Self {
        Self {
            id: next_task_id(payload.kind()),
            payload,
            submitted_at: Utc::now(),
            sentinel: false,
        }
    }

    pub(crate) fn shutdown() -> Self {
        Self {
            sentinel: true,
            ..Self::new(TaskPayload::Shutdown)
        }
    }

    pub fn kind(&self) -> TaskKind {
        self.payload.kind()
    }

    pub fn is_shutdown(&self) -> bool {
        self.sentinel
    }
}

/// Output of a single-video task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoTaskOutput {
    pub video_id: i64,
    pub filename: String,
    pub appearance_count: usize,
    pub analysis: VideoAnalysis,
}

/// Task-specific result payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskOutput {
    Video(VideoTaskOutput),
    Batch(BatchSummary),
    Cleanup(CleanupReport),
}

/// A finished task, waiting in the outbox until drained.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskResult {
    pub task_id: String,
    pub kind: TaskKind,
    pub output: TaskOutput,
    pub completed_at: DateTime<Utc>,
}

impl TaskResult {
    pub fn new(task: &Task, output: TaskOutput) -> Self {
        Self {
            task_id: task.id.clone(),
            kind: task.kind(),
            output,
            completed_at: Utc::now(),
        }
    }
}
