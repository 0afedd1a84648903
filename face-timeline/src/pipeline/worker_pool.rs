//! Worker pool draining the task queue.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::time::Duration;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::executor::TaskHandler;
use super::task::TaskResult;
use super::task_queue::TaskQueue;
use crate::notification::{NotificationEvent, Notifier};
use crate::{Error, Result};

/// Configuration for the worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    /// Workers spawned by `start` when the caller does not choose.
    pub worker_count: usize,
    /// How often an idle worker re-checks the queue and the stop signal.
    pub poll_interval_ms: u64,
    /// How long `stop` waits for workers before abandoning them.
    pub shutdown_timeout_secs: u64,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_count: 2,
            poll_interval_ms: 1000,
            shutdown_timeout_secs: 5,
        }
    }
}

/// Lifecycle of a [`WorkerPool`].
///
/// `Stopped -> Running` on `start`, `Running -> Stopping -> Stopped` on `stop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PoolState {
    Stopped,
    Running,
    Stopping,
}

impl PoolState {
    fn as_u8(self) -> u8 {
        match self {
            Self::Stopped => 0,
            Self::Running => 1,
            Self::Stopping => 2,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Stopped,
            1 => Self::Running,
            _ => Self::Stopping,
        }
    }

    fn load(cell: &AtomicU8) -> Self {
        Self::from_u8(cell.load(Ordering::SeqCst))
    }
}

struct PoolHandles {
    workers: Option<JoinSet<()>>,
    cancellation_token: CancellationToken,
}

/// Long-lived workers executing tasks from a [`TaskQueue`].
pub struct WorkerPool {
    config: WorkerPoolConfig,
    queue: Arc<TaskQueue>,
    handler: Arc<dyn TaskHandler>,
    notifier: Arc<dyn Notifier>,
    state: Arc<AtomicU8>,
    /// Signalled when a stop completes.
    stopped: Notify,
    worker_count: AtomicUsize,
    busy_workers: Arc<AtomicUsize>,
    handles: parking_lot::Mutex<PoolHandles>,
}

impl WorkerPool {
    pub fn new(
        config: WorkerPoolConfig,
        queue: Arc<TaskQueue>,
        handler: Arc<dyn TaskHandler>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            queue,
            handler,
            notifier,
            state: Arc::new(AtomicU8::new(PoolState::Stopped.as_u8())),
            stopped: Notify::new(),
            worker_count: AtomicUsize::new(0),
            busy_workers: Arc::new(AtomicUsize::new(0)),
            handles: parking_lot::Mutex::new(PoolHandles {
                workers: None,
                cancellation_token: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    /// Spawn `worker_count` workers. No-op when already running; rejected
    /// while a stop is in progress.
    pub fn start(&self, worker_count: usize) -> Result<()> {
        if worker_count == 0 {
            return Err(Error::validation("worker count must be at least 1"));
        }
        if let Err(current) = self.transition(PoolState::Stopped, PoolState::Running) {
            return match current {
                PoolState::Stopping => Err(Error::validation("worker pool is stopping")),
                _ => {
                    debug!("Worker pool already running");
                    Ok(())
                }
            };
        }

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let mut handles = self.handles.lock();
        let cancellation_token = handles.cancellation_token.clone();
        let mut workers = JoinSet::new();

        for worker_id in 0..worker_count {
            let worker = Worker {
                id: worker_id,
                queue: self.queue.clone(),
                handler: self.handler.clone(),
                notifier: self.notifier.clone(),
                busy_workers: self.busy_workers.clone(),
                pool_state: self.state.clone(),
                cancellation_token: cancellation_token.clone(),
                poll_interval,
            };
            workers.spawn(worker.run());
        }

        handles.workers = Some(workers);
        self.worker_count.store(worker_count, Ordering::SeqCst);
        info!(
            worker_count,
            pending = self.queue.pending_count(),
            "Worker pool started"
        );
        Ok(())
    }

    /// Stop all workers after their current task.
    ///
    /// Pending tasks stay queued for the next `start`. Workers still busy
    /// after the shutdown timeout are signalled to stop and detached. A call
    /// made while another stop is in progress waits for that stop to finish.
    pub async fn stop(&self) {
        if let Err(current) = self.transition(PoolState::Running, PoolState::Stopping) {
            if current == PoolState::Stopping {
                debug!("Stop already in progress, waiting for it");
                self.wait_stopped().await;
            }
            return;
        }

        let (workers, cancellation_token) = {
            let mut handles = self.handles.lock();
            (handles.workers.take(), handles.cancellation_token.clone())
        };
        let worker_count = self.worker_count.load(Ordering::SeqCst);
        info!(worker_count, "Stopping worker pool");

        self.queue.push_shutdown_front(worker_count);

        if let Some(mut workers) = workers {
            let timeout = Duration::from_secs(self.config.shutdown_timeout_secs);
            let joined = tokio::time::timeout(timeout, async {
                while let Some(res) = workers.join_next().await {
                    if let Err(e) = res {
                        warn!(error = %e, "Worker task ended abnormally");
                    }
                }
            })
            .await;

            if joined.is_err() {
                cancellation_token.cancel();
                warn!(
                    remaining = workers.len(),
                    timeout_secs = self.config.shutdown_timeout_secs,
                    "Workers did not stop in time, abandoning them"
                );
                workers.detach_all();
            }
        }

        let purged = self.queue.purge_shutdown();
        if purged > 0 {
            debug!(purged, "Removed unused shutdown sentinels");
        }

        self.handles.lock().cancellation_token = CancellationToken::new();
        self.worker_count.store(0, Ordering::SeqCst);
        self.state.store(PoolState::Stopped.as_u8(), Ordering::SeqCst);
        self.stopped.notify_waiters();
        info!(pending = self.queue.pending_count(), "Worker pool stopped");
    }

    async fn wait_stopped(&self) {
        loop {
            let notified = self.stopped.notified();
            if self.state() != PoolState::Stopping {
                return;
            }
            notified.await;
        }
    }

    fn transition(&self, from: PoolState, to: PoolState) -> std::result::Result<(), PoolState> {
        self.state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(PoolState::from_u8)
    }

    pub fn state(&self) -> PoolState {
        PoolState::load(&self.state)
    }

    pub fn is_running(&self) -> bool {
        self.state() == PoolState::Running
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count.load(Ordering::SeqCst)
    }

    pub fn busy_count(&self) -> usize {
        self.busy_workers.load(Ordering::SeqCst)
    }
}

struct Worker {
    id: usize,
    queue: Arc<TaskQueue>,
    handler: Arc<dyn TaskHandler>,
    notifier: Arc<dyn Notifier>,
    busy_workers: Arc<AtomicUsize>,
    pool_state: Arc<AtomicU8>,
    cancellation_token: CancellationToken,
    poll_interval: Duration,
}

impl Worker {
    async fn run(self) {
        debug!(worker = self.id, "Worker started");

        loop {
            // No new dequeues once a stop has begun.
            if self.cancellation_token.is_cancelled()
                || PoolState::load(&self.pool_state) == PoolState::Stopping
            {
                break;
            }

            let Some(task) = self.queue.try_dequeue() else {
                tokio::select! {
                    _ = self.cancellation_token.cancelled() => break,
                    _ = self.queue.notified() => {}
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
                continue;
            };

            if task.is_shutdown() {
                debug!(worker = self.id, "Shutdown sentinel received");
                break;
            }

            self.busy_workers.fetch_add(1, Ordering::SeqCst);
            debug!(worker = self.id, task_id = %task.id, kind = %task.kind(), "Executing task");

            let outcome = AssertUnwindSafe(self.handler.execute(&task))
                .catch_unwind()
                .await;

            let failure = match outcome {
                Ok(Ok(output)) => {
                    self.queue.push_result(TaskResult::new(&task, output));
                    debug!(worker = self.id, task_id = %task.id, "Task completed");
                    None
                }
                Ok(Err(e)) => Some(e.to_string()),
                Err(panic) => Some(format!("task panicked: {}", panic_message(panic.as_ref()))),
            };

            if let Some(message) = failure {
                error!(worker = self.id, task_id = %task.id, kind = %task.kind(), error = %message, "Task failed");
                self.notifier
                    .notify(NotificationEvent::task_failed(&task.id, &message));
            }

            self.busy_workers.fetch_sub(1, Ordering::SeqCst);
            self.queue.task_done();
        }

        debug!(worker = self.id, "Worker stopped");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::NotificationService;
    use crate::pipeline::cleanup::CleanupReport;
    use crate::pipeline::task::{CleanupKind, Task, TaskOutput, TaskPayload};
    use async_trait::async_trait;
    use std::time::Instant;

    struct EchoHandler;

    #[async_trait]
    impl TaskHandler for EchoHandler {
        async fn execute(&self, task: &Task) -> Result<TaskOutput> {
            match task.payload {
                TaskPayload::ProcessVideo { video_id } if video_id < 0 => {
                    Err(Error::not_found("Video", video_id))
                }
                TaskPayload::ProcessVideo { video_id } if video_id == 0 => panic!("boom"),
                _ => Ok(TaskOutput::Cleanup(CleanupReport::new(CleanupKind::General))),
            }
        }
    }

    fn pool() -> (Arc<TaskQueue>, WorkerPool, Arc<NotificationService>) {
        let queue = Arc::new(TaskQueue::new());
        let notifier = Arc::new(NotificationService::new());
        let pool = WorkerPool::new(
            WorkerPoolConfig {
                poll_interval_ms: 20,
                ..Default::default()
            },
            queue.clone(),
            Arc::new(EchoHandler),
            notifier.clone(),
        );
        (queue, pool, notifier)
    }

    #[test]
    fn test_worker_pool_config_default() {
        let config = WorkerPoolConfig::default();
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.poll_interval_ms, 1000);
        assert_eq!(config.shutdown_timeout_secs, 5);
    }

    #[test]
    fn test_panic_message() {
        let panic: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(panic.as_ref()), "static");
        let panic: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(panic.as_ref()), "owned");
    }

    #[tokio::test]
    async fn test_zero_workers_rejected() {
        let (_queue, pool, _) = pool();
        assert!(pool.start(0).is_err());
        assert!(!pool.is_running());
    }

    #[tokio::test]
    async fn test_failures_and_panics_are_reported() {
        let (queue, pool, notifier) = pool();
        let mut events = notifier.subscribe();

        queue.submit(TaskPayload::ProcessVideo { video_id: -1 });
        queue.submit(TaskPayload::ProcessVideo { video_id: 0 });
        queue.submit(TaskPayload::ProcessVideo { video_id: 1 });
        pool.start(2).unwrap();

        tokio::time::timeout(Duration::from_secs(5), queue.wait_idle())
            .await
            .unwrap();

        assert_eq!(queue.drain_results(10).len(), 1);
        let mut messages = Vec::new();
        while let Ok(event) = events.try_recv() {
            messages.push(event.message);
        }
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().any(|m| m.contains("task panicked: boom")));
        assert_eq!(pool.busy_count(), 0);

        pool.stop().await;
        assert!(!pool.is_running());
        assert_eq!(pool.worker_count(), 0);
    }

    #[tokio::test]
    async fn test_submitted_shutdown_payload_does_not_stop_worker() {
        let (queue, pool, _) = pool();
        queue.submit(TaskPayload::Shutdown);
        queue.submit(TaskPayload::ProcessVideo { video_id: 1 });
        pool.start(1).unwrap();

        tokio::time::timeout(Duration::from_secs(5), queue.wait_idle())
            .await
            .unwrap();
        assert_eq!(queue.drain_results(10).len(), 2);
        assert!(pool.is_running());
        pool.stop().await;
    }

    /// Sleeps for `slow` on `slow_video`, `fast` otherwise, ignoring cancellation.
    struct SleepHandler {
        slow_video: Option<i64>,
        slow: Duration,
        fast: Duration,
        started: AtomicUsize,
    }

    impl SleepHandler {
        fn uniform(delay: Duration) -> Self {
            Self {
                slow_video: None,
                slow: delay,
                fast: delay,
                started: AtomicUsize::new(0),
            }
        }

        fn started(&self) -> usize {
            self.started.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TaskHandler for SleepHandler {
        async fn execute(&self, task: &Task) -> Result<TaskOutput> {
            self.started.fetch_add(1, Ordering::SeqCst);
            let delay = match task.payload {
                TaskPayload::ProcessVideo { video_id } if Some(video_id) == self.slow_video => {
                    self.slow
                }
                _ => self.fast,
            };
            tokio::time::sleep(delay).await;
            Ok(TaskOutput::Cleanup(CleanupReport::new(CleanupKind::General)))
        }
    }

    fn sleeping_pool(
        handler: Arc<SleepHandler>,
        shutdown_timeout_secs: u64,
    ) -> (Arc<TaskQueue>, WorkerPool) {
        let queue = Arc::new(TaskQueue::new());
        let pool = WorkerPool::new(
            WorkerPoolConfig {
                worker_count: 1,
                poll_interval_ms: 20,
                shutdown_timeout_secs,
            },
            queue.clone(),
            handler,
            Arc::new(NotificationService::new()),
        );
        (queue, pool)
    }

    #[tokio::test]
    async fn test_concurrent_stop_waits_and_start_is_rejected_while_stopping() {
        let handler = Arc::new(SleepHandler::uniform(Duration::from_millis(300)));
        let (queue, pool) = sleeping_pool(handler.clone(), 3);
        for video_id in 1..=20 {
            queue.submit(TaskPayload::ProcessVideo { video_id });
        }
        pool.start(1).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let begun = Instant::now();
        let (first, second, restart) = tokio::join!(
            async {
                pool.stop().await;
                begun.elapsed()
            },
            async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                pool.stop().await;
                begun.elapsed()
            },
            async {
                tokio::time::sleep(Duration::from_millis(40)).await;
                (pool.state(), pool.start(1))
            },
        );

        assert_eq!(restart.0, PoolState::Stopping);
        assert!(matches!(restart.1, Err(Error::Validation(_))));
        assert!(second >= first, "second stop returned before the first");
        assert!(first < Duration::from_secs(3), "in-flight task should end the stop");
        assert_eq!(pool.state(), PoolState::Stopped);

        // Only the task in flight when stop began was executed.
        assert_eq!(handler.started(), 1);
        assert_eq!(queue.drain_results(100).len(), 1);
        assert_eq!(queue.pending_count(), 19);
    }

    #[tokio::test]
    async fn test_in_flight_task_completes_during_stop() {
        let handler = Arc::new(SleepHandler::uniform(Duration::from_millis(200)));
        let (queue, pool) = sleeping_pool(handler.clone(), 5);
        queue.submit(TaskPayload::ProcessVideo { video_id: 1 });
        queue.submit(TaskPayload::ProcessVideo { video_id: 2 });
        pool.start(1).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        pool.stop().await;

        let results = queue.drain_results(10);
        assert_eq!(results.len(), 1);
        assert!(results[0].task_id.starts_with("process_video_"));
        assert_eq!(queue.pending_count(), 1);
        assert_eq!(pool.busy_count(), 0);
    }

    #[tokio::test]
    async fn test_stop_abandons_stuck_worker_and_restart_drains_queue() {
        let handler = Arc::new(SleepHandler {
            slow_video: Some(0),
            slow: Duration::from_secs(2),
            fast: Duration::from_millis(10),
            started: AtomicUsize::new(0),
        });
        let (queue, pool) = sleeping_pool(handler.clone(), 1);
        for video_id in 0..3 {
            queue.submit(TaskPayload::ProcessVideo { video_id });
        }
        pool.start(1).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let begun = Instant::now();
        pool.stop().await;
        let took = begun.elapsed();
        assert!(took >= Duration::from_secs(1), "stop returned early: {took:?}");
        assert!(took < Duration::from_millis(1900), "stop overran: {took:?}");
        assert!(!pool.is_running());
        assert_eq!(pool.worker_count(), 0);
        assert_eq!(queue.pending_count(), 2);

        // A leftover sentinel would end the new worker before the queue drains.
        pool.start(1).unwrap();
        tokio::time::timeout(Duration::from_secs(5), queue.wait_idle())
            .await
            .unwrap();
        assert_eq!(queue.drain_results(10).len(), 3);
        assert_eq!(handler.started(), 3);
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let (_queue, pool, _) = pool();
        pool.start(2).unwrap();
        pool.start(5).unwrap();
        assert_eq!(pool.worker_count(), 2);
        pool.stop().await;
    }
}
