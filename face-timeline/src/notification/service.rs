//! Notification service implementation.
//!
//! The NotificationService is responsible for:
//! - Logging every event through `tracing`
//! - Broadcasting events to in-process subscribers
//! - Persisting events to the notification feed on tracked background tasks

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::Notifier;
use super::events::{NotificationEvent, NotificationLevel};
use crate::database::repositories::NotificationRepository;

/// Configuration for the notification service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationServiceConfig {
    /// Whether notifications are emitted at all.
    pub enabled: bool,
    /// Capacity of the broadcast channel for subscribers.
    pub broadcast_capacity: usize,
}

impl Default for NotificationServiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            broadcast_capacity: 256,
        }
    }
}

/// Delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationStats {
    pub emitted: u64,
    pub persisted: u64,
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    emitted: AtomicU64,
    persisted: AtomicU64,
    failed: AtomicU64,
}

/// The notification service.
pub struct NotificationService {
    config: NotificationServiceConfig,
    repository: Option<Arc<dyn NotificationRepository>>,
    event_tx: broadcast::Sender<NotificationEvent>,
    counters: Arc<Counters>,
    persist_tasks: TaskTracker,
}

impl NotificationService {
    /// Create a service that only logs and broadcasts.
    pub fn new() -> Self {
        Self::with_config(NotificationServiceConfig::default())
    }

    pub fn with_config(config: NotificationServiceConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.broadcast_capacity.max(1));
        // Kept closed so `wait` resolves whenever no write is in flight.
        let persist_tasks = TaskTracker::new();
        persist_tasks.close();
        Self {
            config,
            repository: None,
            event_tx,
            counters: Arc::new(Counters::default()),
            persist_tasks,
        }
    }

    /// Create a service that also persists events.
    pub fn with_repository(
        config: NotificationServiceConfig,
        repository: Arc<dyn NotificationRepository>,
    ) -> Self {
        let mut service = Self::with_config(config);
        service.repository = Some(repository);
        service
    }

    /// Subscribe to emitted events.
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.event_tx.subscribe()
    }

    pub fn stats(&self) -> NotificationStats {
        NotificationStats {
            emitted: self.counters.emitted.load(Ordering::Relaxed),
            persisted: self.counters.persisted.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Wait until every notification emitted so far has been written (or has
    /// failed to be). Call before closing the database pool.
    pub async fn flush(&self) {
        self.persist_tasks.wait().await;
        debug!(persisted = self.counters.persisted.load(Ordering::Relaxed), "Notifications flushed");
    }

    fn persist(&self, event: &NotificationEvent) {
        let Some(repository) = self.repository.clone() else {
            return;
        };

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(title = %event.title, "No runtime available, notification not persisted");
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            return;
        };

        let counters = self.counters.clone();
        let event = event.clone();
        let write = async move {
            match repository
                .create(
                    event.level.as_str(),
                    &event.title,
                    &event.message,
                    event.icon.as_deref(),
                )
                .await
            {
                Ok(id) => {
                    counters.persisted.fetch_add(1, Ordering::Relaxed);
                    debug!(id, "Notification persisted");
                }
                Err(e) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, title = %event.title, "Failed to persist notification");
                }
            }
        };
        self.persist_tasks.spawn_on(write, &handle);
    }
}

impl Default for NotificationService {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for NotificationService {
    fn notify(&self, event: NotificationEvent) {
        if !self.config.enabled {
            return;
        }
        self.counters.emitted.fetch_add(1, Ordering::Relaxed);

        match event.level {
            NotificationLevel::Error => {
                warn!(title = %event.title, message = %event.message, "Notification")
            }
            _ => info!(title = %event.title, message = %event.message, "Notification"),
        }

        self.persist(&event);

        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::repositories::SqlxNotificationRepository;
    use crate::database::{init_pool_with_size, run_migrations};

    #[tokio::test]
    async fn test_broadcast_to_subscribers() {
        let service = NotificationService::new();
        let mut rx = service.subscribe();

        service.notify(NotificationEvent::batch_started(3));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.title, "Batch processing started");
        assert_eq!(service.stats().emitted, 1);
    }

    #[tokio::test]
    async fn test_disabled_service_drops_events() {
        let service = NotificationService::with_config(NotificationServiceConfig {
            enabled: false,
            ..Default::default()
        });
        let mut rx = service.subscribe();

        service.notify(NotificationEvent::batch_started(1));

        assert!(rx.try_recv().is_err());
        assert_eq!(service.stats(), NotificationStats::default());
    }

    #[tokio::test]
    async fn test_persists_through_repository() {
        let pool = init_pool_with_size("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let repo = Arc::new(SqlxNotificationRepository::new(pool));
        let service =
            NotificationService::with_repository(NotificationServiceConfig::default(), repo.clone());

        service.notify(NotificationEvent::task_failed("cleanup_1_0", "disk full"));
        service.flush().await;

        let rows = repo.list_recent(10, false).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kind, "error");
        assert_eq!(rows[0].icon.as_deref(), Some("❌"));
    }

    #[tokio::test]
    async fn test_flush_writes_pending_events_before_pool_close() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("notify.db").display());
        let pool = init_pool_with_size(&url, 2).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let service = NotificationService::with_repository(
            NotificationServiceConfig::default(),
            Arc::new(SqlxNotificationRepository::new(pool.clone())),
        );

        service.notify(NotificationEvent::task_failed("process_video_1_0", "boom"));
        service.notify(NotificationEvent::batch_completed(1, 1));
        service.flush().await;
        pool.close().await;

        assert_eq!(
            service.stats(),
            NotificationStats {
                emitted: 2,
                persisted: 2,
                failed: 0
            }
        );

        let pool = init_pool_with_size(&url, 1).await.unwrap();
        let rows = SqlxNotificationRepository::new(pool)
            .list_recent(10, false)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);

        // The tracker accepts new work after a flush.
        service.notify(NotificationEvent::batch_started(1));
        service.flush().await;
        assert_eq!(service.stats().emitted, 3);
    }

    #[test]
    fn test_notify_without_runtime_does_not_panic() {
        struct NeverCalled;

        #[async_trait::async_trait]
        impl NotificationRepository for NeverCalled {
            async fn create(
                &self,
                _: &str,
                _: &str,
                _: &str,
                _: Option<&str>,
            ) -> crate::Result<i64> {
                unreachable!()
            }
            async fn list_recent(
                &self,
                _: i64,
                _: bool,
            ) -> crate::Result<Vec<crate::database::models::NotificationDbModel>> {
                unreachable!()
            }
            async fn mark_read(&self, _: i64) -> crate::Result<()> {
                unreachable!()
            }
            async fn mark_all_read(&self) -> crate::Result<u64> {
                unreachable!()
            }
            async fn delete_older_than(&self, _: i64) -> crate::Result<u64> {
                unreachable!()
            }
        }

        let service = NotificationService::with_repository(
            NotificationServiceConfig::default(),
            Arc::new(NeverCalled),
        );
        service.notify(NotificationEvent::batch_started(1));
        assert_eq!(service.stats().failed, 1);
    }
}
