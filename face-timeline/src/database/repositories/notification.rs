//! Notification feed repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::NotificationDbModel;
use crate::database::time::now_ms;

/// Notification repository trait.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn create(&self, kind: &str, title: &str, message: &str, icon: Option<&str>)
    -> Result<i64>;
    async fn list_recent(&self, limit: i64, unread_only: bool) -> Result<Vec<NotificationDbModel>>;
    async fn mark_read(&self, id: i64) -> Result<()>;
    async fn mark_all_read(&self) -> Result<u64>;
    /// Delete notifications created before `cutoff_ms`. Returns the number removed.
    async fn delete_older_than(&self, cutoff_ms: i64) -> Result<u64>;
}

/// SQLx implementation of NotificationRepository.
pub struct SqlxNotificationRepository {
    pool: SqlitePool,
}

impl SqlxNotificationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationRepository for SqlxNotificationRepository {
    async fn create(
        &self,
        kind: &str,
        title: &str,
        message: &str,
        icon: Option<&str>,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO notifications (type, title, message, icon, read, created_at)
            VALUES (?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(kind)
        .bind(title)
        .bind(message)
        .bind(icon)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn list_recent(&self, limit: i64, unread_only: bool) -> Result<Vec<NotificationDbModel>> {
        let sql = if unread_only {
            "SELECT * FROM notifications WHERE read = 0 ORDER BY created_at DESC, id DESC LIMIT ?"
        } else {
            "SELECT * FROM notifications ORDER BY created_at DESC, id DESC LIMIT ?"
        };
        let rows = sqlx::query_as::<_, NotificationDbModel>(sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn mark_read(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE notifications SET read = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_all_read(&self) -> Result<u64> {
        let result = sqlx::query("UPDATE notifications SET read = 1 WHERE read = 0")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_older_than(&self, cutoff_ms: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM notifications WHERE created_at < ?")
            .bind(cutoff_ms)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
