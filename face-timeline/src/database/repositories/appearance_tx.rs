//! Transactional operations for appearance replacement.
//!
//! Reprocessing a video swaps its whole appearance set. These primitives are
//! meant to be composed inside one transaction so a failure half-way leaves
//! the previous set in place.

use sqlx::SqliteConnection;

use crate::database::models::AppearanceSegment;
use crate::{Error, Result};

/// Transactional operations for video appearances.
///
/// These methods operate within an existing transaction and do NOT commit.
/// The caller is responsible for committing or rolling back the transaction.
pub struct AppearanceTxOps;

impl AppearanceTxOps {
    /// Delete every appearance row of a video. Returns the number of rows removed.
    pub async fn delete_by_video(tx: &mut SqliteConnection, video_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM video_appearances WHERE video_id = ?")
            .bind(video_id)
            .execute(tx)
            .await?;
        Ok(result.rows_affected())
    }

    /// Insert a single appearance row.
    pub async fn insert(
        tx: &mut SqliteConnection,
        video_id: i64,
        segment: &AppearanceSegment,
    ) -> Result<()> {
        if segment.start_time > segment.end_time {
            return Err(Error::validation(format!(
                "appearance for person {} starts after it ends ({} > {})",
                segment.person_id, segment.start_time, segment.end_time
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO video_appearances (video_id, person_id, start_time, end_time)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(video_id)
        .bind(segment.person_id)
        .bind(segment.start_time)
        .bind(segment.end_time)
        .execute(tx)
        .await?;
        Ok(())
    }

    /// Flag the video as processed and store the analysis blob.
    pub async fn mark_processed(
        tx: &mut SqliteConnection,
        video_id: i64,
        analysis_result: &str,
        processed_at: i64,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE videos SET processed = 1, analysis_result = ?, processed_at = ? WHERE id = ?",
        )
        .bind(analysis_result)
        .bind(processed_at)
        .bind(video_id)
        .execute(tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("Video", video_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{init_pool_with_size, run_migrations};

    async fn setup_test_db() -> sqlx::SqlitePool {
        let pool = init_pool_with_size("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool).await.unwrap();

        sqlx::query("INSERT INTO persons (id, name, photo_path, created_at) VALUES (1, 'Ada', 'ada.png', 0)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO videos (id, filename, original_filename, file_path, uploaded_at) VALUES (1, 'a.mp4', 'a.mp4', '/a.mp4', 0)",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    fn segment(start: f64, end: f64) -> AppearanceSegment {
        AppearanceSegment {
            person_id: 1,
            start_time: start,
            end_time: end,
        }
    }

    #[tokio::test]
    async fn test_rollback_keeps_previous_rows() {
        let pool = setup_test_db().await;

        let mut tx = pool.begin().await.unwrap();
        AppearanceTxOps::insert(&mut tx, 1, &segment(0.0, 1.0))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = pool.begin().await.unwrap();
        assert_eq!(AppearanceTxOps::delete_by_video(&mut tx, 1).await.unwrap(), 1);
        tx.rollback().await.unwrap();

        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM video_appearances WHERE video_id = 1")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_inverted_segment_rejected() {
        let pool = setup_test_db().await;
        let mut tx = pool.begin().await.unwrap();
        let err = AppearanceTxOps::insert(&mut tx, 1, &segment(5.0, 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_mark_processed_missing_video() {
        let pool = setup_test_db().await;
        let mut tx = pool.begin().await.unwrap();
        let err = AppearanceTxOps::mark_processed(&mut tx, 99, "{}", 0)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
