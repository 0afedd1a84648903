//! Catalog repository: persons, videos and their appearance segments.

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::debug;

use super::appearance_tx::AppearanceTxOps;
use crate::database::models::{
    AppearanceDbModel, AppearanceSegment, NewVideo, PersonDbModel, VideoDbModel,
};
use crate::database::retry::retry_on_sqlite_busy;
use crate::database::time::now_ms;
use crate::{Error, Result};

/// Catalog repository trait.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn get_video(&self, id: i64) -> Result<VideoDbModel>;
    async fn list_videos(&self) -> Result<Vec<VideoDbModel>>;
    async fn create_video(&self, video: &NewVideo) -> Result<i64>;

    async fn get_person(&self, id: i64) -> Result<PersonDbModel>;
    async fn list_persons(&self) -> Result<Vec<PersonDbModel>>;
    async fn create_person(&self, name: &str, photo_path: &str) -> Result<i64>;

    async fn list_appearances(&self, video_id: i64) -> Result<Vec<AppearanceDbModel>>;

    /// Atomically replace all appearances of a video and mark it processed.
    ///
    /// Either the whole new set plus the processed flag is committed, or the
    /// video keeps its previous appearances.
    async fn replace_appearances(
        &self,
        video_id: i64,
        segments: &[AppearanceSegment],
        analysis_result: &str,
    ) -> Result<()>;
}

/// SQLx implementation of CatalogRepository.
pub struct SqlxCatalogRepository {
    pool: SqlitePool,
}

impl SqlxCatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn replace_once(
        &self,
        video_id: i64,
        segments: &[AppearanceSegment],
        analysis_result: &str,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let removed = AppearanceTxOps::delete_by_video(&mut tx, video_id).await?;
        for segment in segments {
            AppearanceTxOps::insert(&mut tx, video_id, segment).await?;
        }
        AppearanceTxOps::mark_processed(&mut tx, video_id, analysis_result, now_ms()).await?;

        tx.commit().await?;

        debug!(
            video_id,
            removed,
            inserted = segments.len(),
            "Replaced video appearances"
        );
        Ok(())
    }
}

#[async_trait]
impl CatalogRepository for SqlxCatalogRepository {
    async fn get_video(&self, id: i64) -> Result<VideoDbModel> {
        sqlx::query_as::<_, VideoDbModel>("SELECT * FROM videos WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Video", id))
    }

    async fn list_videos(&self) -> Result<Vec<VideoDbModel>> {
        let videos =
            sqlx::query_as::<_, VideoDbModel>("SELECT * FROM videos ORDER BY uploaded_at DESC")
                .fetch_all(&self.pool)
                .await?;
        Ok(videos)
    }

    async fn create_video(&self, video: &NewVideo) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO videos (filename, original_filename, file_path, duration, uploaded_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&video.filename)
        .bind(&video.original_filename)
        .bind(&video.file_path)
        .bind(video.duration)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn get_person(&self, id: i64) -> Result<PersonDbModel> {
        sqlx::query_as::<_, PersonDbModel>("SELECT * FROM persons WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Person", id))
    }

    async fn list_persons(&self) -> Result<Vec<PersonDbModel>> {
        let persons = sqlx::query_as::<_, PersonDbModel>("SELECT * FROM persons ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(persons)
    }

    async fn create_person(&self, name: &str, photo_path: &str) -> Result<i64> {
        let result =
            sqlx::query("INSERT INTO persons (name, photo_path, created_at) VALUES (?, ?, ?)")
                .bind(name)
                .bind(photo_path)
                .bind(now_ms())
                .execute(&self.pool)
                .await?;
        Ok(result.last_insert_rowid())
    }

    async fn list_appearances(&self, video_id: i64) -> Result<Vec<AppearanceDbModel>> {
        let rows = sqlx::query_as::<_, AppearanceDbModel>(
            r#"
            SELECT va.id, va.video_id, va.person_id, p.name AS person_name,
                   va.start_time, va.end_time
            FROM video_appearances va
            JOIN persons p ON va.person_id = p.id
            WHERE va.video_id = ?
            ORDER BY va.start_time, va.person_id
            "#,
        )
        .bind(video_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn replace_appearances(
        &self,
        video_id: i64,
        segments: &[AppearanceSegment],
        analysis_result: &str,
    ) -> Result<()> {
        retry_on_sqlite_busy("replace_appearances", || {
            self.replace_once(video_id, segments, analysis_result)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{init_pool_with_size, run_migrations};

    async fn setup_repo() -> SqlxCatalogRepository {
        let pool = init_pool_with_size("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqlxCatalogRepository::new(pool)
    }

    fn seg(person_id: i64, start: f64, end: f64) -> AppearanceSegment {
        AppearanceSegment {
            person_id,
            start_time: start,
            end_time: end,
        }
    }

    #[tokio::test]
    async fn test_get_missing_video() {
        let repo = setup_repo().await;
        let err = repo.get_video(1).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_create_and_list_videos() {
        let repo = setup_repo().await;
        assert!(repo.list_videos().await.unwrap().is_empty());

        let a = repo
            .create_video(&NewVideo::from_path("/media/a.mp4"))
            .await
            .unwrap();
        let b = repo
            .create_video(&NewVideo::from_path("/media/b.mp4"))
            .await
            .unwrap();

        let mut ids: Vec<i64> = repo
            .list_videos()
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.id)
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![a, b]);
    }

    #[tokio::test]
    async fn test_create_and_list_persons_sorted_by_name() {
        let repo = setup_repo().await;
        repo.create_person("Zoe", "zoe.png").await.unwrap();
        let ada = repo.create_person("Ada", "ada.png").await.unwrap();

        let persons = repo.list_persons().await.unwrap();
        assert_eq!(persons.len(), 2);
        assert_eq!(persons[0].name, "Ada");
        assert_eq!(repo.get_person(ada).await.unwrap().photo_path, "ada.png");
    }

    #[tokio::test]
    async fn test_replace_appearances_replaces_previous_set() {
        let repo = setup_repo().await;
        let ada = repo.create_person("Ada", "ada.png").await.unwrap();
        let bob = repo.create_person("Bob", "bob.png").await.unwrap();
        let video = repo
            .create_video(&NewVideo::from_path("/v/clip.mp4"))
            .await
            .unwrap();

        repo.replace_appearances(video, &[seg(ada, 0.0, 2.0), seg(bob, 5.0, 6.0)], "{}")
            .await
            .unwrap();
        repo.replace_appearances(video, &[seg(bob, 1.0, 4.0)], r#"{"v":2}"#)
            .await
            .unwrap();

        let rows = repo.list_appearances(video).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].person_name, "Bob");
        assert_eq!((rows[0].start_time, rows[0].end_time), (1.0, 4.0));

        let stored = repo.get_video(video).await.unwrap();
        assert!(stored.processed);
        assert_eq!(stored.analysis_result.as_deref(), Some(r#"{"v":2}"#));
        assert!(stored.processed_at.is_some());
    }

    #[tokio::test]
    async fn test_replace_appearances_is_atomic() {
        let repo = setup_repo().await;
        let ada = repo.create_person("Ada", "ada.png").await.unwrap();
        let video = repo
            .create_video(&NewVideo::from_path("/v/clip.mp4"))
            .await
            .unwrap();

        repo.replace_appearances(video, &[seg(ada, 0.0, 2.0)], "{}")
            .await
            .unwrap();

        // The second segment is invalid, so the whole replacement must roll back.
        let err = repo
            .replace_appearances(video, &[seg(ada, 3.0, 4.0), seg(ada, 9.0, 8.0)], "{}")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let rows = repo.list_appearances(video).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].start_time, 0.0);
    }

    #[tokio::test]
    async fn test_replace_appearances_unknown_video() {
        let repo = setup_repo().await;
        let err = repo.replace_appearances(7, &[], "{}").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
