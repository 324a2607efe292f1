//! Episode repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::models::Episode;
use async_trait::async_trait;
use sqlx::{query_as, SqlitePool};

/// Episode repository interface for data access operations
#[async_trait]
pub trait EpisodeRepository: Send + Sync {
    /// Episodes of one movie, in episode order
    async fn find_by_movie_slug(&self, movie_slug: &str) -> Result<Vec<Episode>>;

    /// Find an episode by slug
    async fn find_by_slug(&self, slug: &str) -> Result<Option<Episode>>;

    /// Count total episodes
    async fn count(&self) -> Result<i64>;

    /// Insert an episode or update the existing row with the same slug
    async fn upsert(&self, episode: &Episode) -> Result<()>;

    /// Delete an episode by slug
    async fn delete(&self, slug: &str) -> Result<bool>;
}

/// SQLite implementation of EpisodeRepository
pub struct SqliteEpisodeRepository {
    pool: SqlitePool,
}

impl SqliteEpisodeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EpisodeRepository for SqliteEpisodeRepository {
    async fn find_by_movie_slug(&self, movie_slug: &str) -> Result<Vec<Episode>> {
        let episodes = query_as::<_, Episode>(
            "SELECT * FROM episodes WHERE movie_slug = ? ORDER BY episode_number, id",
        )
        .bind(movie_slug)
        .fetch_all(&self.pool)
        .await?;

        Ok(episodes)
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Episode>> {
        let episode = query_as::<_, Episode>("SELECT * FROM episodes WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;

        Ok(episode)
    }

    async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM episodes")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn upsert(&self, episode: &Episode) -> Result<()> {
        episode.validate().map_err(|msg| LibraryError::InvalidInput {
            field: "episode".to_string(),
            message: msg,
        })?;

        sqlx::query(
            r#"
            INSERT INTO episodes (
                slug, movie_slug, name, episode_number, server_name, link,
                created_at, modified_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(slug) DO UPDATE SET
                movie_slug = excluded.movie_slug,
                name = excluded.name,
                episode_number = excluded.episode_number,
                server_name = excluded.server_name,
                link = excluded.link,
                modified_at = excluded.modified_at
            "#,
        )
        .bind(&episode.slug)
        .bind(&episode.movie_slug)
        .bind(&episode.name)
        .bind(episode.episode_number)
        .bind(&episode.server_name)
        .bind(&episode.link)
        .bind(episode.created_at)
        .bind(episode.modified_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, slug: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM episodes WHERE slug = ?")
            .bind(slug)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
