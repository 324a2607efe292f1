//! Movie repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::models::Movie;
use crate::repositories::{Page, PageRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{query_as, SqlitePool};

/// Movie repository interface for data access operations
#[async_trait]
pub trait MovieRepository: Send + Sync {
    /// List movies in insertion order
    ///
    /// Pages are 1-indexed; a page past the end has no items.
    async fn list(&self, page_request: PageRequest) -> Result<Page<Movie>>;

    /// Every movie slug in the catalog
    async fn all_slugs(&self) -> Result<Vec<String>>;

    /// Find a movie by slug
    ///
    /// # Returns
    /// - `Ok(Some(movie))` if found
    /// - `Ok(None)` if not found
    async fn find_by_slug(&self, slug: &str) -> Result<Option<Movie>>;

    /// Movies whose `modified_at` is strictly after `since`, oldest first
    async fn find_modified_since(&self, since: DateTime<Utc>) -> Result<Vec<Movie>>;

    /// Count total movies
    async fn count(&self) -> Result<i64>;

    /// Insert a movie or update the existing row with the same slug
    async fn upsert(&self, movie: &Movie) -> Result<()>;

    /// Delete a movie by slug
    ///
    /// # Returns
    /// - `Ok(true)` if the movie was deleted
    /// - `Ok(false)` if it was not found
    async fn delete(&self, slug: &str) -> Result<bool>;
}

/// SQLite implementation of MovieRepository
pub struct SqliteMovieRepository {
    pool: SqlitePool,
}

impl SqliteMovieRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MovieRepository for SqliteMovieRepository {
    async fn list(&self, page_request: PageRequest) -> Result<Page<Movie>> {
        let total = self.count().await?;

        let movies = query_as::<_, Movie>("SELECT * FROM movies ORDER BY id LIMIT ? OFFSET ?")
            .bind(i64::from(page_request.limit()))
            .bind(page_request.offset() as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(Page::new(movies, total.max(0) as u64, page_request))
    }

    async fn all_slugs(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT slug FROM movies ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|(slug,)| slug).collect())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Movie>> {
        let movie = query_as::<_, Movie>("SELECT * FROM movies WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;

        Ok(movie)
    }

    async fn find_modified_since(&self, since: DateTime<Utc>) -> Result<Vec<Movie>> {
        let movies = query_as::<_, Movie>(
            "SELECT * FROM movies WHERE modified_at > ? ORDER BY modified_at, id",
        )
        .bind(since.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;

        Ok(movies)
    }

    async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM movies")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn upsert(&self, movie: &Movie) -> Result<()> {
        movie.validate().map_err(|msg| LibraryError::InvalidInput {
            field: "movie".to_string(),
            message: msg,
        })?;

        sqlx::query(
            r#"
            INSERT INTO movies (
                slug, title, original_title, description, year,
                kind, status, poster_url, created_at, modified_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(slug) DO UPDATE SET
                title = excluded.title,
                original_title = excluded.original_title,
                description = excluded.description,
                year = excluded.year,
                kind = excluded.kind,
                status = excluded.status,
                poster_url = excluded.poster_url,
                modified_at = excluded.modified_at
            "#,
        )
        .bind(&movie.slug)
        .bind(&movie.title)
        .bind(&movie.original_title)
        .bind(&movie.description)
        .bind(movie.year)
        .bind(&movie.kind)
        .bind(&movie.status)
        .bind(&movie.poster_url)
        .bind(movie.created_at)
        .bind(movie.modified_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, slug: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM movies WHERE slug = ?")
            .bind(slug)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use chrono::Duration;

    const BASE_MILLIS: i64 = 1_700_000_000_000;

    async fn seeded_repo(count: usize) -> SqliteMovieRepository {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteMovieRepository::new(pool);

        for i in 0..count {
            let movie = Movie::new(
                format!("movie-{}", i),
                format!("Movie {}", i),
                BASE_MILLIS + i as i64 * 1000,
            );
            repo.upsert(&movie).await.unwrap();
        }

        repo
    }

    #[tokio::test]
    async fn test_upsert_and_find() {
        let repo = seeded_repo(1).await;

        let found = repo.find_by_slug("movie-0").await.unwrap().unwrap();
        assert_eq!(found.title, "Movie 0");
        assert!(found.id > 0);

        assert!(repo.find_by_slug("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_updates_existing_slug() {
        let repo = seeded_repo(1).await;

        let mut movie = repo.find_by_slug("movie-0").await.unwrap().unwrap();
        movie.title = "Renamed".to_string();
        movie.modified_at += 5000;
        repo.upsert(&movie).await.unwrap();

        assert_eq!(repo.count().await.unwrap(), 1);
        let found = repo.find_by_slug("movie-0").await.unwrap().unwrap();
        assert_eq!(found.title, "Renamed");
        assert_eq!(found.id, movie.id);
    }

    #[tokio::test]
    async fn test_upsert_rejects_invalid_movie() {
        let repo = seeded_repo(0).await;

        let result = repo.upsert(&Movie::new("", "No slug", BASE_MILLIS)).await;
        assert!(matches!(result, Err(LibraryError::InvalidInput { .. })));
    }

    #[tokio::test]
    async fn test_list_pages_until_empty() {
        let repo = seeded_repo(5).await;

        let first = repo.list(PageRequest::first(2)).await.unwrap();
        assert_eq!(first.total, 5);
        assert_eq!(first.total_pages, 3);
        let slugs: Vec<_> = first.items.iter().map(|m| m.slug.as_str()).collect();
        assert_eq!(slugs, vec!["movie-0", "movie-1"]);

        let third = repo.list(PageRequest::new(3, 2)).await.unwrap();
        assert_eq!(third.items.len(), 1);
        assert_eq!(third.items[0].slug, "movie-4");

        let fourth = repo.list(PageRequest::new(4, 2)).await.unwrap();
        assert!(fourth.is_empty());
    }

    #[tokio::test]
    async fn test_find_modified_since_is_exclusive() {
        let repo = seeded_repo(3).await;
        let since = DateTime::from_timestamp_millis(BASE_MILLIS + 1000).unwrap();

        let modified = repo.find_modified_since(since).await.unwrap();
        assert_eq!(modified.len(), 1);
        assert_eq!(modified[0].slug, "movie-2");

        let all = repo
            .find_modified_since(since - Duration::days(1))
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_all_slugs_and_delete() {
        let repo = seeded_repo(3).await;

        assert_eq!(
            repo.all_slugs().await.unwrap(),
            vec!["movie-0", "movie-1", "movie-2"]
        );
        assert!(repo.delete("movie-1").await.unwrap());
        assert!(!repo.delete("movie-1").await.unwrap());
        assert_eq!(repo.count().await.unwrap(), 2);
    }
}
