//! Domain models for the movie catalog
//!
//! Rows map directly onto these structs via `sqlx::FromRow`. Timestamps are
//! stored as unix epoch milliseconds; helpers convert them to `DateTime<Utc>`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// =============================================================================
// Movie
// =============================================================================

/// A movie or series in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Movie {
    /// Row id, assigned by the database
    #[serde(default)]
    pub id: i64,
    /// Stable public identifier, unique across the catalog
    pub slug: String,
    pub title: String,
    pub original_title: Option<String>,
    pub description: Option<String>,
    pub year: Option<i64>,
    /// "single" or "series"
    pub kind: String,
    /// "ongoing", "completed", ...
    pub status: String,
    pub poster_url: Option<String>,
    #[serde(default)]
    pub created_at: i64,
    /// Bumped on every write; drives incremental sync
    #[serde(default)]
    pub modified_at: i64,
}

impl Movie {
    /// New unsaved movie with both timestamps set to `now_millis`.
    pub fn new(slug: impl Into<String>, title: impl Into<String>, now_millis: i64) -> Self {
        Self {
            id: 0,
            slug: slug.into(),
            title: title.into(),
            original_title: None,
            description: None,
            year: None,
            kind: "series".to_string(),
            status: "ongoing".to_string(),
            poster_url: None,
            created_at: now_millis,
            modified_at: now_millis,
        }
    }

    /// Validate movie data
    pub fn validate(&self) -> Result<(), String> {
        if self.slug.trim().is_empty() {
            return Err("Movie slug cannot be empty".to_string());
        }

        if self.title.trim().is_empty() {
            return Err("Movie title cannot be empty".to_string());
        }

        if let Some(year) = self.year {
            if !(1880..=2100).contains(&year) {
                return Err(format!("Movie year {} is out of valid range", year));
            }
        }

        Ok(())
    }

    pub fn modified_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.modified_at)
    }
}

// =============================================================================
// Episode
// =============================================================================

/// A playable episode belonging to a movie
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    #[serde(default)]
    pub id: i64,
    pub slug: String,
    /// Slug of the parent movie
    pub movie_slug: String,
    pub name: String,
    pub episode_number: Option<i64>,
    pub server_name: Option<String>,
    pub link: Option<String>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub modified_at: i64,
}

impl Episode {
    pub fn new(
        slug: impl Into<String>,
        movie_slug: impl Into<String>,
        name: impl Into<String>,
        now_millis: i64,
    ) -> Self {
        Self {
            id: 0,
            slug: slug.into(),
            movie_slug: movie_slug.into(),
            name: name.into(),
            episode_number: None,
            server_name: None,
            link: None,
            created_at: now_millis,
            modified_at: now_millis,
        }
    }

    /// Validate episode data
    pub fn validate(&self) -> Result<(), String> {
        if self.slug.trim().is_empty() {
            return Err("Episode slug cannot be empty".to_string());
        }

        if self.movie_slug.trim().is_empty() {
            return Err("Episode must belong to a movie".to_string());
        }

        if let Some(number) = self.episode_number {
            if number < 0 {
                return Err("Episode number cannot be negative".to_string());
            }
        }

        Ok(())
    }
}
