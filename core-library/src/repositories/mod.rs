//! # Repository Pattern Implementation
//!
//! Repository traits for the catalog plus their SQLite implementations.
//!
//! - Traits define the interface the sync engine consumes
//! - SQLite implementations use sqlx for async database access
//! - All operations return `Result<T>`
//!
//! ## Available Repositories
//!
//! - `MovieRepository` - Movies with paging, slug lookup and change tracking
//! - `EpisodeRepository` - Episodes grouped by parent movie

pub mod episode;
pub mod movie;
pub mod pagination;

pub use episode::{EpisodeRepository, SqliteEpisodeRepository};
pub use movie::{MovieRepository, SqliteMovieRepository};
pub use pagination::{Page, PageRequest};
