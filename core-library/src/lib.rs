//! # Catalog Module
//!
//! Owns the movie/episode catalog database, the source of truth that the
//! search index is rebuilt from.
//!
//! ## Overview
//!
//! This module manages:
//! - SQLite connection pooling and schema migrations
//! - `Movie` and `Episode` models
//! - Repository traits consumed by the sync engine, with SQLite implementations
//! - 1-indexed pagination for full-index rebuilds

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;

pub use error::{LibraryError, Result};
pub use models::{Episode, Movie};
pub use repositories::{
    EpisodeRepository, MovieRepository, Page, PageRequest, SqliteEpisodeRepository,
    SqliteMovieRepository,
};
