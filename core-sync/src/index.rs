//! Search index port.
//!
//! The coordinator treats the index as an opaque capability: it hands over
//! catalog rows and reads back document counts. Hosts implement
//! [`SearchIndex`] for their search backend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bridge_traits::error::Result;
use core_library::{Episode, Movie};
use serde::{Deserialize, Serialize};

/// Index holding one document per movie.
pub const MOVIES_INDEX: &str = "movies";

/// Index holding one document per episode.
pub const EPISODES_INDEX: &str = "episodes";

/// Per-index statistics reported by the health call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub doc_count: u64,
}

/// Health passthrough from the search backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexHealth {
    /// Backend cluster status, e.g. "green"
    pub status: String,
    pub indexes: BTreeMap<String, IndexStats>,
}

impl IndexHealth {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            indexes: BTreeMap::new(),
        }
    }

    pub fn with_index(mut self, name: impl Into<String>, doc_count: u64) -> Self {
        self.indexes.insert(name.into(), IndexStats { doc_count });
        self
    }

    /// Document count of `index`; a missing index counts as empty.
    pub fn doc_count(&self, index: &str) -> u64 {
        self.indexes.get(index).map_or(0, |stats| stats.doc_count)
    }
}

/// Write and health operations against the search backend.
///
/// Index writes are idempotent upserts keyed by slug, so concurrent
/// callers converge on whichever write lands last.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Bulk-index a batch of movies
    async fn index_movies(&self, movies: &[Movie]) -> Result<()>;

    async fn index_movie(&self, movie: &Movie) -> Result<()>;

    /// Bulk-index a batch of episodes
    async fn index_episodes(&self, episodes: &[Episode]) -> Result<()>;

    async fn index_episode(&self, episode: &Episode) -> Result<()>;

    async fn delete_movie(&self, slug: &str) -> Result<()>;

    async fn delete_episode(&self, slug: &str) -> Result<()>;

    /// Drop and recreate every index. Destructive.
    async fn reindex(&self) -> Result<()>;

    async fn health(&self) -> Result<IndexHealth>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_index_counts_as_empty() {
        let health = IndexHealth::new("yellow").with_index(MOVIES_INDEX, 495);

        assert_eq!(health.doc_count(MOVIES_INDEX), 495);
        assert_eq!(health.doc_count(EPISODES_INDEX), 0);
    }
}
