//! Watchlist notification hook invoked for every movie an incremental pass
//! touches.

use async_trait::async_trait;
use bridge_traits::error::Result;

#[async_trait]
pub trait WatchlistNotifier: Send + Sync {
    /// Notify users watching `movie_slug` about newly available episodes.
    async fn check_and_notify(&self, movie_slug: &str) -> Result<()>;
}

/// Notifier for hosts without a watchlist service.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl WatchlistNotifier for NoopNotifier {
    async fn check_and_notify(&self, _movie_slug: &str) -> Result<()> {
        Ok(())
    }
}
