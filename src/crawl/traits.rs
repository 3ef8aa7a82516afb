//! Collaborator seams consumed by the crawler.
//!
//! The crate ships SQLite ([`crate::storage::Database`]) and HTTP
//! ([`crate::feed::HttpFeedSource`]) implementations; tests substitute
//! instrumented fakes.

use async_trait::async_trait;

use super::error::{FetchError, PersistError, RegistryError};
use super::types::{FeedEndpoint, Persisted, RawArticle};

/// Source of the feed list for a run.
#[async_trait]
pub trait FeedRegistry: Send + Sync {
    /// Snapshot of every known feed endpoint. May be empty.
    async fn list_feeds(&self) -> Result<Vec<FeedEndpoint>, RegistryError>;
}

/// Fetches one feed and normalizes its entries.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Returns every article in the feed, or an error with no partial results.
    async fn fetch(&self, endpoint: &FeedEndpoint) -> Result<Vec<RawArticle>, FetchError>;
}

/// Idempotent article store.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Upsert keyed by [`RawArticle::identity`]. Each call commits on its own.
    async fn create_or_update(&self, article: &RawArticle) -> Result<Persisted, PersistError>;
}
