use futures::stream::{self, StreamExt};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::error::RegistryError;
use super::traits::{ArticleStore, FeedRegistry, FeedSource};
use super::types::{CrawlBatchResult, CrawlEvent, FeedEndpoint, FeedReport};

/// Bounded-concurrency crawler.
///
/// Owns the fetch and persistence collaborators plus the optional event sink
/// and cancellation token. Cloning is cheap; clones share collaborators and the
/// token.
#[derive(Clone)]
pub struct Crawler {
    pub(super) source: Arc<dyn FeedSource>,
    pub(super) store: Arc<dyn ArticleStore>,
    events: Option<mpsc::UnboundedSender<CrawlEvent>>,
    pub(super) cancel: CancellationToken,
}

impl Crawler {
    pub fn new(source: Arc<dyn FeedSource>, store: Arc<dyn ArticleStore>) -> Self {
        Self {
            source,
            store,
            events: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Sends structured [`CrawlEvent`]s to `tx`.
    ///
    /// The channel is unbounded so a slow consumer never holds a pool slot.
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<CrawlEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that stops the crawler from starting new feeds or persisting
    /// further articles. Feeds already past those checks run to completion.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Takes a registry snapshot and crawls it.
    ///
    /// # Errors
    ///
    /// Only a registry failure is returned; it aborts the run before any feed
    /// is touched. Feed-level failures are reported inside the batch result.
    pub async fn crawl_registry(
        &self,
        registry: &dyn FeedRegistry,
        concurrency: NonZeroUsize,
    ) -> Result<CrawlBatchResult, RegistryError> {
        let endpoints = registry.list_feeds().await.inspect_err(|e| {
            tracing::error!(error = %e, "Failed to load feed list, aborting crawl");
        })?;
        Ok(self.run_crawl(endpoints, concurrency).await)
    }

    /// Crawls every endpoint with at most `concurrency` feeds in flight.
    ///
    /// Endpoints are admitted in submission order as slots free up. Returns
    /// once every feed has settled, successfully or not; reports are in
    /// completion order.
    pub async fn run_crawl(
        &self,
        endpoints: Vec<FeedEndpoint>,
        concurrency: NonZeroUsize,
    ) -> CrawlBatchResult {
        let total = endpoints.len();
        tracing::info!(
            feeds = total,
            concurrency = concurrency.get(),
            "Start to crawl feeds"
        );
        self.emit(CrawlEvent::RunStarted { feeds: total });

        let reports: Vec<FeedReport> = stream::iter(endpoints)
            .map(|endpoint| self.crawl_one(endpoint))
            .buffer_unordered(concurrency.get())
            .collect()
            .await;

        let batch = CrawlBatchResult { reports };
        let (succeeded, failed) = (batch.succeeded(), batch.failed());
        tracing::info!(
            feeds = total,
            succeeded = succeeded,
            failed = failed,
            "Crawl finished"
        );
        self.emit(CrawlEvent::RunFinished { succeeded, failed });

        batch
    }

    pub(super) fn emit(&self, event: CrawlEvent) {
        if let Some(tx) = &self.events {
            if tx.send(event).is_err() {
                tracing::debug!("Crawl event receiver dropped");
            }
        }
    }
}
