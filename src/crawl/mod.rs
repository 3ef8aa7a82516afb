//! Feed crawling orchestrator.
//!
//! Turns a list of feed endpoints into a bounded-concurrency set of
//! fetch + parse + persist operations:
//!
//! - [`Crawler::run_crawl`] admits endpoints into a fixed-size pool and waits
//!   for every feed to settle
//! - [`Crawler::crawl_one`] fetches one feed and upserts each article,
//!   converting every failure into that feed's [`CrawlOutcome`]
//!
//! Collaborators (registry, fetcher, store) are reached through the traits in
//! [`traits`]. A failed feed never fails the batch; only a registry error
//! (see [`Crawler::crawl_registry`]) aborts a run.
//!
//! # Example
//!
//! ```ignore
//! let crawler = Crawler::new(Arc::new(source), Arc::new(db.clone()));
//! let batch = crawler.crawl_registry(&db, NonZeroUsize::new(10).unwrap()).await?;
//! println!("{} of {} feeds crawled", batch.succeeded(), batch.total());
//! ```

mod error;
mod scheduler;
mod task;
pub mod traits;
mod types;

pub use error::{FetchError, PersistError, RegistryError};
pub use scheduler::Crawler;
pub use traits::{ArticleStore, FeedRegistry, FeedSource};
pub use types::{
    ArticleReport, BatchSummary, CrawlBatchResult, CrawlEvent, CrawlOutcome, FailureReason,
    FeedEndpoint, FeedFailureSummary, FeedReport, Persisted, RawArticle,
};
