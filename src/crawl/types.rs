use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use super::error::{FetchError, PersistError};

// ============================================================================
// Inputs
// ============================================================================

/// Locator of one RSS/Atom source.
///
/// Backed by `Arc<str>` so the scheduler, per-feed task, events and reports can
/// all hold the same endpoint without copying the URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeedEndpoint(Arc<str>);

impl FeedEndpoint {
    pub fn new(url: impl Into<Arc<str>>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeedEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FeedEndpoint {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

impl From<String> for FeedEndpoint {
    fn from(url: String) -> Self {
        Self::new(url)
    }
}

impl Serialize for FeedEndpoint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Normalized article produced by fetching and parsing one feed.
///
/// `identity` is stable across fetches of the same entry and is the upsert key
/// for persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct RawArticle {
    pub identity: String,
    pub feed: FeedEndpoint,
    pub guid: String,
    pub title: String,
    pub url: Option<String>,
    /// Unix timestamp (seconds)
    pub published: Option<i64>,
    /// Plain-text summary, HTML stripped and truncated for display
    pub summary: Option<String>,
    /// Raw entry body as published by the feed
    pub content: Option<String>,
    pub image_url: Option<String>,
}

impl RawArticle {
    /// Short public handle used for article lookup.
    pub fn slug(&self) -> &str {
        let end = self.identity.len().min(16);
        &self.identity[..end]
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// What a successful create-or-update did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Persisted {
    Created,
    Updated,
}

/// Settled result of persisting one article.
#[derive(Debug)]
pub struct ArticleReport {
    pub identity: String,
    pub result: Result<Persisted, PersistError>,
}

/// Why a feed was marked failed.
#[derive(Debug)]
pub enum FailureReason {
    /// Fetch/parse failed; nothing was persisted.
    Fetch(FetchError),
    /// At least one article failed to persist. Articles that succeeded remain
    /// stored.
    Persist {
        failed: usize,
        attempted: usize,
        first: PersistError,
    },
    /// The run was cancelled before this feed was started.
    Cancelled,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Fetch(e) => write!(f, "fetch failed: {}", e),
            FailureReason::Persist {
                failed,
                attempted,
                first,
            } => write!(
                f,
                "{} of {} articles failed to persist (first: {})",
                failed, attempted, first
            ),
            FailureReason::Cancelled => f.write_str("cancelled before start"),
        }
    }
}

#[derive(Debug)]
pub enum CrawlOutcome {
    Succeeded,
    Failed(FailureReason),
}

impl CrawlOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CrawlOutcome::Succeeded)
    }
}

/// Everything the per-feed task learned about one feed.
#[derive(Debug)]
pub struct FeedReport {
    pub endpoint: FeedEndpoint,
    pub outcome: CrawlOutcome,
    /// One entry per fetched article, in feed order.
    pub articles: Vec<ArticleReport>,
}

impl FeedReport {
    pub(crate) fn fetch_failed(endpoint: FeedEndpoint, error: FetchError) -> Self {
        Self {
            endpoint,
            outcome: CrawlOutcome::Failed(FailureReason::Fetch(error)),
            articles: Vec::new(),
        }
    }

    pub(crate) fn cancelled(endpoint: FeedEndpoint) -> Self {
        Self {
            endpoint,
            outcome: CrawlOutcome::Failed(FailureReason::Cancelled),
            articles: Vec::new(),
        }
    }

    /// Number of articles newly created by this crawl.
    pub fn created(&self) -> usize {
        self.count(Persisted::Created)
    }

    /// Number of existing articles refreshed by this crawl.
    pub fn updated(&self) -> usize {
        self.count(Persisted::Updated)
    }

    fn count(&self, kind: Persisted) -> usize {
        self.articles
            .iter()
            .filter(|a| matches!(&a.result, Ok(p) if *p == kind))
            .count()
    }
}

/// Aggregate of every feed report for one run.
///
/// Reports are in completion order. Used for observability only.
#[derive(Debug, Default)]
pub struct CrawlBatchResult {
    pub reports: Vec<FeedReport>,
}

impl CrawlBatchResult {
    pub fn total(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| r.outcome.is_success())
            .count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    pub fn report_for(&self, endpoint: &FeedEndpoint) -> Option<&FeedReport> {
        self.reports.iter().find(|r| &r.endpoint == endpoint)
    }

    pub fn summary(&self) -> BatchSummary {
        let failures = self
            .reports
            .iter()
            .filter_map(|r| match &r.outcome {
                CrawlOutcome::Failed(reason) => Some(FeedFailureSummary {
                    feed: r.endpoint.clone(),
                    reason: reason.to_string(),
                }),
                CrawlOutcome::Succeeded => None,
            })
            .collect();

        BatchSummary {
            feeds: self.total(),
            succeeded: self.succeeded(),
            failed: self.failed(),
            articles_created: self.reports.iter().map(FeedReport::created).sum(),
            articles_updated: self.reports.iter().map(FeedReport::updated).sum(),
            failures,
        }
    }
}

/// Serializable digest of a [`CrawlBatchResult`].
#[derive(Debug, Serialize)]
pub struct BatchSummary {
    pub feeds: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub articles_created: usize,
    pub articles_updated: usize,
    pub failures: Vec<FeedFailureSummary>,
}

#[derive(Debug, Serialize)]
pub struct FeedFailureSummary {
    pub feed: FeedEndpoint,
    pub reason: String,
}

// ============================================================================
// Events
// ============================================================================

/// Structured progress events emitted by the crawler.
///
/// Delivered over an optional unbounded channel handed to the crawler at
/// construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlEvent {
    RunStarted {
        feeds: usize,
    },
    FeedStarted {
        endpoint: FeedEndpoint,
    },
    FeedSucceeded {
        endpoint: FeedEndpoint,
        articles: usize,
        created: usize,
    },
    FeedFailed {
        endpoint: FeedEndpoint,
        reason: String,
    },
    RunFinished {
        succeeded: usize,
        failed: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(identity: &str) -> RawArticle {
        RawArticle {
            identity: identity.to_string(),
            feed: FeedEndpoint::from("https://example.com/feed.xml"),
            guid: "guid".to_string(),
            title: "Title".to_string(),
            url: None,
            published: None,
            summary: None,
            content: None,
            image_url: None,
        }
    }

    #[test]
    fn test_slug_is_identity_prefix() {
        let a = article("0123456789abcdef0123456789abcdef");
        assert_eq!(a.slug(), "0123456789abcdef");

        let short = article("abc");
        assert_eq!(short.slug(), "abc");
    }

    #[test]
    fn test_summary_counts_outcomes() {
        let ok = FeedReport {
            endpoint: "https://a.example/rss".into(),
            outcome: CrawlOutcome::Succeeded,
            articles: vec![
                ArticleReport {
                    identity: "1".into(),
                    result: Ok(Persisted::Created),
                },
                ArticleReport {
                    identity: "2".into(),
                    result: Ok(Persisted::Updated),
                },
            ],
        };
        let failed = FeedReport::fetch_failed(
            "https://b.example/rss".into(),
            FetchError::HttpStatus(404),
        );
        let batch = CrawlBatchResult {
            reports: vec![ok, failed],
        };

        let summary = batch.summary();
        assert_eq!(summary.feeds, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.articles_created, 1);
        assert_eq!(summary.articles_updated, 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].feed.as_str(), "https://b.example/rss");
        assert!(summary.failures[0].reason.contains("404"));
    }

    #[test]
    fn test_summary_serializes_endpoint_as_string() {
        let batch = CrawlBatchResult {
            reports: vec![FeedReport::cancelled("https://c.example/rss".into())],
        };
        let json = serde_json::to_value(batch.summary()).unwrap();
        assert_eq!(json["failures"][0]["feed"], "https://c.example/rss");
        assert_eq!(json["failed"], 1);
    }
}
