use futures::future::join_all;

use super::error::PersistError;
use super::scheduler::Crawler;
use super::types::{
    ArticleReport, CrawlEvent, CrawlOutcome, FailureReason, FeedEndpoint, FeedReport, Persisted,
    RawArticle,
};

impl Crawler {
    /// Crawls a single feed end to end.
    ///
    /// Never fails: fetch errors, persistence errors and cancellation all
    /// settle into the returned report. Per-article upserts are dispatched
    /// together and each commits independently, so a `Failed` outcome does
    /// not mean nothing was written.
    pub async fn crawl_one(&self, endpoint: FeedEndpoint) -> FeedReport {
        if self.cancel.is_cancelled() {
            let report = FeedReport::cancelled(endpoint);
            self.finish(&report);
            return report;
        }

        tracing::info!(feed = %endpoint, "Start to crawl feed");
        self.emit(CrawlEvent::FeedStarted {
            endpoint: endpoint.clone(),
        });

        let articles = match self.source.fetch(&endpoint).await {
            Ok(articles) => articles,
            Err(e) => {
                let report = FeedReport::fetch_failed(endpoint, e);
                self.finish(&report);
                return report;
            }
        };

        let results = join_all(articles.iter().map(|article| self.persist(article))).await;
        let articles: Vec<ArticleReport> = articles
            .into_iter()
            .zip(results)
            .map(|(article, result)| ArticleReport {
                identity: article.identity,
                result,
            })
            .collect();

        let report = FeedReport {
            endpoint,
            outcome: reduce(&articles),
            articles,
        };
        self.finish(&report);
        report
    }

    async fn persist(&self, article: &RawArticle) -> Result<Persisted, PersistError> {
        if self.cancel.is_cancelled() {
            return Err(PersistError::Cancelled);
        }

        let result = self.store.create_or_update(article).await;
        if let Err(e) = &result {
            tracing::debug!(
                feed = %article.feed,
                identity = %article.identity,
                error = %e,
                "Article failed to persist"
            );
        }
        result
    }

    fn finish(&self, report: &FeedReport) {
        let endpoint = report.endpoint.clone();
        match &report.outcome {
            CrawlOutcome::Succeeded => {
                let created = report.created();
                tracing::info!(
                    feed = %endpoint,
                    articles = report.articles.len(),
                    created = created,
                    "Crawl feed success"
                );
                self.emit(CrawlEvent::FeedSucceeded {
                    endpoint,
                    articles: report.articles.len(),
                    created,
                });
            }
            CrawlOutcome::Failed(reason) => {
                tracing::warn!(feed = %endpoint, error = %reason, "Crawl feed failed");
                self.emit(CrawlEvent::FeedFailed {
                    endpoint,
                    reason: reason.to_string(),
                });
            }
        }
    }
}

/// Feed outcome as a pure reduction over settled per-article results.
fn reduce(articles: &[ArticleReport]) -> CrawlOutcome {
    let mut failures = articles.iter().filter_map(|a| a.result.as_ref().err());
    match failures.next() {
        None => CrawlOutcome::Succeeded,
        Some(first) => CrawlOutcome::Failed(FailureReason::Persist {
            failed: 1 + failures.count(),
            attempted: articles.len(),
            first: first.clone(),
        }),
    }
}
