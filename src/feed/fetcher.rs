use async_trait::async_trait;
use futures::stream::StreamExt;
use std::time::Duration;

use crate::config::Config;
use crate::crawl::{FeedEndpoint, FeedSource, FetchError, RawArticle};
use crate::feed::parser::parse_feed;

/// HTTP implementation of [`FeedSource`].
///
/// Issues exactly one GET per feed per run; a failed feed waits for the next
/// run rather than being retried.
#[derive(Clone)]
pub struct HttpFeedSource {
    client: reqwest::Client,
    timeout: Duration,
    max_bytes: usize,
    summary_width: usize,
}

impl HttpFeedSource {
    /// Builds a source with its own client configured from `config`.
    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.fetch_timeout())
            .build()?;
        Ok(Self::with_client(client, config))
    }

    /// Uses a caller-supplied client (allows custom configuration).
    pub fn with_client(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            timeout: config.fetch_timeout(),
            max_bytes: config.max_feed_bytes,
            summary_width: config.summary_width,
        }
    }

    async fn download(&self, endpoint: &FeedEndpoint) -> Result<Vec<u8>, FetchError> {
        // One deadline covers both the request and the body read
        let deadline = tokio::time::Instant::now() + self.timeout;

        let response = tokio::time::timeout_at(deadline, self.client.get(endpoint.as_str()).send())
            .await
            .map_err(|_| FetchError::Timeout)??;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        tokio::time::timeout_at(deadline, read_limited_bytes(response, self.max_bytes))
            .await
            .map_err(|_| FetchError::Timeout)?
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self, endpoint: &FeedEndpoint) -> Result<Vec<RawArticle>, FetchError> {
        let bytes = self.download(endpoint).await?;
        let articles = parse_feed(endpoint, &bytes, self.summary_width)
            .map_err(|e| FetchError::Parse(e.to_string()))?;

        tracing::debug!(
            feed = %endpoint,
            bytes = bytes.len(),
            articles = articles.len(),
            "Feed fetched"
        );
        Ok(articles)
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
