use thiserror::Error;

/// The feed registry could not produce a snapshot. Fatal to starting a run.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Failed to list feeds: {0}")]
    Storage(String),
}

/// Errors that can occur while fetching and parsing one feed.
///
/// These errors cover the full lifecycle of a fetch: network issues,
/// HTTP errors, size limits and parsing failures.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Feed XML could not be parsed as RSS or Atom
    #[error("Parse error: {0}")]
    Parse(String),
    /// Response body exceeded the configured size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Errors from persisting a single article.
#[derive(Debug, Clone, Error)]
pub enum PersistError {
    #[error("Storage error: {0}")]
    Storage(String),
    /// The run was cancelled before this article was handed to the store.
    #[error("Cancelled before persisting")]
    Cancelled,
}
