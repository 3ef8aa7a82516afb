use serde::Serialize;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another bloghub process holds the database lock
    #[error("The database is locked by another bloghub process. Wait for it to finish and try again.")]
    InstanceLocked,

    #[error("Database migration failed: {0}")]
    Migration(String),

    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Classifies a sqlx error, mapping lock contention to `InstanceLocked`.
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return DatabaseError::InstanceLocked;
        }
        DatabaseError::Other(err)
    }
}

/// SQLITE_BUSY (5), SQLITE_LOCKED (6) and SQLITE_CANTOPEN (14) messages.
pub(crate) fn is_lock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
        || message.contains("unable to open database file")
}

// ============================================================================
// Data Structures
// ============================================================================

/// A registered blog. Its `feed_url` is what the crawler fetches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Blog {
    pub id: i64,
    pub author: String,
    pub feed_url: String,
    pub site_url: Option<String>,
    /// Unix timestamp (seconds) of first registration
    pub created_at: i64,
}

/// An article as stored by the crawler.
///
/// `created_at` is the first time the crawler saw the article; `updated_at`
/// moves on every re-crawl that finds it again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct StoredArticle {
    pub id: i64,
    pub identity: String,
    pub slug: String,
    pub feed_url: String,
    pub guid: String,
    pub title: String,
    pub url: Option<String>,
    pub published: Option<i64>,
    pub summary: Option<String>,
    #[serde(skip)]
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}
