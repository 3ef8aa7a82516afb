use anyhow::Result;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::{is_lock_message, DatabaseError};

const IN_MEMORY: &str = ":memory:";

// ============================================================================
// Database
// ============================================================================

/// SQLite-backed blog registry and article store.
///
/// Implements [`FeedRegistry`](crate::crawl::FeedRegistry) and
/// [`ArticleStore`](crate::crawl::ArticleStore), so one handle serves both
/// ends of a crawl. Cloning shares the pool.
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection and run migrations.
    ///
    /// `":memory:"` opens a private in-memory database, useful for tests.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InstanceLocked` if another process holds the
    /// database lock, `DatabaseError::Migration` if the schema cannot be
    /// created, and `DatabaseError::Other` for anything else.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let in_memory = path == IN_MEMORY;
        let url = format!("sqlite:{}?mode=rwc", path);

        // SEC-010: Create the database file owner-only before SQLite touches it
        #[cfg(unix)]
        if !in_memory {
            restrict_permissions(std::path::Path::new(path));
        }

        // busy_timeout=5000: concurrent per-article transactions wait up to
        // 5 seconds for the write lock instead of failing with SQLITE_BUSY.
        let mut options = SqliteConnectOptions::from_str(&url)
            .map_err(DatabaseError::from_sqlx)?
            .pragma("busy_timeout", "5000")
            .foreign_keys(true);

        // WAL lets readers run alongside the single writer. In-memory
        // databases have no journal file to switch.
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // An in-memory database lives and dies with its connection, so it gets
        // exactly one that is never recycled.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            // SQLite is single-writer; extra connections only serve readers.
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        let db = Self { pool };
        db.migrate().await.map_err(|e| {
            if is_lock_message(&e.to_string()) {
                DatabaseError::InstanceLocked
            } else {
                DatabaseError::Migration(e.to_string())
            }
        })?;

        tracing::debug!(path = %path, "Database ready");
        Ok(db)
    }

    /// Creates the schema inside one transaction.
    ///
    /// Every statement uses `IF NOT EXISTS`, so re-running on an existing
    /// database is a no-op.
    async fn migrate(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS blogs (
                id INTEGER PRIMARY KEY,
                author TEXT NOT NULL,
                feed_url TEXT UNIQUE NOT NULL,
                site_url TEXT,
                created_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // Articles are keyed by identity, not by blog: a crawl may be handed
        // endpoints that are not registered, and removing a blog keeps what
        // was already collected.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                id INTEGER PRIMARY KEY,
                identity TEXT UNIQUE NOT NULL,
                slug TEXT UNIQUE NOT NULL,
                feed_url TEXT NOT NULL,
                guid TEXT NOT NULL,
                title TEXT NOT NULL,
                url TEXT,
                published INTEGER,
                summary TEXT,
                content TEXT,
                image_url TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_articles_feed ON articles(feed_url)")
            .execute(&mut *tx)
            .await?;

        // Newest-first listing in recent_articles()
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_articles_published ON articles(published DESC, id DESC)",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(db_path: &std::path::Path) {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    if db_path.exists() {
        let perms = std::fs::Permissions::from_mode(0o600);
        if let Err(e) = std::fs::set_permissions(db_path, perms) {
            tracing::warn!(path = %db_path.display(), error = %e, "SEC-010: Failed to set database file permissions");
        }
    } else if db_path.parent().is_some_and(|p| p.as_os_str().is_empty() || p.exists()) {
        // mode() applies at creation time, so there is no window with umask permissions.
        // If creation fails, SQLite reports the error at connect_with.
        let _file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(db_path)
            .ok();
    }
}
