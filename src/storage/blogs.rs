use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::Blog;
use crate::crawl::{FeedEndpoint, FeedRegistry, RegistryError};
use crate::feed::OpmlBlog;
use crate::util::validate_feed_url;

impl Database {
    // ========================================================================
    // Blog Registry
    // ========================================================================

    /// Registers a blog, or updates author and site if the feed is known.
    ///
    /// Both URLs are validated; the stored feed URL is the normalized form.
    pub async fn add_blog(
        &self,
        author: &str,
        feed_url: &str,
        site_url: Option<&str>,
    ) -> Result<Blog> {
        let author = author.trim();
        anyhow::ensure!(!author.is_empty(), "Author name must not be empty");

        let feed_url = validate_feed_url(feed_url)
            .with_context(|| format!("Invalid feed URL: {}", feed_url))?;
        let site_url = site_url
            .map(|raw| {
                validate_feed_url(raw).with_context(|| format!("Invalid site URL: {}", raw))
            })
            .transpose()?
            .map(|url| url.to_string());

        let now = chrono::Utc::now().timestamp();
        let blog = sqlx::query_as::<_, Blog>(
            r#"
            INSERT INTO blogs (author, feed_url, site_url, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(feed_url) DO UPDATE SET
                author = excluded.author,
                site_url = excluded.site_url
            RETURNING id, author, feed_url, site_url, created_at
        "#,
        )
        .bind(author)
        .bind(feed_url.as_str())
        .bind(&site_url)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(author = %blog.author, feed = %blog.feed_url, "Blog registered");
        Ok(blog)
    }

    /// Removes a blog from the registry. Its collected articles are kept.
    ///
    /// Returns `false` if no blog had that feed URL.
    pub async fn remove_blog(&self, feed_url: &str) -> Result<bool> {
        // Stored URLs are normalized, so try the normalized form first
        let normalized = validate_feed_url(feed_url)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| feed_url.trim().to_string());

        let result = sqlx::query("DELETE FROM blogs WHERE feed_url = ? OR feed_url = ?")
            .bind(&normalized)
            .bind(feed_url)
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected() > 0;
        if removed {
            tracing::info!(feed = %normalized, "Blog removed");
        }
        Ok(removed)
    }

    /// All registered blogs in registration order.
    pub async fn list_blogs(&self) -> Result<Vec<Blog>> {
        let blogs = sqlx::query_as::<_, Blog>(
            "SELECT id, author, feed_url, site_url, created_at FROM blogs ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(blogs)
    }

    /// Bulk upsert from an OPML import. Returns the number of entries written.
    ///
    /// Entries are already validated by the OPML parser.
    pub async fn sync_blogs(&self, blogs: &[OpmlBlog]) -> Result<usize> {
        if blogs.is_empty() {
            return Ok(0);
        }

        // PERF-001: Batch INSERT in chunks of 100 (4 binds each, well under SQLite's 999 limit)
        const BATCH_SIZE: usize = 100;
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for chunk in blogs.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> =
                QueryBuilder::new("INSERT INTO blogs (author, feed_url, site_url, created_at) ");

            builder.push_values(chunk, |mut b, blog| {
                b.push_bind(&blog.author)
                    .push_bind(&blog.feed_url)
                    .push_bind(&blog.site_url)
                    .push_bind(now);
            });

            builder.push(
                " ON CONFLICT(feed_url) DO UPDATE SET author = excluded.author, site_url = excluded.site_url",
            );

            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        tracing::info!(blogs = blogs.len(), "Synced blogs from OPML");
        Ok(blogs.len())
    }
}

#[async_trait]
impl FeedRegistry for Database {
    async fn list_feeds(&self) -> Result<Vec<FeedEndpoint>, RegistryError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT feed_url FROM blogs ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RegistryError::Storage(e.to_string()))?;

        Ok(rows.into_iter().map(|(url,)| FeedEndpoint::from(url)).collect())
    }
}
