use async_trait::async_trait;

use super::schema::Database;
use super::types::StoredArticle;
use crate::crawl::{ArticleStore, PersistError, Persisted, RawArticle};

/// Maximum number of articles to return from any single query (OOM protection)
const MAX_ARTICLES: i64 = 2000;

const ARTICLE_COLUMNS: &str = "id, identity, slug, feed_url, guid, title, url, published, \
     summary, content, image_url, created_at, updated_at";

impl Database {
    // ========================================================================
    // Article Persistence
    // ========================================================================

    /// Inserts or refreshes one article inside its own transaction.
    ///
    /// Two-phase: INSERT OR IGNORE creates the row on first sight; otherwise an
    /// UPDATE refreshes the feed-supplied fields and `updated_at` while
    /// `created_at` keeps the first-seen time.
    async fn upsert_article(&self, article: &RawArticle) -> Result<Persisted, PersistError> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO articles
                (identity, slug, feed_url, guid, title, url, published, summary,
                 content, image_url, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(&article.identity)
        .bind(article.slug())
        .bind(article.feed.as_str())
        .bind(&article.guid)
        .bind(&article.title)
        .bind(&article.url)
        .bind(article.published)
        .bind(&article.summary)
        .bind(&article.content)
        .bind(&article.image_url)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?
        .rows_affected();

        let persisted = if inserted > 0 {
            Persisted::Created
        } else {
            let updated = sqlx::query(
                r#"
                UPDATE articles SET
                    title = ?, url = ?, published = ?, summary = ?,
                    content = ?, image_url = ?, updated_at = ?
                WHERE identity = ?
            "#,
            )
            .bind(&article.title)
            .bind(&article.url)
            .bind(article.published)
            .bind(&article.summary)
            .bind(&article.content)
            .bind(&article.image_url)
            .bind(now)
            .bind(&article.identity)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?
            .rows_affected();

            // Ignored insert without a matching identity: another article owns the slug
            if updated == 0 {
                return Err(PersistError::Storage(format!(
                    "slug {} already belongs to a different article",
                    article.slug()
                )));
            }
            Persisted::Updated
        };

        tx.commit().await.map_err(storage_error)?;
        Ok(persisted)
    }

    // ========================================================================
    // Article Queries
    // ========================================================================

    pub async fn get_article_by_slug(&self, slug: &str) -> anyhow::Result<Option<StoredArticle>> {
        let article = sqlx::query_as::<_, StoredArticle>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE slug = ?"
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(article)
    }

    /// Newest articles first, by publish date; undated articles sort last.
    ///
    /// PERF-003: Hard cap at MAX_ARTICLES to prevent unbounded memory allocation.
    pub async fn recent_articles(&self, limit: i64) -> anyhow::Result<Vec<StoredArticle>> {
        let limit = limit.clamp(0, MAX_ARTICLES);
        let articles = sqlx::query_as::<_, StoredArticle>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles \
             ORDER BY published IS NULL, published DESC, id DESC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(articles)
    }

    pub async fn article_count(&self) -> anyhow::Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl ArticleStore for Database {
    async fn create_or_update(&self, article: &RawArticle) -> Result<Persisted, PersistError> {
        self.upsert_article(article).await
    }
}

fn storage_error(err: sqlx::Error) -> PersistError {
    PersistError::Storage(err.to_string())
}
