//! SQLite storage: the blog registry and the article store.
//!
//! [`Database`] implements both crawl collaborators that touch the database,
//! [`FeedRegistry`](crate::crawl::FeedRegistry) over the `blogs` table and
//! [`ArticleStore`](crate::crawl::ArticleStore) over `articles`.

mod articles;
mod blogs;
mod schema;
mod types;

pub use schema::Database;
pub use types::{Blog, DatabaseError, StoredArticle};
