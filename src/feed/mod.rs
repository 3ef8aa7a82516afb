//! Fetch/parse side of the crawler.
//!
//! - [`parser`] - feed-rs based normalization into [`RawArticle`](crate::crawl::RawArticle)s
//! - [`fetcher`] - [`HttpFeedSource`], the HTTP implementation of
//!   [`FeedSource`](crate::crawl::FeedSource)
//! - [`opml`] - OPML subscription import for populating the blog registry

mod fetcher;
mod opml;
mod parser;

pub use fetcher::HttpFeedSource;
pub use opml::{parse, parse_opml_content, OpmlBlog, OpmlError};
pub use parser::{article_identity, parse_feed};
