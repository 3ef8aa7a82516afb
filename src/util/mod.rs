//! Utility functions for common operations.
//!
//! - **URL validation**: feed URLs are checked before registration so the
//!   crawler never fetches from internal addresses
//! - **Text processing**: HTML-to-text conversion, summary polishing and
//!   width-aware truncation for stored article summaries
//!
//! # Examples
//!
//! ```
//! use bloghub::util::{polish_summary, validate_feed_url};
//!
//! let url = validate_feed_url("https://example.com/feed.xml").unwrap();
//! assert_eq!(url.host_str(), Some("example.com"));
//!
//! let summary = polish_summary("<p>Hello <em>world</em></p>", 80);
//! assert_eq!(summary.as_deref(), Some("Hello world"));
//! ```

mod text;
mod url_validator;

pub use text::{display_width, first_image_src, html_to_text, polish_summary, truncate_to_width};
pub use url_validator::{validate_feed_url, UrlValidationError};
