use anyhow::Result;
use feed_rs::model::Entry;
use feed_rs::parser;
use sha2::{Digest, Sha256};

use crate::crawl::{FeedEndpoint, RawArticle};
use crate::util::{first_image_src, html_to_text, polish_summary};

/// Parses RSS/Atom bytes into normalized articles for `feed`.
///
/// Summaries are reduced to plain text of at most `summary_width` columns.
pub fn parse_feed(
    feed: &FeedEndpoint,
    bytes: &[u8],
    summary_width: usize,
) -> Result<Vec<RawArticle>> {
    let parsed = parser::parse(bytes)?;

    let articles = parsed
        .entries
        .into_iter()
        .map(|entry| normalize_entry(feed, entry, summary_width))
        .collect();

    Ok(articles)
}

fn normalize_entry(feed: &FeedEndpoint, entry: Entry, summary_width: usize) -> RawArticle {
    let url = entry.links.first().map(|l| l.href.clone());
    let published = entry.published.or(entry.updated).map(|dt| dt.timestamp());
    let title = entry
        .title
        .as_ref()
        .map(|t| html_to_text(&t.content))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Untitled".to_string());

    let content = entry.content.as_ref().and_then(|c| c.body.clone());
    let summary_source = entry
        .summary
        .as_ref()
        .map(|s| s.content.as_str())
        .or(content.as_deref());
    let summary = summary_source.and_then(|s| polish_summary(s, summary_width));

    let image_url = media_image(&entry).or_else(|| {
        content
            .as_deref()
            .and_then(first_image_src)
            .or_else(|| entry.summary.as_ref().and_then(|s| first_image_src(&s.content)))
    });

    let guid = entry_key(&entry.id, url.as_deref(), &title, published);
    let identity = article_identity(feed, &guid);

    RawArticle {
        identity,
        feed: feed.clone(),
        guid,
        title,
        url,
        published,
        summary,
        content,
        image_url,
    }
}

/// Per-feed key of an entry: its id, else its link, else title and date.
fn entry_key(id: &str, url: Option<&str>, title: &str, published: Option<i64>) -> String {
    let id = id.trim();
    if !id.is_empty() {
        return id.to_string();
    }
    if let Some(url) = url.map(str::trim).filter(|u| !u.is_empty()) {
        return url.to_string();
    }
    format!(
        "{}|{}",
        title,
        published.map(|p| p.to_string()).unwrap_or_default()
    )
}

/// Stable article identity: SHA-256 of the feed URL and the entry key.
///
/// Scoped to the feed so two feeds reusing a guid never collide.
pub fn article_identity(feed: &FeedEndpoint, key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(feed.as_str().as_bytes());
    hasher.update(b"\n");
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn media_image(entry: &Entry) -> Option<String> {
    entry.media.iter().find_map(|media| {
        media
            .thumbnails
            .first()
            .map(|thumb| thumb.image.uri.clone())
            .or_else(|| {
                media.content.iter().find_map(|c| {
                    let is_image = c
                        .content_type
                        .as_ref()
                        .is_some_and(|mime| mime.to_string().starts_with("image/"));
                    if is_image {
                        c.url.as_ref().map(|u| u.to_string())
                    } else {
                        None
                    }
                })
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const FEED: &str = "https://blog.example.com/feed.xml";

    fn endpoint() -> FeedEndpoint {
        FeedEndpoint::from(FEED)
    }

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/">
<channel>
  <title>Example Blog</title>
  <item>
    <guid>post-1</guid>
    <title>First &amp; foremost</title>
    <link>https://blog.example.com/posts/1</link>
    <pubDate>Tue, 14 Nov 2023 22:13:20 GMT</pubDate>
    <description><![CDATA[<p>Hello <b>readers</b>!</p><img src="https://blog.example.com/hero.png">]]></description>
  </item>
  <item>
    <title>No guid here</title>
    <link>https://blog.example.com/posts/2</link>
    <enclosure url="https://cdn.example.com/cover.jpg" type="image/jpeg" length="100"/>
  </item>
</channel>
</rss>"#;

    #[test]
    fn test_parse_rss_items() {
        let articles = parse_feed(&endpoint(), RSS.as_bytes(), 280).unwrap();
        assert_eq!(articles.len(), 2);

        let first = &articles[0];
        assert_eq!(first.guid, "post-1");
        assert_eq!(first.title, "First & foremost");
        assert_eq!(first.url.as_deref(), Some("https://blog.example.com/posts/1"));
        assert_eq!(first.published, Some(1_700_000_000));
        assert_eq!(first.summary.as_deref(), Some("Hello readers!"));
        assert_eq!(
            first.image_url.as_deref(),
            Some("https://blog.example.com/hero.png")
        );
        assert_eq!(first.feed, endpoint());
        assert_eq!(first.identity, article_identity(&endpoint(), "post-1"));
    }

    #[test]
    fn test_enclosure_image() {
        let articles = parse_feed(&endpoint(), RSS.as_bytes(), 280).unwrap();
        let second = &articles[1];

        assert!(!second.guid.is_empty());
        assert_ne!(second.identity, articles[0].identity);
        assert_eq!(
            second.image_url.as_deref(),
            Some("https://cdn.example.com/cover.jpg")
        );
        assert_eq!(second.summary, None);
    }

    #[test]
    fn test_audio_enclosure_is_not_an_image() {
        let rss = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Podcast</title>
  <item>
    <guid>ep-1</guid>
    <title>Episode one</title>
    <enclosure url="https://cdn.example.com/ep1.mp3" type="audio/mpeg" length="100"/>
  </item>
</channel></rss>"#;

        let articles = parse_feed(&endpoint(), rss.as_bytes(), 280).unwrap();
        assert_eq!(articles[0].image_url, None);
    }

    #[test]
    fn test_atom_entry_uses_content_for_summary() {
        let atom = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Blog</title>
  <id>urn:uuid:feed</id>
  <updated>2023-11-14T22:13:20Z</updated>
  <entry>
    <id>urn:uuid:entry-1</id>
    <title>Atom entry</title>
    <updated>2023-11-14T22:13:20Z</updated>
    <content type="html">&lt;p&gt;Body text that is fairly long&lt;/p&gt;</content>
  </entry>
</feed>"#;

        let articles = parse_feed(&endpoint(), atom.as_bytes(), 12).unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].guid, "urn:uuid:entry-1");
        assert_eq!(articles[0].published, Some(1_700_000_000));
        assert_eq!(articles[0].summary.as_deref(), Some("Body text t…"));
        assert!(articles[0].content.is_some());
    }

    #[test]
    fn test_identity_is_stable_and_feed_scoped() {
        let a = parse_feed(&endpoint(), RSS.as_bytes(), 280).unwrap();
        let b = parse_feed(&endpoint(), RSS.as_bytes(), 280).unwrap();
        assert_eq!(a[0].identity, b[0].identity);

        let other = FeedEndpoint::from("https://mirror.example.net/feed.xml");
        let c = parse_feed(&other, RSS.as_bytes(), 280).unwrap();
        assert_ne!(a[0].identity, c[0].identity);
        assert_eq!(a[0].identity.len(), 64);
    }

    #[test]
    fn test_entry_key_fallbacks() {
        assert_eq!(entry_key(" id ", Some("https://x"), "T", None), "id");
        assert_eq!(entry_key("", Some("https://x"), "T", None), "https://x");
        assert_eq!(entry_key("", None, "T", Some(5)), "T|5");
    }

    #[test]
    fn test_empty_channel() {
        let rss = r#"<?xml version="1.0"?><rss version="2.0"><channel></channel></rss>"#;
        assert!(parse_feed(&endpoint(), rss.as_bytes(), 280).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_feed_is_error() {
        assert!(parse_feed(&endpoint(), b"<not valid xml", 280).is_err());
    }
}
