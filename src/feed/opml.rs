use anyhow::{Context, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

use crate::util::validate_feed_url;

/// SEC-003: Maximum allowed nesting depth for OPML outline elements.
const MAX_OPML_DEPTH: usize = 50;

/// Errors that can occur during OPML parsing.
#[derive(Debug, Error)]
pub enum OpmlError {
    /// SEC-003: OPML nesting depth exceeds safety limit.
    #[error("OPML nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),

    /// XML parsing failed.
    #[error("XML parse error: {0}")]
    XmlParse(String),
}

/// A blog subscription extracted from an `<outline xmlUrl=...>` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpmlBlog {
    /// Sourced from `title`, falling back to `text`, then to the feed host.
    pub author: String,
    /// Validated, normalized feed URL.
    pub feed_url: String,
    /// `htmlUrl`, kept only when it validates.
    pub site_url: Option<String>,
}

/// Reads an OPML subscription list from disk.
///
/// Outlines with invalid feed URLs (localhost, private IPs, non-HTTP schemes)
/// are skipped with a warning.
///
/// # Security
///
/// quick-xml (0.37) never expands custom `<!ENTITY>` declarations, so XXE is
/// not possible; nesting depth is capped at 50.
pub async fn parse(path: &str) -> Result<Vec<OpmlBlog>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read OPML file: {}", path))?;
    parse_opml_content(&content)
}

/// Parses OPML from a string. Category outlines are traversed, not returned.
pub fn parse_opml_content(content: &str) -> Result<Vec<OpmlBlog>> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut blogs = Vec::new();
    let mut depth: usize = 0;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"outline" => {
                depth += 1;
                if depth > MAX_OPML_DEPTH {
                    return Err(OpmlError::MaxDepthExceeded(MAX_OPML_DEPTH).into());
                }
                blogs.extend(outline_blog(&e, &reader)?);
            }
            Ok(Event::Empty(e)) if e.name().as_ref() == b"outline" => {
                blogs.extend(outline_blog(&e, &reader)?);
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"outline" => {
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(OpmlError::XmlParse(e.to_string()).into()),
            _ => {}
        }
    }

    Ok(blogs)
}

fn outline_blog(e: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Result<Option<OpmlBlog>> {
    let mut feed_url = None;
    let mut site_url = None;
    let mut title = None;
    let mut text = None;

    for attr in e.attributes() {
        let attr = match attr {
            Ok(attr) => attr,
            Err(err) => {
                tracing::warn!(error = %err, "Skipping malformed OPML attribute");
                continue;
            }
        };
        let value = attr
            .decode_and_unescape_value(reader.decoder())
            .map_err(|err| OpmlError::XmlParse(err.to_string()))?
            .trim()
            .to_string();
        match attr.key.as_ref() {
            b"xmlUrl" => feed_url = Some(value),
            b"htmlUrl" => site_url = Some(value),
            b"title" => title = Some(value),
            b"text" => text = Some(value),
            _ => {}
        }
    }

    let Some(raw) = feed_url else {
        return Ok(None);
    };
    let feed_url = match validate_feed_url(&raw) {
        Ok(url) => url,
        Err(err) => {
            tracing::warn!(url = %raw, error = %err, "Skipping invalid feed URL");
            return Ok(None);
        }
    };

    let site_url = site_url.and_then(|raw| match validate_feed_url(&raw) {
        Ok(url) => Some(url.to_string()),
        Err(err) => {
            tracing::warn!(url = %raw, error = %err, "Ignoring invalid htmlUrl in OPML");
            None
        }
    });

    let author = title
        .filter(|t| !t.is_empty())
        .or(text.filter(|t| !t.is_empty()))
        .or_else(|| feed_url.host_str().map(str::to_string))
        .unwrap_or_else(|| feed_url.to_string());

    Ok(Some(OpmlBlog {
        author,
        feed_url: feed_url.to_string(),
        site_url,
    }))
}
