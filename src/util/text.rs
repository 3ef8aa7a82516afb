use std::borrow::Cow;

use scraper::{Html, Node, Selector};
use unicode_width::UnicodeWidthChar;

/// Appended when text is cut short
const ELLIPSIS: &str = "…";
const ELLIPSIS_WIDTH: usize = 1;

/// Tags that separate words when stripped
const BLOCK_TAGS: &[&str] = &[
    "br", "p", "div", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "tr", "td", "th",
    "blockquote", "pre", "figure", "figcaption", "section", "article", "hr", "img",
];

/// Elements whose text is never shown
const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Display width in columns, summed per character.
///
/// CJK and most emoji count as 2 columns, combining marks as 0.
pub fn display_width(s: &str) -> usize {
    s.chars()
        .map(|c| UnicodeWidthChar::width(c).unwrap_or(0))
        .sum()
}

/// Truncates `s` to at most `max_width` display columns, ending in "…" when
/// anything was cut.
///
/// ```
/// use bloghub::util::truncate_to_width;
///
/// assert_eq!(truncate_to_width("Short", 10), "Short");
/// assert_eq!(truncate_to_width("Hello World", 8), "Hello W…");
/// assert_eq!(truncate_to_width("你好世界", 5), "你好…");
/// ```
pub fn truncate_to_width(s: &str, max_width: usize) -> Cow<'_, str> {
    if display_width(s) <= max_width {
        return Cow::Borrowed(s);
    }
    if max_width < ELLIPSIS_WIDTH {
        return Cow::Borrowed("");
    }

    let budget = max_width - ELLIPSIS_WIDTH;
    let mut width = 0;
    let mut cut = 0;
    for (idx, c) in s.char_indices() {
        let w = UnicodeWidthChar::width(c).unwrap_or(0);
        if width + w > budget {
            break;
        }
        width += w;
        cut = idx + c.len_utf8();
    }

    Cow::Owned(format!("{}{}", s[..cut].trim_end(), ELLIPSIS))
}

/// Converts an HTML fragment into a single line of plain text.
///
/// The fragment is parsed as HTML, so entities are decoded and comments never
/// leak into the output. Block-level elements become word breaks and
/// `<script>`/`<style>` bodies are skipped.
pub fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut out = String::with_capacity(html.len());

    // Explicit stack: feed markup can nest arbitrarily deep. `None` marks the
    // end of a block element.
    let mut stack = vec![Some(fragment.tree.root())];
    while let Some(entry) = stack.pop() {
        let Some(node) = entry else {
            out.push(' ');
            continue;
        };
        match node.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(element) => {
                let name = element.name();
                if SKIPPED_TAGS.contains(&name) {
                    continue;
                }
                if BLOCK_TAGS.contains(&name) {
                    out.push(' ');
                    stack.push(None);
                }
                stack.extend(node.children().rev().map(Some));
            }
            Node::Document | Node::Fragment => stack.extend(node.children().rev().map(Some)),
            _ => {}
        }
    }

    collapse_whitespace(&out)
}

/// Plain-text summary for display: HTML stripped and truncated.
///
/// Returns `None` when nothing readable is left.
pub fn polish_summary(html: &str, max_width: usize) -> Option<String> {
    let text = html_to_text(html);
    if text.is_empty() {
        return None;
    }
    Some(truncate_to_width(&text, max_width).into_owned())
}

/// `src` of the first `<img>` in `html` that is not an inline `data:` URI.
pub fn first_image_src(html: &str) -> Option<String> {
    let fragment = Html::parse_fragment(html);
    let selector = Selector::parse("img[src]").ok()?;

    let src = fragment
        .select(&selector)
        .filter_map(|img| img.value().attr("src"))
        .map(str::trim)
        .find(|src| !src.is_empty() && !src.starts_with("data:"))
        .map(str::to_string);
    src
}

fn collapse_whitespace(s: &str) -> String {
    s.split(|c: char| c.is_whitespace() || c.is_control())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
