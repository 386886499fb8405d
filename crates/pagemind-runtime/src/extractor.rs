//! Readable text extraction from page HTML.
//!
//! Candidate containers are tried in priority order and the first one with
//! enough text wins. Text inside `<script>`, `<style>` and `<noscript>` never
//! counts.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};

/// Containers tried for the main content, most specific first
pub const CONTENT_SELECTORS: &[&str] = &[
    "main",
    "article",
    "[role=\"main\"]",
    ".content",
    ".main-content",
    "#content",
    "#main",
    "body",
];

/// A candidate must have more than this many characters to be chosen
pub const MIN_CONTENT_CHARS: usize = 100;

/// Extracted content is cut to this many characters
pub const MAX_CONTENT_CHARS: usize = 2000;

const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript"];

/// Elements whose boundaries separate words
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "details", "div", "dl", "dt",
    "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6",
    "header", "hr", "li", "main", "nav", "ol", "p", "pre", "section", "summary", "table", "td",
    "th", "tr", "ul",
];

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// The page's current text selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub text: String,
    pub has_selection: bool,
}

impl Selection {
    pub fn from_raw(raw: &str) -> Self {
        let text = raw.trim().to_string();
        let has_selection = !text.is_empty();
        Self {
            text,
            has_selection,
        }
    }
}

/// Main readable text of an HTML document
pub fn extract_main_content(html: &str) -> String {
    let document = Html::parse_document(html);

    for selector_str in CONTENT_SELECTORS {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };
        if let Some(element) = document.select(&selector).next() {
            let text = visible_text(element);
            if text.chars().count() > MIN_CONTENT_CHARS {
                tracing::trace!("Content found under {}", selector_str);
                return truncate(text);
            }
        }
    }

    // Nothing long enough: take the whole body, however short.
    let body = Selector::parse("body")
        .ok()
        .and_then(|s| document.select(&s).next())
        .map(visible_text)
        .unwrap_or_default();
    truncate(body)
}

/// Whitespace-normalized text of an element, skipping script-like subtrees.
///
/// Text nodes are joined as written, so inline markup inside a word leaves
/// the word intact. A space goes in only where a block element starts or ends.
fn visible_text(element: ElementRef<'_>) -> String {
    let mut raw = String::new();
    for node in element.descendants() {
        if node.prev_sibling().is_some_and(|prev| is_block(prev.value())) {
            raw.push(' ');
        }
        match node.value() {
            Node::Text(text) => {
                let hidden = node.ancestors().any(|ancestor| {
                    ancestor
                        .value()
                        .as_element()
                        .is_some_and(|el| SKIPPED_TAGS.contains(&el.name()))
                });
                if !hidden {
                    raw.push_str(text);
                }
            }
            value if is_block(value) => raw.push(' '),
            _ => {}
        }
    }
    normalize_whitespace(&raw)
}

fn is_block(node: &Node) -> bool {
    node.as_element()
        .is_some_and(|el| BLOCK_TAGS.contains(&el.name()))
}

/// Collapse whitespace runs to single spaces and trim
pub fn normalize_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

fn truncate(text: String) -> String {
    match text.char_indices().nth(MAX_CONTENT_CHARS) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text,
    }
}
