//! Query helpers over rendered markup.
//!
//! Selectors come from site strategies as plain strings. A selector that does
//! not parse is logged and matches nothing.

use scraper::{ElementRef, Html, Selector};
use tracing::warn;

pub struct Document {
    html: Html,
}

impl Document {
    pub fn parse(markup: &str) -> Self {
        Self {
            html: Html::parse_document(markup),
        }
    }

    pub fn select(&self, css: &str) -> Vec<ElementRef<'_>> {
        match selector(css) {
            Some(sel) => self.html.select(&sel).collect(),
            None => Vec::new(),
        }
    }

    pub fn select_first(&self, css: &str) -> Option<ElementRef<'_>> {
        let sel = selector(css)?;
        self.html.select(&sel).next()
    }

    /// Collapsed, trimmed text of the first match; `None` when absent or blank.
    pub fn text_of(&self, css: &str) -> Option<String> {
        self.select_first(css).map(node_text).and_then(non_empty)
    }

    pub fn attr_of(&self, css: &str, name: &str) -> Option<String> {
        self.select_first(css)
            .and_then(|el| el.value().attr(name))
            .map(str::to_string)
            .and_then(non_empty)
    }
}

pub fn selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(sel) => Some(sel),
        Err(e) => {
            warn!("Ignoring unparsable selector '{}': {:?}", css, e);
            None
        }
    }
}

pub fn select_in<'a>(node: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    match selector(css) {
        Some(sel) => node.select(&sel).collect(),
        None => Vec::new(),
    }
}

pub fn first_in<'a>(node: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let sel = selector(css)?;
    node.select(&sel).next()
}

pub fn text_in(node: ElementRef<'_>, css: &str) -> Option<String> {
    first_in(node, css).map(node_text).and_then(non_empty)
}

/// Text content with runs of whitespace collapsed to one space.
pub fn node_text(node: ElementRef<'_>) -> String {
    let joined: String = node.text().collect();
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Non-blank lines of a node's text, each trimmed.
pub fn text_lines(node: ElementRef<'_>) -> Vec<String> {
    let joined: String = node.text().collect();
    joined
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect()
}

pub fn non_empty(text: String) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == text.len() {
        Some(text)
    } else {
        Some(trimmed.to_string())
    }
}

/// Scan repeated label/value blocks and return the value whose label
/// contains `label`.
pub fn labeled_value(
    blocks: &[ElementRef<'_>],
    label_css: &str,
    value_css: &str,
    label: &str,
) -> Option<String> {
    blocks.iter().find_map(|block| {
        let label_text = text_in(*block, label_css)?;
        if label_text.contains(label) {
            text_in(*block, value_css)
        } else {
            None
        }
    })
}

/// `(dt, dd)` text pairs of a definition list, in document order.
pub fn definition_pairs(node: ElementRef<'_>) -> Vec<(String, String)> {
    let terms = select_in(node, "dt");
    let definitions = select_in(node, "dd");
    terms
        .into_iter()
        .zip(definitions)
        .map(|(dt, dd)| (node_text(dt), node_text(dd)))
        .collect()
}
