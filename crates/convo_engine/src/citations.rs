use convo_core::CitationEntry;
use ego_tree::NodeRef;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use crate::extract::ExtractionError;
use crate::markdown::{collapse_spaces, is_http};

const TITLE_MAX_CHARS: usize = 160;
const SNIPPET_MAX_CHARS: usize = 400;

/// CSS selectors describing the entries of a reference/search side panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelSelectors {
    pub item: String,
    /// Link inside an item; the first `a[href]` when absent.
    pub link: Option<String>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub max_items: usize,
}

impl Default for PanelSelectors {
    fn default() -> Self {
        Self {
            item: "a[href]".to_string(),
            link: None,
            title: None,
            summary: None,
            max_items: 50,
        }
    }
}

struct CompiledSelectors {
    item: Selector,
    link: Selector,
    title: Option<Selector>,
    summary: Option<Selector>,
}

fn compile(raw: &str) -> Result<Selector, ExtractionError> {
    Selector::parse(raw).map_err(|err| ExtractionError::InvalidSelector {
        selector: raw.to_string(),
        message: err.to_string(),
    })
}

impl PanelSelectors {
    fn compile(&self) -> Result<CompiledSelectors, ExtractionError> {
        Ok(CompiledSelectors {
            item: compile(&self.item)?,
            link: compile(self.link.as_deref().unwrap_or("a[href]"))?,
            title: self.title.as_deref().map(compile).transpose()?,
            summary: self.summary.as_deref().map(compile).transpose()?,
        })
    }

    /// Entries of the panel in DOM order. Items without an http(s) link are skipped.
    pub fn parse(&self, panel_html: &str) -> Result<Vec<CitationEntry>, ExtractionError> {
        let selectors = self.compile()?;
        let fragment = Html::parse_fragment(panel_html);

        let entries = fragment
            .select(&selectors.item)
            .filter_map(|item| parse_item(item, &selectors))
            .take(self.max_items.max(1))
            .collect();
        Ok(entries)
    }
}

fn parse_item(item: ElementRef, selectors: &CompiledSelectors) -> Option<CitationEntry> {
    let raw_href = if item.value().name().eq_ignore_ascii_case("a") {
        item.value().attr("href")
    } else {
        item.select(&selectors.link)
            .find_map(|link| link.value().attr("href"))
    };
    let href = raw_href?.trim();
    if !is_http(href) {
        return None;
    }

    let lines = text_lines(item);
    let dedicated_title = selectors
        .title
        .as_ref()
        .and_then(|sel| first_text(item, sel));
    let title = dedicated_title
        .or_else(|| lines.first().map(|line| truncate_chars(line, TITLE_MAX_CHARS)))
        .unwrap_or_else(|| href.to_string());

    let snippet = selectors
        .summary
        .as_ref()
        .and_then(|sel| first_text(item, sel))
        .unwrap_or_else(|| {
            let rest = lines.get(1..).unwrap_or_default().join(" ");
            truncate_chars(&rest, SNIPPET_MAX_CHARS)
        });

    Some(CitationEntry::new(href, title, snippet))
}

fn first_text(item: ElementRef, selector: &Selector) -> Option<String> {
    item.select(selector)
        .map(|el| collapse_spaces(&el.text().collect::<String>()))
        .find(|text| !text.is_empty())
}

/// Non-empty text lines of an element, one per text node line.
fn text_lines(element: ElementRef) -> Vec<String> {
    let mut lines = Vec::new();
    collect_lines(*element, &mut lines);
    lines
}

fn collect_lines(node: NodeRef<'_, Node>, lines: &mut Vec<String>) {
    for child in node.children() {
        match child.value() {
            Node::Text(text) => lines.extend(
                text.split('\n')
                    .map(collapse_spaces)
                    .filter(|line| !line.is_empty()),
            ),
            Node::Element(el) if matches!(el.name(), "script" | "style") => {}
            _ => collect_lines(child, lines),
        }
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
