use convo_core::CitationEntry;
use ego_tree::NodeRef;
use scraper::node::Node;
use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};

/// Site-specific knobs for the HTML to markdown conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkdownRules {
    /// Elements carrying any of these classes render as `[name]` with no link.
    pub inline_marker_classes: Vec<String>,
    /// Attribute that names the cited site, preferred over inner text.
    pub site_name_attribute: String,
    pub link_fallback_label: String,
    pub marker_fallback_label: String,
    /// Render link labels such as `-6` as `6`.
    pub strip_index_dash: bool,
}

impl Default for MarkdownRules {
    fn default() -> Self {
        Self {
            inline_marker_classes: Vec::new(),
            site_name_attribute: "data-site-name".to_string(),
            link_fallback_label: "link".to_string(),
            marker_fallback_label: "source".to_string(),
            strip_index_dash: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownOutput {
    pub markdown: String,
    /// http(s) anchors found in the fragment, in document order.
    pub inline_links: Vec<CitationEntry>,
}

pub struct MarkdownConverter<'r> {
    rules: &'r MarkdownRules,
}

impl<'r> MarkdownConverter<'r> {
    pub fn new(rules: &'r MarkdownRules) -> Self {
        Self { rules }
    }

    pub fn convert(&self, html: &str) -> MarkdownOutput {
        let fragment = Html::parse_fragment(html);
        let mut ctx = ConversionContext::default();

        for child in fragment.root_element().children() {
            self.visit_node(child, &mut ctx);
        }

        MarkdownOutput {
            markdown: normalize_whitespace(&ctx.out),
            inline_links: ctx.links,
        }
    }

    fn visit_node(&self, node: NodeRef<'_, Node>, ctx: &mut ConversionContext) {
        match node.value() {
            Node::Text(text) => ctx.push_text(text),
            Node::Element(_) => {
                if let Some(element) = ElementRef::wrap(node) {
                    self.visit_element(element, ctx);
                }
            }
            _ => {
                for child in node.children() {
                    self.visit_node(child, ctx);
                }
            }
        }
    }

    fn visit_element(&self, element: ElementRef, ctx: &mut ConversionContext) {
        let tag = element.value().name().to_ascii_lowercase();
        if tag == "a" {
            self.handle_anchor(element, ctx);
            return;
        }
        if self.is_inline_marker(element) {
            self.handle_marker(element, ctx);
            return;
        }
        match tag.as_str() {
            "script" | "style" | "noscript" | "template" => {}
            "br" => ctx.out.push('\n'),
            "p" | "div" => {
                self.visit_children(element, ctx);
                ctx.out.push_str("\n\n");
            }
            "li" => {
                ctx.out.push_str("\n- ");
                self.visit_children(element, ctx);
            }
            "ul" | "ol" => {
                ctx.out.push('\n');
                self.visit_children(element, ctx);
                ctx.out.push('\n');
            }
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = tag[1..].parse::<usize>().unwrap_or(1);
                ctx.out.push_str(&"#".repeat(level));
                ctx.out.push(' ');
                self.visit_children(element, ctx);
                ctx.out.push_str("\n\n");
            }
            _ => self.visit_children(element, ctx),
        }
    }

    fn visit_children(&self, element: ElementRef, ctx: &mut ConversionContext) {
        for child in element.children() {
            self.visit_node(child, ctx);
        }
    }

    fn is_inline_marker(&self, element: ElementRef) -> bool {
        !self.rules.inline_marker_classes.is_empty()
            && element
                .value()
                .classes()
                .any(|class| self.rules.inline_marker_classes.iter().any(|m| m == class))
    }

    fn site_name(&self, element: ElementRef) -> Option<String> {
        element
            .value()
            .attr(&self.rules.site_name_attribute)
            .map(collapse_spaces)
            .filter(|name| !name.is_empty())
    }

    fn handle_marker(&self, element: ElementRef, ctx: &mut ConversionContext) {
        let name = self
            .site_name(element)
            .or_else(|| Some(collapse_spaces(&element.text().collect::<String>())))
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.rules.marker_fallback_label.clone());
        ctx.out.push('[');
        ctx.out.push_str(&name);
        ctx.out.push(']');
    }

    fn handle_anchor(&self, element: ElementRef, ctx: &mut ConversionContext) {
        let start = ctx.out.len();
        self.visit_children(element, ctx);
        let inner = ctx.out.split_off(start);

        let href = element.value().attr("href").map(str::trim).unwrap_or_default();
        if href.is_empty() {
            ctx.out.push_str(&inner);
            return;
        }

        let mut display = self
            .site_name(element)
            .unwrap_or_else(|| collapse_spaces(&inner));
        if self.rules.strip_index_dash {
            display = strip_index_dash(&display);
        }
        if display.is_empty() {
            display = self.rules.link_fallback_label.clone();
        }

        if is_http(href) {
            ctx.links.push(CitationEntry::new(href, display.clone(), ""));
        }
        ctx.out.push('[');
        ctx.out.push_str(&display);
        ctx.out.push_str("](");
        ctx.out.push_str(href);
        ctx.out.push(')');
    }
}

pub(crate) fn is_http(href: &str) -> bool {
    let lower = href.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

#[derive(Default)]
struct ConversionContext {
    out: String,
    links: Vec<CitationEntry>,
}

impl ConversionContext {
    fn push_text(&mut self, text: &str) {
        self.out
            .extend(text.chars().map(|ch| if ch == '\u{a0}' { ' ' } else { ch }));
    }
}

pub(crate) fn collapse_spaces(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `-6` and `- 6` become `6`.
fn strip_index_dash(display: &str) -> String {
    if let Some(rest) = display.strip_prefix('-') {
        let digits = rest.trim_start();
        if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
            return digits.to_string();
        }
    }
    display.to_string()
}

/// Space runs become one space, lines lose edge spaces, 3+ newlines become 2.
fn normalize_whitespace(raw: &str) -> String {
    let mut collapsed = String::with_capacity(raw.len());
    for line in raw.split('\n') {
        let mut last_space = false;
        let mut buf = String::with_capacity(line.len());
        for ch in line.chars() {
            if ch == ' ' || ch == '\t' || ch == '\r' {
                if !last_space {
                    buf.push(' ');
                }
                last_space = true;
            } else {
                buf.push(ch);
                last_space = false;
            }
        }
        collapsed.push_str(buf.trim_matches(' '));
        collapsed.push('\n');
    }

    let mut out = String::with_capacity(collapsed.len());
    let mut newlines = 0;
    for ch in collapsed.chars() {
        if ch == '\n' {
            newlines += 1;
            if newlines <= 2 {
                out.push(ch);
            }
        } else {
            newlines = 0;
            out.push(ch);
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_is_normalized() {
        assert_eq!(normalize_whitespace("  a   b \n\n\n\n c  "), "a b\n\nc");
    }

    #[test]
    fn index_dash_only_strips_numbers() {
        assert_eq!(strip_index_dash("-6"), "6");
        assert_eq!(strip_index_dash("- 12"), "12");
        assert_eq!(strip_index_dash("-abc"), "-abc");
    }
}
