use convo_core::{dedupe_citations, CitationEntry};
use thiserror::Error;

use crate::citations::PanelSelectors;
use crate::markdown::{MarkdownConverter, MarkdownRules};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("reference panel contract violated: {message}")]
    ContractViolation { message: String },
    #[error("invalid selector `{selector}`: {message}")]
    InvalidSelector { selector: String, message: String },
}

/// Raw HTML of a reference panel captured after the answer finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidePanel {
    html: String,
    from_affordance: bool,
}

impl SidePanel {
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            from_affordance: false,
        }
    }

    /// A panel announced by a reference button in the answer; it must yield entries.
    pub fn from_reference_affordance(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            from_affordance: true,
        }
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn is_from_reference_affordance(&self) -> bool {
        self.from_affordance
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub markdown: String,
    pub citations: Vec<CitationEntry>,
}

/// Fragment + panel -> canonical markdown and citation list.
pub struct ExtractionPipeline<'p> {
    rules: &'p MarkdownRules,
    panel: &'p PanelSelectors,
}

impl<'p> ExtractionPipeline<'p> {
    pub fn new(rules: &'p MarkdownRules, panel: &'p PanelSelectors) -> Self {
        Self { rules, panel }
    }

    pub fn extract(
        &self,
        fragment_html: &str,
        side_panel: Option<&SidePanel>,
    ) -> Result<Extraction, ExtractionError> {
        let converted = MarkdownConverter::new(self.rules).convert(fragment_html);

        let panel_entries = match side_panel {
            Some(panel) => {
                let entries = self.panel.parse(panel.html())?;
                if entries.is_empty() && panel.is_from_reference_affordance() {
                    return Err(ExtractionError::ContractViolation {
                        message: "reference button present but no references were parsed"
                            .to_string(),
                    });
                }
                entries
            }
            None => Vec::new(),
        };

        let citations = dedupe_citations(panel_entries.into_iter().chain(converted.inline_links));
        Ok(Extraction {
            markdown: converted.markdown,
            citations,
        })
    }
}
