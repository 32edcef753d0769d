use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use convo_core::{RecordStatus, ResponseRecord};

use crate::ledger::LedgerError;

/// Human-readable companion of the ledger, one section per record.
#[derive(Debug, Clone)]
pub struct Transcript {
    path: PathBuf,
}

impl Transcript {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, records: &[ResponseRecord]) -> Result<(), LedgerError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut content = String::new();
        for record in records {
            render_section(record, &mut content);
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| LedgerError::Io {
                path: self.path.clone(),
                source,
            })?;
        file.write_all(content.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|source| LedgerError::Io {
                path: self.path.clone(),
                source,
            })
    }
}

pub fn render_section(record: &ResponseRecord, out: &mut String) {
    let conversation = if record.conversation_id.is_empty() {
        "unknown"
    } else {
        record.conversation_id.as_str()
    };
    let language = match record.language {
        convo_core::Language::Chinese => "zh",
        convo_core::Language::English => "en",
    };

    let _ = writeln!(out, "# Conversation {conversation}\n");
    let _ = writeln!(out, "- **Website**: {}", record.site);
    let _ = writeln!(out, "- **URL**: {}", record.source_url);
    let _ = writeln!(out, "- **Language**: {language}");
    let _ = writeln!(out, "- **Latency**: {} ms", record.latency_ms);
    let _ = writeln!(out, "- **Status**: {}", record.status);
    if record.truncated {
        let _ = writeln!(out, "- **Truncated**: true");
    }
    if !record.recorded_utc.is_empty() {
        let _ = writeln!(out, "- **Recorded**: {}", record.recorded_utc);
    }
    if record.status == RecordStatus::Error && !record.error_message.is_empty() {
        let _ = writeln!(out, "- **Error**: {}", record.error_message);
    }

    let _ = writeln!(out, "\n## Prompt\n\n{}\n", record.prompt_text.trim());
    let _ = writeln!(out, "## Response\n\n{}\n", record.response_text.trim());

    if !record.citations.is_empty() {
        out.push_str("## Sources\n\n");
        for (idx, citation) in record.citations.iter().enumerate() {
            let _ = writeln!(out, "### {}. {}\n", idx + 1, citation.title);
            let _ = writeln!(out, "- **URL**: {}", citation.href);
            if !citation.snippet.is_empty() {
                let _ = writeln!(out, "- **Snippet**: {}", citation.snippet);
            }
            out.push('\n');
        }
    }
    out.push_str("---\n\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use convo_core::CitationEntry;

    #[test]
    fn section_lists_sources_in_order() {
        let mut record = ResponseRecord::failed("t", "kimi", "Why?", "https://k/chat/abcdefghijkl", "");
        record.status = RecordStatus::Ok;
        record.response_text = "Because.".to_string();
        record.citations = vec![
            CitationEntry::new("https://a", "A", "first"),
            CitationEntry::new("https://b", "B", ""),
        ];
        let mut out = String::new();
        render_section(&record, &mut out);

        assert!(out.starts_with("# Conversation abcdefghijkl\n"));
        let a = out.find("### 1. A").unwrap();
        let b = out.find("### 2. B").unwrap();
        assert!(a < b);
        assert!(out.contains("- **Snippet**: first"));
        assert!(out.ends_with("---\n\n"));
    }
}
