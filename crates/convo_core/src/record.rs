use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationEntry {
    pub href: String,
    pub title: String,
    pub snippet: String,
}

impl CitationEntry {
    pub fn new(href: impl Into<String>, title: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            title: title.into(),
            snippet: snippet.into(),
        }
    }
}

/// Keeps the first entry for every href, in discovery order.
pub fn dedupe_citations(entries: impl IntoIterator<Item = CitationEntry>) -> Vec<CitationEntry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|entry| seen.insert(entry.href.clone()))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    #[default]
    Ok,
    Empty,
    Error,
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordStatus::Ok => write!(f, "ok"),
            RecordStatus::Empty => write!(f, "empty"),
            RecordStatus::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Language {
    #[serde(rename = "zh")]
    Chinese,
    #[default]
    #[serde(rename = "en")]
    English,
}

/// Any CJK unified ideograph marks the text as Chinese.
pub fn detect_language(text: &str) -> Language {
    if text.chars().any(|c| ('\u{4e00}'..='\u{9fff}').contains(&c)) {
        Language::Chinese
    } else {
        Language::English
    }
}

/// One prompt attempt, as persisted in the job ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub task_id: String,
    #[serde(default)]
    pub site: String,
    #[serde(default)]
    pub conversation_id: String,
    #[serde(default)]
    pub source_url: String,
    pub prompt_text: String,
    #[serde(default)]
    pub response_text: String,
    #[serde(default)]
    pub citations: Vec<CitationEntry>,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub latency_ms: u64,
    #[serde(default)]
    pub status: RecordStatus,
    #[serde(default)]
    pub error_message: String,
    /// The answer was captured when the detection deadline expired.
    #[serde(default)]
    pub truncated: bool,
    #[serde(default)]
    pub recorded_utc: String,
}

impl ResponseRecord {
    /// A record for an attempt that failed before any answer was captured.
    pub fn failed(
        task_id: impl Into<String>,
        site: impl Into<String>,
        prompt_text: impl Into<String>,
        source_url: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let source_url = source_url.into();
        Self {
            task_id: task_id.into(),
            site: site.into(),
            conversation_id: conversation_id_from_url(&source_url),
            source_url,
            prompt_text: prompt_text.into(),
            response_text: String::new(),
            citations: Vec::new(),
            language: Language::English,
            latency_ms: 0,
            status: RecordStatus::Error,
            error_message: message.into(),
            truncated: false,
            recorded_utc: String::new(),
        }
    }

    /// Ledger key for the prompt.
    pub fn prompt_key(&self) -> &str {
        self.prompt_text.trim()
    }
}

/// Picks the conversation id out of a chat URL such as `https://chat.example/a/chat/s/<id>`:
/// the last path segment longer than ten characters, else the last segment.
pub fn conversation_id_from_url(raw: &str) -> String {
    let Ok(url) = Url::parse(raw) else {
        return String::new();
    };
    let segments: Vec<&str> = url
        .path_segments()
        .map(|parts| parts.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();
    segments
        .iter()
        .rev()
        .find(|part| part.len() > 10)
        .or_else(|| segments.last())
        .map(|part| part.to_string())
        .unwrap_or_default()
}
