use std::time::Duration;

use convo_core::DetectorSettings;
use serde::{Deserialize, Serialize};

use crate::citations::PanelSelectors;
use crate::markdown::MarkdownRules;
use crate::surface::Locator;

/// Per-site timings layered over the run-wide detector settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteTimings {
    pub start_poll_interval: Duration,
    pub stream_poll_interval: Duration,
    pub stall_grace: Duration,
    pub login_timeout: Duration,
    pub login_poll_interval: Duration,
    /// Pause after starting a conversation before the input is looked up.
    pub settle_after_new_conversation: Duration,
    pub panel_open_wait: Duration,
    pub panel_item_poll_attempts: u32,
    pub panel_item_poll_interval: Duration,
}

impl Default for SiteTimings {
    fn default() -> Self {
        Self {
            start_poll_interval: Duration::from_millis(200),
            stream_poll_interval: Duration::from_millis(300),
            stall_grace: Duration::from_secs(10),
            login_timeout: Duration::from_secs(300),
            login_poll_interval: Duration::from_secs(2),
            settle_after_new_conversation: Duration::from_secs(1),
            panel_open_wait: Duration::from_millis(500),
            panel_item_poll_attempts: 10,
            panel_item_poll_interval: Duration::from_millis(200),
        }
    }
}

/// Hover pass that makes a site turn its inline citation tags into real links before the
/// answer HTML is read. An empty selector disables it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CitationReveal {
    pub selector: String,
    pub rounds: u32,
    /// Wait after each round for the site to rewrite the tags.
    pub settle: Duration,
}

impl Default for CitationReveal {
    fn default() -> Self {
        Self {
            selector: String::new(),
            rounds: 2,
            settle: Duration::from_millis(600),
        }
    }
}

impl CitationReveal {
    pub fn is_enabled(&self) -> bool {
        !self.selector.trim().is_empty() && self.rounds > 0
    }
}

/// Everything selector- or timing-specific about one chat site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SiteProfile {
    pub name: String,
    pub home_url: String,
    /// Its visibility also signals an authenticated session.
    pub chat_input: Vec<Locator>,
    /// Empty means "press Enter in the input".
    pub send_button: Vec<Locator>,
    /// Empty means "navigate to `home_url`".
    pub new_conversation: Vec<Locator>,
    /// The last visible match is the answer being generated.
    pub assistant_message: Vec<Locator>,
    /// Optional narrower content node inside the assistant message.
    pub answer_content: Vec<Locator>,
    pub busy_indicator: Vec<Locator>,
    /// Present while the input cannot accept a new prompt.
    pub input_blocked: Vec<Locator>,
    /// Clickable affordance announcing a reference/search panel for the answer.
    pub reference_button: Vec<Locator>,
    pub reference_panel: Vec<Locator>,
    pub panel: PanelSelectors,
    pub markdown: MarkdownRules,
    pub citation_reveal: CitationReveal,
    pub timings: SiteTimings,
}

impl SiteProfile {
    /// Detector settings for this site: run-wide deadline and thresholds, site polling and stall.
    pub fn detector_settings(&self, base: &DetectorSettings) -> DetectorSettings {
        DetectorSettings {
            start_poll_interval: self.timings.start_poll_interval,
            stream_poll_interval: self.timings.stream_poll_interval,
            stall_grace: self.timings.stall_grace,
            ..base.clone()
        }
    }

    pub fn builtin(name: &str) -> Option<SiteProfile> {
        builtin_profiles()
            .into_iter()
            .find(|profile| profile.name.eq_ignore_ascii_case(name))
    }
}

pub fn builtin_profiles() -> Vec<SiteProfile> {
    vec![deepseek(), doubao(), kimi()]
}

fn css(list: &[&str]) -> Vec<Locator> {
    list.iter().map(|selector| Locator::css(*selector)).collect()
}

fn deepseek() -> SiteProfile {
    SiteProfile {
        name: "deepseek".to_string(),
        home_url: "https://chat.deepseek.com/".to_string(),
        chat_input: css(&[
            "textarea[placeholder*='DeepSeek']",
            "textarea[placeholder*='消息']",
            "textarea.ds-scroll-area",
            "textarea",
        ]),
        send_button: css(&[
            "button.f79352dc",
            "div[role='button'][aria-disabled='false']:has(svg)",
        ]),
        new_conversation: vec![
            Locator::with_text("div._5a8ac7a", "开启新对话"),
            Locator::with_text("button", "开启新对话"),
        ],
        assistant_message: css(&["div.ds-message._63c77b1", "div.ds-message"]),
        answer_content: css(&["div.ds-markdown"]),
        busy_indicator: css(&["button[aria-label*='停止']", "div[role='button'] svg[name='stop']"]),
        input_blocked: Vec::new(),
        reference_button: vec![Locator::with_text("div._74c0879", "已阅读")],
        reference_panel: css(&["div.dc433409", "div._519be07"]),
        panel: PanelSelectors {
            item: "a._24fe229, a[href]".to_string(),
            link: None,
            title: Some(".search-view-card__title".to_string()),
            summary: Some(".search-view-card__snippet".to_string()),
            max_items: 20,
        },
        markdown: MarkdownRules {
            link_fallback_label: "link".to_string(),
            strip_index_dash: true,
            ..MarkdownRules::default()
        },
        citation_reveal: CitationReveal::default(),
        timings: SiteTimings {
            start_poll_interval: Duration::from_millis(250),
            stream_poll_interval: Duration::from_millis(400),
            stall_grace: Duration::from_secs(10),
            ..SiteTimings::default()
        },
    }
}

fn doubao() -> SiteProfile {
    SiteProfile {
        name: "doubao".to_string(),
        home_url: "https://www.doubao.com/chat/".to_string(),
        chat_input: css(&[
            "textarea[data-testid='chat_input_input']",
            "textarea[placeholder*='发送']",
            "textarea",
        ]),
        send_button: css(&["button#flow-end-msg-send[aria-disabled='false']"]),
        new_conversation: Vec::new(),
        assistant_message: css(&[
            "div[data-testid='receive_message']",
            "div[data-role='assistant']",
        ]),
        answer_content: css(&["div[data-testid='message_text_content']"]),
        busy_indicator: css(&["div[data-testid='chat_input_local_break_button']:not(.hidden)"]),
        input_blocked: Vec::new(),
        reference_button: css(&["div[data-testid='search-reference-ui']"]),
        reference_panel: css(&[
            "aside[data-testid='samantha_layout_right_side'] div.scroll-H09izL",
            "div[data-testid='canvas_panel_container'] div.scroll-H09izL",
        ]),
        panel: PanelSelectors {
            item: "div[data-testid='search-text-item']".to_string(),
            link: Some("a[href^='http'], a[href]".to_string()),
            title: Some("div[class*='search-item-title']".to_string()),
            summary: Some("div[class*='search-item-summary']".to_string()),
            max_items: 50,
        },
        markdown: MarkdownRules {
            inline_marker_classes: vec!["container-bhqnGO".to_string()],
            link_fallback_label: "source".to_string(),
            marker_fallback_label: "source".to_string(),
            ..MarkdownRules::default()
        },
        citation_reveal: CitationReveal::default(),
        timings: SiteTimings {
            start_poll_interval: Duration::from_millis(150),
            stream_poll_interval: Duration::from_millis(250),
            stall_grace: Duration::from_secs(6),
            ..SiteTimings::default()
        },
    }
}

fn kimi() -> SiteProfile {
    SiteProfile {
        name: "kimi".to_string(),
        home_url: "https://kimi.moonshot.cn/chat".to_string(),
        chat_input: css(&[
            "div.chat-content-container div[role='textbox']",
            "div[role='textbox']",
            "div[contenteditable='true']",
            "textarea",
        ]),
        send_button: css(&["div.send-button-container:not(.disabled) div.send-button"]),
        new_conversation: css(&[
            "div.action-label:has(svg[name='AddConversation'])",
            "svg[name='AddConversation']",
        ]),
        assistant_message: css(&[
            "div.chat-content-item.chat-content-item-assistant",
            "div[data-role='assistant']",
            "[data-testid='assistant-message']",
        ]),
        answer_content: css(&["div.markdown"]),
        busy_indicator: css(&["div.send-button svg[name='stop']"]),
        input_blocked: Vec::new(),
        reference_button: css(&["div.segment-content-box div.container-block > div > div"]),
        reference_panel: css(&["div.side-console-container.normal"]),
        panel: PanelSelectors {
            item: "div.side-console .sites a.site".to_string(),
            link: None,
            title: Some("p.title".to_string()),
            summary: Some("p.snippet".to_string()),
            max_items: 50,
        },
        markdown: MarkdownRules {
            inline_marker_classes: vec!["rag-tag".to_string()],
            site_name_attribute: "data-site-name".to_string(),
            link_fallback_label: "source".to_string(),
            marker_fallback_label: "source".to_string(),
            ..MarkdownRules::default()
        },
        citation_reveal: CitationReveal {
            selector: ".rag-tag".to_string(),
            ..CitationReveal::default()
        },
        timings: SiteTimings::default(),
    }
}
