use std::sync::Arc;
use std::time::Duration;

use convo_core::{
    conversation_id_from_url, detect_language, DetectorSettings, Language, Observation,
    RecordStatus, ResponseRecord, RetryPolicy,
};
use engine_logging::{engine_debug, engine_info, engine_warn};
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};

use crate::detect::{detect_completion, CompletionProbe, DetectionOutcome};
use crate::error::EngineError;
use crate::extract::{ExtractionPipeline, SidePanel};
use crate::retry::{retry_with_backoff, think_time};
use crate::runner::{PromptExecutor, TaskContext};
use crate::session::SessionStore;
use crate::site::SiteProfile;
use crate::surface::{ElementHandle, Key, UiError, UiSurface};

const EMPTY_ANSWER_MESSAGE: &str = "No response text captured";

/// Supplies `recorded_utc` for new records.
pub type Clock = Arc<dyn Fn() -> String + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationSettings {
    pub detector: DetectorSettings,
    /// Attempts at opening a reference panel.
    pub panel_retry: RetryPolicy,
    pub think_time_min: Duration,
    pub think_time_max: Duration,
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self {
            detector: DetectorSettings::default(),
            panel_retry: RetryPolicy::default(),
            think_time_min: Duration::from_millis(800),
            think_time_max: Duration::from_millis(2200),
        }
    }
}

/// Drives one chat site through the surface: login, new conversation, send, wait, extract.
pub struct ChatSession {
    surface: Arc<dyn UiSurface>,
    profile: SiteProfile,
    detector: DetectorSettings,
    settings: ConversationSettings,
    store: Option<SessionStore>,
    clock: Clock,
    restored: bool,
}

impl ChatSession {
    pub fn new(
        surface: Arc<dyn UiSurface>,
        profile: SiteProfile,
        settings: ConversationSettings,
        clock: Clock,
    ) -> Self {
        let detector = profile.detector_settings(&settings.detector);
        Self {
            surface,
            profile,
            detector,
            settings,
            store: None,
            clock,
            restored: false,
        }
    }

    pub fn with_session_store(mut self, store: SessionStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Opens the site and waits for the chat input, restoring a saved session first.
    pub async fn ensure_logged_in(&mut self) -> Result<(), EngineError> {
        let surface = self.surface.as_ref();
        surface.navigate(&self.profile.home_url).await?;

        if !self.restored {
            self.restored = true;
            if let Some(store) = &self.store {
                match store.restore(surface).await {
                    Ok(true) => surface.navigate(&self.profile.home_url).await?,
                    Ok(false) => {}
                    Err(err) => engine_warn!("Saved session not restored: {err}"),
                }
            }
        }

        let timings = &self.profile.timings;
        let deadline = Instant::now() + timings.login_timeout;
        let mut announced = false;
        loop {
            match surface.find_visible(&self.profile.chat_input).await {
                Ok(Some(_)) => break,
                Ok(None) => {}
                Err(err) => engine_debug!("Login probe failed: {err}"),
            }
            if Instant::now() >= deadline {
                engine_warn!(
                    "Chat input for {} never appeared within {:?}",
                    self.profile.name,
                    timings.login_timeout
                );
                return Err(EngineError::SessionUnauthenticated {
                    site: self.profile.name.clone(),
                });
            }
            if !announced {
                engine_warn!(
                    "Waiting up to {:?} for a manual login on {}",
                    timings.login_timeout,
                    self.profile.home_url
                );
                announced = true;
            }
            sleep(timings.login_poll_interval).await;
        }

        engine_info!("Chat UI for {} is ready", self.profile.name);
        if announced {
            self.save_session().await;
        }
        Ok(())
    }

    pub async fn save_session(&self) {
        if let Some(store) = &self.store {
            if let Err(err) = store.save(self.surface.as_ref()).await {
                engine_warn!("Session for {} not saved: {err}", self.profile.name);
            }
        }
    }

    async fn think(&self) {
        think_time(self.settings.think_time_min, self.settings.think_time_max).await;
    }

    async fn start_conversation(&self) -> Result<(), UiError> {
        self.think().await;
        let surface = self.surface.as_ref();
        let button = if self.profile.new_conversation.is_empty() {
            None
        } else {
            surface.find_visible(&self.profile.new_conversation).await?
        };
        match button {
            Some(button) => surface.click(&button).await?,
            None => {
                if !self.profile.new_conversation.is_empty() {
                    engine_warn!("New conversation button not found; reloading home page");
                }
                surface.navigate(&self.profile.home_url).await?;
            }
        }
        sleep(self.profile.timings.settle_after_new_conversation).await;
        Ok(())
    }

    /// Types and submits the prompt; returns the assistant message count before sending.
    async fn send_prompt(&self, prompt: &str) -> Result<usize, UiError> {
        let surface = self.surface.as_ref();
        let input = surface
            .find_visible(&self.profile.chat_input)
            .await?
            .ok_or_else(|| UiError::NotFound("chat input".to_string()))?;
        let prior = assistant_messages(surface, &self.profile).await?.len();

        surface.click(&input).await?;
        if let Err(err) = surface.clear(&input).await {
            engine_debug!("Input not cleared: {err}");
        }
        surface.type_text(&input, prompt).await?;
        self.think().await;

        match surface.find_visible(&self.profile.send_button).await? {
            Some(button) => surface.click(&button).await?,
            None => surface.press_key(&input, Key::Enter).await?,
        }
        engine_debug!("Prompt submitted ({} chars)", prompt.chars().count());
        Ok(prior)
    }

    async fn collect_side_panel(&self, answer: Option<&ElementHandle>) -> Option<SidePanel> {
        if self.profile.reference_button.is_empty() {
            return None;
        }
        let surface = self.surface.as_ref();
        let button = match find_affordance(surface, &self.profile, answer).await {
            Ok(Some(button)) => button,
            Ok(None) => return None,
            Err(err) => {
                engine_debug!("Reference affordance lookup failed: {err}");
                return None;
            }
        };

        engine_debug!("Reference affordance found; opening panel");
        let mut opener = PanelOpener {
            surface,
            profile: &self.profile,
            button,
        };
        let opened = retry_with_backoff(
            &self.settings.panel_retry,
            &mut opener,
            "reference panel",
            |opener, _attempt| Box::pin(opener.open()),
            Option::is_some,
        )
        .await;
        let Some(panel) = opened.value else {
            engine_warn!("Reference panel did not open");
            return Some(SidePanel::from_reference_affordance(String::new()));
        };

        let timings = &self.profile.timings;
        let mut html = String::new();
        for attempt in 1..=timings.panel_item_poll_attempts.max(1) {
            match surface.read_inner_html(&panel).await {
                Ok(current) => {
                    html = current;
                    let populated = self
                        .profile
                        .panel
                        .parse(&html)
                        .map(|entries| !entries.is_empty())
                        .unwrap_or(false);
                    if populated {
                        break;
                    }
                }
                Err(err) => engine_debug!("Panel read {attempt} failed: {err}"),
            }
            sleep(timings.panel_item_poll_interval).await;
        }
        Some(SidePanel::from_reference_affordance(html))
    }

    /// Hovers the answer's inline citation tags so the site rewrites them into links.
    async fn reveal_inline_citations(&self, answer: &ElementHandle) {
        let reveal = &self.profile.citation_reveal;
        if !reveal.is_enabled() {
            return;
        }
        for round in 1..=reveal.rounds {
            match self.surface.hover_all(answer, &reveal.selector).await {
                Ok(0) => {
                    engine_debug!("No inline citation tags to reveal");
                    return;
                }
                Ok(count) => engine_debug!("Reveal round {round}: hovered {count} citation tag(s)"),
                Err(err) => {
                    engine_warn!("Inline citations not revealed: {err}");
                    return;
                }
            }
            sleep(reveal.settle).await;
        }
    }

    async fn answer_fragment(&self, answer: Option<&ElementHandle>, outcome: &DetectionOutcome) -> String {
        if let Some(answer) = answer {
            let surface = self.surface.as_ref();
            let node = content_node(surface, &self.profile, answer).await;
            match surface.read_inner_html(&node).await {
                Ok(html) => return html,
                Err(err) => engine_warn!("Answer HTML unreadable, using plain text: {err}"),
            }
        }
        escape_text(&outcome.text)
    }

    async fn converse(&self, task: &TaskContext, prompt: &str) -> Result<ResponseRecord, EngineError> {
        let started = Instant::now();
        self.start_conversation().await?;
        let prior = self.send_prompt(prompt).await?;

        let mut probe = SurfaceProbe {
            surface: self.surface.as_ref(),
            profile: &self.profile,
            prior,
        };
        let outcome = detect_completion(&mut probe, &self.detector, "").await;

        let surface = self.surface.as_ref();
        let answer = current_answer(surface, &self.profile, prior)
            .await
            .unwrap_or_default();
        if let Some(answer) = &answer {
            self.reveal_inline_citations(answer).await;
        }
        let fragment = self.answer_fragment(answer.as_ref(), &outcome).await;
        let panel = self.collect_side_panel(answer.as_ref()).await;
        let source_url = surface.current_url().await.unwrap_or_default();

        let mut record = ResponseRecord {
            task_id: task.task_id.clone(),
            site: self.profile.name.clone(),
            conversation_id: conversation_id_from_url(&source_url),
            source_url,
            prompt_text: prompt.trim().to_string(),
            response_text: String::new(),
            citations: Vec::new(),
            language: Language::English,
            latency_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            status: RecordStatus::Ok,
            error_message: String::new(),
            truncated: false,
            recorded_utc: (self.clock)(),
        };

        let pipeline = ExtractionPipeline::new(&self.profile.markdown, &self.profile.panel);
        match pipeline.extract(&fragment, panel.as_ref()) {
            Err(err) => {
                record.status = RecordStatus::Error;
                record.error_message = EngineError::from(err).to_string();
                record.response_text = outcome.text.clone();
                record.language = detect_language(&record.response_text);
            }
            Ok(extraction) if extraction.markdown.trim().is_empty() => {
                record.status = RecordStatus::Empty;
                record.error_message = if outcome.timed_out {
                    EngineError::DetectionTimeout(outcome.elapsed).to_string()
                } else {
                    EMPTY_ANSWER_MESSAGE.to_string()
                };
            }
            Ok(extraction) => {
                record.language = detect_language(&extraction.markdown);
                record.response_text = extraction.markdown;
                record.citations = extraction.citations;
                record.truncated = outcome.timed_out;
            }
        }
        engine_info!(
            "Prompt finished: status={} chars={} citations={} latency={}ms",
            record.status,
            record.response_text.chars().count(),
            record.citations.len(),
            record.latency_ms
        );
        Ok(record)
    }
}

#[async_trait::async_trait]
impl PromptExecutor for ChatSession {
    async fn prepare(&mut self, _task: &TaskContext) -> Result<(), EngineError> {
        self.ensure_logged_in().await
    }

    async fn execute(&mut self, task: &TaskContext, prompt: &str) -> Result<ResponseRecord, EngineError> {
        self.converse(task, prompt).await
    }

    async fn finish(&mut self, _task: &TaskContext) {
        self.save_session().await;
    }
}

/// Observes the newest assistant message through the surface.
struct SurfaceProbe<'a> {
    surface: &'a dyn UiSurface,
    profile: &'a SiteProfile,
    prior: usize,
}

#[async_trait::async_trait]
impl<'a> CompletionProbe for SurfaceProbe<'a> {
    async fn observe(&mut self) -> Result<Observation, UiError> {
        let text = match current_answer(self.surface, self.profile, self.prior).await? {
            Some(answer) => {
                let node = content_node(self.surface, self.profile, &answer).await;
                self.surface.read_text(&node).await?
            }
            None => String::new(),
        };
        let busy = self
            .surface
            .find_visible(&self.profile.busy_indicator)
            .await?
            .is_some();
        let input_visible = self
            .surface
            .find_visible(&self.profile.chat_input)
            .await?
            .is_some();
        let blocked = !self.profile.input_blocked.is_empty()
            && self
                .surface
                .find_visible(&self.profile.input_blocked)
                .await?
                .is_some();

        Ok(Observation::new(0, text.trim())
            .busy(busy)
            .input_ready(input_visible && !blocked))
    }

    async fn request_stop(&mut self) -> Result<(), UiError> {
        match self.surface.find_visible(&self.profile.busy_indicator).await? {
            Some(stop) => self.surface.click(&stop).await,
            None => Ok(()),
        }
    }
}

struct PanelOpener<'a> {
    surface: &'a dyn UiSurface,
    profile: &'a SiteProfile,
    button: ElementHandle,
}

impl PanelOpener<'_> {
    async fn open(&mut self) -> Option<ElementHandle> {
        if let Ok(Some(panel)) = self.surface.find_visible(&self.profile.reference_panel).await {
            return Some(panel);
        }
        if let Err(err) = self.surface.click(&self.button).await {
            engine_debug!("Reference button click failed: {err}");
        }
        sleep(self.profile.timings.panel_open_wait).await;
        self.surface
            .find_visible(&self.profile.reference_panel)
            .await
            .ok()
            .flatten()
    }
}

/// Assistant messages matched by the first locator that yields any.
async fn assistant_messages(
    surface: &dyn UiSurface,
    profile: &SiteProfile,
) -> Result<Vec<ElementHandle>, UiError> {
    for locator in &profile.assistant_message {
        let found = surface.find(locator).await?;
        if !found.is_empty() {
            return Ok(found);
        }
    }
    Ok(Vec::new())
}

/// The newest assistant message, if one appeared after the prompt was sent.
async fn current_answer(
    surface: &dyn UiSurface,
    profile: &SiteProfile,
    prior: usize,
) -> Result<Option<ElementHandle>, UiError> {
    let messages = assistant_messages(surface, profile).await?;
    if messages.len() > prior {
        Ok(messages.last().cloned())
    } else {
        Ok(None)
    }
}

async fn content_node(
    surface: &dyn UiSurface,
    profile: &SiteProfile,
    answer: &ElementHandle,
) -> ElementHandle {
    for locator in &profile.answer_content {
        if let Ok(found) = surface.find_within(answer, locator).await {
            if let Some(first) = found.into_iter().next() {
                return first;
            }
        }
    }
    answer.clone()
}

async fn find_affordance(
    surface: &dyn UiSurface,
    profile: &SiteProfile,
    answer: Option<&ElementHandle>,
) -> Result<Option<ElementHandle>, UiError> {
    if let Some(answer) = answer {
        for locator in &profile.reference_button {
            for candidate in surface.find_within(answer, locator).await? {
                if surface.is_visible(&candidate).await.unwrap_or(false) {
                    return Ok(Some(candidate));
                }
            }
        }
    }
    surface.find_last_visible(&profile.reference_button).await
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\n', "<br>")
}
