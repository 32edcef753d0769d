/// One polled snapshot of the chat UI taken while an answer is being generated.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Observation {
    /// Milliseconds since the detector started.
    pub timestamp_ms: u64,
    pub visible_text: String,
    pub busy_indicator_present: bool,
    pub input_enabled: bool,
}

impl Observation {
    pub fn new(timestamp_ms: u64, visible_text: impl Into<String>) -> Self {
        Self {
            timestamp_ms,
            visible_text: visible_text.into(),
            ..Self::default()
        }
    }

    pub fn busy(mut self, busy: bool) -> Self {
        self.busy_indicator_present = busy;
        self
    }

    pub fn input_ready(mut self, ready: bool) -> Self {
        self.input_enabled = ready;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    AwaitingStart,
    Streaming,
    Settled,
}

/// State threaded through one completion-detection run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionState {
    pub(crate) phase: Phase,
    pub(crate) last_text: String,
    pub(crate) stable_tick_count: u32,
    pub(crate) last_change_ms: u64,
    pub(crate) started_at_ms: u64,
    pub(crate) baseline_chars: usize,
    pub(crate) last_stop_request_ms: Option<u64>,
}

impl DetectionState {
    /// `baseline_text` is what the answer area showed before the prompt was sent.
    pub fn new(baseline_text: &str, started_at_ms: u64) -> Self {
        Self {
            phase: Phase::AwaitingStart,
            last_text: baseline_text.to_string(),
            stable_tick_count: 0,
            last_change_ms: started_at_ms,
            started_at_ms,
            baseline_chars: baseline_text.chars().count(),
            last_stop_request_ms: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn last_text(&self) -> &str {
        &self.last_text
    }

    pub fn stable_tick_count(&self) -> u32 {
        self.stable_tick_count
    }

    pub fn last_change_ms(&self) -> u64 {
        self.last_change_ms
    }

    pub(crate) fn elapsed(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.started_at_ms)
    }
}
