use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{DetectionState, Observation, Phase};

const START_WINDOW_CAP: Duration = Duration::from_secs(30);
const START_WINDOW_FRACTION: f64 = 0.2;
const CEILING_FLOOR: Duration = Duration::from_secs(45);
const CEILING_CAP: Duration = Duration::from_secs(240);

/// Tunables for one completion-detection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSettings {
    /// Absolute ceiling; the run ends with a timed-out verdict once reached.
    pub deadline: Duration,
    pub start_poll_interval: Duration,
    pub stream_poll_interval: Duration,
    pub required_stable_ticks: u32,
    /// How long an idle UI may show unchanged text before the run settles anyway.
    pub stall_grace: Duration,
    /// Fraction of the deadline after which a still-busy UI is asked to stop.
    pub max_stream_fraction: f64,
    pub stop_retry_interval: Duration,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(300),
            start_poll_interval: Duration::from_millis(200),
            stream_poll_interval: Duration::from_millis(300),
            required_stable_ticks: 3,
            stall_grace: Duration::from_secs(10),
            max_stream_fraction: 0.8,
            stop_retry_interval: Duration::from_secs(5),
        }
    }
}

impl DetectorSettings {
    /// `min(30s, 20% of deadline)`.
    pub fn start_window(&self) -> Duration {
        self.deadline
            .mul_f64(START_WINDOW_FRACTION)
            .min(START_WINDOW_CAP)
    }

    /// `max(45s, min(max_stream_fraction * deadline, 240s))`.
    pub fn generation_ceiling(&self) -> Duration {
        self.deadline
            .mul_f64(self.max_stream_fraction.clamp(0.0, 1.0))
            .min(CEILING_CAP)
            .max(CEILING_FLOOR)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Completed(String),
    TimedOut(String),
}

impl Verdict {
    pub fn text(&self) -> &str {
        match self {
            Verdict::Completed(text) | Verdict::TimedOut(text) => text,
        }
    }

    pub fn timed_out(&self) -> bool {
        matches!(self, Verdict::TimedOut(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectorEffect {
    SchedulePoll(Duration),
    /// Ask the UI to stop generating. Best effort; the run keeps observing.
    ForceStop,
    Finish(Verdict),
}

/// Pure transition: applies one observation to the state and returns the effects
/// the polling loop must carry out.
pub fn advance(
    mut state: DetectionState,
    settings: &DetectorSettings,
    obs: &Observation,
) -> (DetectionState, Vec<DetectorEffect>) {
    let now = obs.timestamp_ms;
    match state.phase {
        Phase::Settled => return (state, Vec::new()),
        Phase::AwaitingStart => {
            let grew = obs.visible_text.chars().count() > state.baseline_chars;
            let window_over = state.elapsed(now) >= millis(settings.start_window());
            if !(obs.busy_indicator_present || grew || window_over) {
                return deadline_or_poll(state, settings, now, settings.start_poll_interval);
            }
            state.phase = Phase::Streaming;
            // Stall clock starts with streaming, not with the send.
            state.last_change_ms = now;
        }
        Phase::Streaming => {}
    }

    if obs.visible_text == state.last_text {
        state.stable_tick_count = state.stable_tick_count.saturating_add(1);
    } else {
        state.stable_tick_count = 0;
        state.last_text = obs.visible_text.clone();
        state.last_change_ms = now;
    }

    let idle = !obs.busy_indicator_present;
    let stable_and_ready = state.stable_tick_count >= settings.required_stable_ticks
        && !state.last_text.is_empty()
        && idle
        && obs.input_enabled;
    let stalled = idle && now.saturating_sub(state.last_change_ms) >= millis(settings.stall_grace);
    if stable_and_ready || stalled {
        state.phase = Phase::Settled;
        let verdict = Verdict::Completed(state.last_text.clone());
        return (state, vec![DetectorEffect::Finish(verdict)]);
    }

    let mut effects = Vec::with_capacity(2);
    if obs.busy_indicator_present && state.elapsed(now) >= millis(settings.generation_ceiling()) {
        let due = state
            .last_stop_request_ms
            .is_none_or(|at| now.saturating_sub(at) >= millis(settings.stop_retry_interval));
        if due {
            state.last_stop_request_ms = Some(now);
            effects.push(DetectorEffect::ForceStop);
        }
    }

    let (state, rest) = deadline_or_poll(state, settings, now, settings.stream_poll_interval);
    effects.extend(rest);
    (state, effects)
}

/// Transition for a poll that produced no observation: only the deadline is checked.
pub fn tick(
    state: DetectionState,
    settings: &DetectorSettings,
    now_ms: u64,
) -> (DetectionState, Vec<DetectorEffect>) {
    if state.phase == Phase::Settled {
        return (state, Vec::new());
    }
    let interval = match state.phase {
        Phase::AwaitingStart => settings.start_poll_interval,
        _ => settings.stream_poll_interval,
    };
    deadline_or_poll(state, settings, now_ms, interval)
}

fn deadline_or_poll(
    mut state: DetectionState,
    settings: &DetectorSettings,
    now_ms: u64,
    interval: Duration,
) -> (DetectionState, Vec<DetectorEffect>) {
    if state.elapsed(now_ms) >= millis(settings.deadline) {
        state.phase = Phase::Settled;
        let verdict = Verdict::TimedOut(state.last_text.clone());
        return (state, vec![DetectorEffect::Finish(verdict)]);
    }
    (state, vec![DetectorEffect::SchedulePoll(interval)])
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_windows_follow_deadline() {
        let settings = DetectorSettings::default();
        assert_eq!(settings.start_window(), Duration::from_secs(30));
        assert_eq!(settings.generation_ceiling(), Duration::from_secs(240));
    }

    #[test]
    fn short_deadline_keeps_ceiling_floor() {
        let settings = DetectorSettings {
            deadline: Duration::from_secs(40),
            ..DetectorSettings::default()
        };
        assert_eq!(settings.start_window(), Duration::from_secs(8));
        assert_eq!(settings.generation_ceiling(), Duration::from_secs(45));
    }

    #[test]
    fn settled_state_ignores_further_observations() {
        let settings = DetectorSettings::default();
        let mut state = DetectionState::new("", 0);
        state.phase = Phase::Settled;
        let (next, effects) = advance(state.clone(), &settings, &Observation::new(10, "late"));
        assert_eq!(next, state);
        assert!(effects.is_empty());
    }
}
