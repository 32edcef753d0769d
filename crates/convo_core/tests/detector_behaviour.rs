use std::sync::Once;
use std::time::Duration;

use convo_core::{
    advance, tick, DetectionState, DetectorEffect, DetectorSettings, Observation, Phase, Verdict,
};
use pretty_assertions::assert_eq;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

/// Feeds observations in order and returns the index of the first one that finished the run.
fn run_until_finish(
    settings: &DetectorSettings,
    mut state: DetectionState,
    observations: &[Observation],
) -> (DetectionState, Option<(usize, Verdict)>) {
    for (index, obs) in observations.iter().enumerate() {
        let (next, effects) = advance(state, settings, obs);
        state = next;
        for effect in effects {
            if let DetectorEffect::Finish(verdict) = effect {
                return (state, Some((index, verdict)));
            }
        }
    }
    (state, None)
}

#[test]
fn stable_text_completes_after_three_quiet_ticks() {
    init_logging();
    let settings = DetectorSettings::default();
    let texts = ["", "a", "ab", "abc", "abc", "abc", "abc"];
    let observations: Vec<Observation> = texts
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let busy = i <= 3;
            Observation::new(i as u64 * 300, *text)
                .busy(busy)
                .input_ready(!busy)
        })
        .collect();

    let (state, finished) = run_until_finish(&settings, DetectionState::new("", 0), &observations);

    assert_eq!(finished, Some((6, Verdict::Completed("abc".to_string()))));
    assert_eq!(state.phase(), Phase::Settled);
}

#[test]
fn stable_text_does_not_complete_while_busy() {
    init_logging();
    let settings = DetectorSettings::default();
    let observations: Vec<Observation> = (0..8)
        .map(|i| Observation::new(i * 300, "same").busy(true).input_ready(true))
        .collect();

    let (state, finished) = run_until_finish(&settings, DetectionState::new("", 0), &observations);

    assert_eq!(finished, None);
    assert_eq!(state.phase(), Phase::Streaming);
    assert!(state.stable_tick_count() >= 3);
}

#[test]
fn stall_fallback_completes_without_input_ready() {
    init_logging();
    let settings = DetectorSettings::default();
    let observations: Vec<Observation> = (0..60)
        .map(|i| Observation::new(i * 300, "x").busy(false).input_ready(false))
        .collect();

    let (_state, finished) =
        run_until_finish(&settings, DetectionState::new("", 0), &observations);

    let (index, verdict) = finished.expect("stall fallback should settle");
    assert_eq!(verdict, Verdict::Completed("x".to_string()));
    assert!(index as u64 * 300 >= 10_000);
}

#[test]
fn awaiting_start_polls_until_text_grows() {
    init_logging();
    let settings = DetectorSettings::default();
    let state = DetectionState::new("previous answer", 0);

    let (state, effects) = advance(
        state,
        &settings,
        &Observation::new(200, "previous answer").input_ready(true),
    );
    assert_eq!(state.phase(), Phase::AwaitingStart);
    assert_eq!(
        effects,
        vec![DetectorEffect::SchedulePoll(settings.start_poll_interval)]
    );

    let (state, effects) = advance(
        state,
        &settings,
        &Observation::new(400, "previous answer and more"),
    );
    assert_eq!(state.phase(), Phase::Streaming);
    assert_eq!(state.last_text(), "previous answer and more");
    assert_eq!(state.last_change_ms(), 400);
    assert_eq!(
        effects,
        vec![DetectorEffect::SchedulePoll(settings.stream_poll_interval)]
    );
}

#[test]
fn start_window_expiry_moves_to_streaming() {
    init_logging();
    let settings = DetectorSettings::default();
    let state = DetectionState::new("", 0);

    let (state, _) = advance(state, &settings, &Observation::new(29_000, ""));
    assert_eq!(state.phase(), Phase::AwaitingStart);

    let (state, _) = advance(state, &settings, &Observation::new(30_000, ""));
    assert_eq!(state.phase(), Phase::Streaming);
}

#[test]
fn busy_past_ceiling_requests_stop_with_throttle() {
    init_logging();
    let settings = DetectorSettings::default();
    let ceiling = settings.generation_ceiling().as_millis() as u64;
    let mut state = DetectionState::new("", 0);
    let mut stop_requests = Vec::new();

    let mut now = 0;
    let mut counter = 0u32;
    while now <= ceiling + 6_000 {
        counter += 1;
        let obs = Observation::new(now, format!("token {counter}")).busy(true);
        let (next, effects) = advance(state, &settings, &obs);
        state = next;
        if effects.contains(&DetectorEffect::ForceStop) {
            stop_requests.push(now);
        }
        now += 1_000;
    }

    assert_eq!(stop_requests, vec![ceiling, ceiling + 5_000]);
    assert_eq!(state.phase(), Phase::Streaming);
}

#[test]
fn deadline_returns_partial_text() {
    init_logging();
    let settings = DetectorSettings {
        deadline: Duration::from_secs(60),
        ..DetectorSettings::default()
    };
    let state = DetectionState::new("", 0);
    let (state, _) = advance(state, &settings, &Observation::new(100, "partial").busy(true));
    let (state, effects) = advance(
        state,
        &settings,
        &Observation::new(60_000, "partial answer").busy(true),
    );

    assert_eq!(state.phase(), Phase::Settled);
    assert_eq!(
        effects.last(),
        Some(&DetectorEffect::Finish(Verdict::TimedOut(
            "partial answer".to_string()
        )))
    );
}

#[test]
fn tick_without_observation_only_checks_deadline() {
    init_logging();
    let settings = DetectorSettings::default();
    let state = DetectionState::new("", 0);

    let (state, effects) = tick(state, &settings, 1_000);
    assert_eq!(
        effects,
        vec![DetectorEffect::SchedulePoll(settings.start_poll_interval)]
    );

    let (state, effects) = tick(state, &settings, 300_000);
    assert_eq!(state.phase(), Phase::Settled);
    assert_eq!(
        effects,
        vec![DetectorEffect::Finish(Verdict::TimedOut(String::new()))]
    );
}
