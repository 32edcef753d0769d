use std::time::Duration;

use convo_core::{advance, tick, DetectionState, DetectorEffect, DetectorSettings, Observation, Phase};
use engine_logging::{engine_debug, engine_info, engine_warn};
use tokio::time::{sleep, Instant};

use crate::surface::UiError;

/// Source of UI snapshots for one answer.
#[async_trait::async_trait]
pub trait CompletionProbe: Send {
    /// Current answer text and UI flags. The timestamp is filled in by the caller.
    async fn observe(&mut self) -> Result<Observation, UiError>;

    /// Best-effort request to stop generation.
    async fn request_stop(&mut self) -> Result<(), UiError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionOutcome {
    pub text: String,
    pub timed_out: bool,
    pub elapsed: Duration,
}

/// Polls `probe` until the answer settles or the deadline passes.
pub async fn detect_completion<P>(
    probe: &mut P,
    settings: &DetectorSettings,
    baseline: &str,
) -> DetectionOutcome
where
    P: CompletionProbe + ?Sized,
{
    let started = Instant::now();
    let mut state = DetectionState::new(baseline, 0);

    loop {
        let observed = probe.observe().await;
        let now_ms = elapsed_ms(started);
        let before = state.phase();
        let (next, effects) = match observed {
            Ok(mut obs) => {
                obs.timestamp_ms = now_ms;
                advance(state, settings, &obs)
            }
            Err(err) => {
                engine_debug!("Observation failed at {now_ms} ms: {err}");
                tick(state, settings, now_ms)
            }
        };
        state = next;
        if before == Phase::AwaitingStart && state.phase() == Phase::Streaming {
            engine_debug!("Answer started streaming after {now_ms} ms");
        }

        let mut wait = settings.stream_poll_interval;
        for effect in effects {
            match effect {
                DetectorEffect::SchedulePoll(interval) => wait = interval,
                DetectorEffect::ForceStop => {
                    engine_warn!("Generation exceeded its ceiling after {now_ms} ms; requesting stop");
                    if let Err(err) = probe.request_stop().await {
                        engine_warn!("Stop request failed: {err}");
                    }
                }
                DetectorEffect::Finish(verdict) => {
                    let elapsed = started.elapsed();
                    if verdict.timed_out() {
                        engine_warn!(
                            "Answer detection hit the {:?} deadline with {} chars captured",
                            settings.deadline,
                            verdict.text().chars().count()
                        );
                    } else {
                        engine_info!("Answer settled after {elapsed:?}");
                    }
                    return DetectionOutcome {
                        timed_out: verdict.timed_out(),
                        text: verdict.text().to_string(),
                        elapsed,
                    };
                }
            }
        }

        sleep(wait).await;
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
