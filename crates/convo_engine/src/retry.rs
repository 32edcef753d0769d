use std::time::Duration;

use convo_core::RetryPolicy;
use engine_logging::{engine_debug, engine_warn};
use futures_util::future::BoxFuture;
use rand::Rng;
use tokio::time::sleep;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOutcome<T> {
    /// Value of the last attempt.
    pub value: T,
    pub attempts: u32,
    pub succeeded: bool,
}

/// Runs `action` until `is_success` accepts its value or the policy runs out of attempts,
/// sleeping a jittered backoff between attempts.
pub async fn retry_with_backoff<S, T, F, P>(
    policy: &RetryPolicy,
    subject: &mut S,
    label: &str,
    mut action: F,
    is_success: P,
) -> RetryOutcome<T>
where
    F: for<'s> FnMut(&'s mut S, u32) -> BoxFuture<'s, T>,
    P: Fn(&T) -> bool,
{
    let mut attempt = 1;
    loop {
        let value = action(subject, attempt).await;
        if is_success(&value) {
            if attempt > 1 {
                engine_debug!("{label} succeeded on attempt {attempt}");
            }
            return RetryOutcome {
                value,
                attempts: attempt,
                succeeded: true,
            };
        }
        if !policy.has_attempt_after(attempt) {
            engine_warn!("{label} gave up after {attempt} attempts");
            return RetryOutcome {
                value,
                attempts: attempt,
                succeeded: false,
            };
        }

        let jitter: f64 = rand::thread_rng().gen();
        let delay = policy.backoff(jitter);
        engine_debug!("{label} attempt {attempt} not done; retrying in {delay:?}");
        sleep(delay).await;
        attempt += 1;
    }
}

/// Uniformly random pause in `[min, max]`.
pub async fn think_time(min: Duration, max: Duration) {
    let (low, high) = if min <= max { (min, max) } else { (max, min) };
    let fraction: f64 = rand::thread_rng().gen();
    sleep(low + (high - low).mul_f64(fraction)).await;
}
